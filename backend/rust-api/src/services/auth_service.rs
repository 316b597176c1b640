use std::sync::Arc;

use anyhow::Context;
use axum::http::StatusCode;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, TimeZone, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::account_store::AccountStore;
use super::profile_service::ProfileService;
use super::profile_store::StoreError;
use super::revocation::TokenRevocationList;
use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::account::{Account, AuthResponse, CurrentUser, LoginRequest, RegisterRequest};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("An account with this email already exists")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Missing authorization token")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    ExpiredToken,
    #[error("Token has been revoked")]
    Revoked,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::Revoked => StatusCode::UNAUTHORIZED,
            AuthError::Store(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Sign-up, sign-in and sign-out. Creates the profile on first sign-in and
/// records the login streak on every sign-in.
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    profiles: Arc<ProfileService>,
    revocations: Arc<dyn TokenRevocationList>,
    jwt: JwtService,
    access_token_ttl_seconds: i64,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        profiles: Arc<ProfileService>,
        revocations: Arc<dyn TokenRevocationList>,
        jwt: JwtService,
        access_token_ttl_seconds: i64,
    ) -> Self {
        Self {
            accounts,
            profiles,
            revocations,
            jwt,
            access_token_ttl_seconds,
            bcrypt_cost: DEFAULT_COST,
        }
    }

    /// Lower work factor for tests.
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(&req.email);
        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hash_password(req.password).await?;
        let now = Utc::now();
        let account = Account {
            uid: Uuid::new_v4().to_string(),
            email: email.clone(),
            password_hash,
            created_at: now,
            last_login_at: None,
        };

        self.accounts.insert(&account).await.map_err(|e| match e {
            StoreError::Duplicate(_) => AuthError::EmailTaken,
            other => AuthError::Store(other),
        })?;

        let profile = self.profiles.ensure_profile(&account.uid, &email, now).await?;
        tracing::info!(uid = %account.uid, email = %email, "Registered account");

        Ok(AuthResponse {
            access_token: self.issue_token(&account.uid, &email, now)?,
            token_type: "Bearer",
            expires_in: self.access_token_ttl_seconds,
            profile,
            login: None,
        })
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(&req.email);
        let account = match self.accounts.find_by_email(&email).await? {
            Some(account) => account,
            None => {
                tracing::warn!(email = %email, "Failed login attempt: unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self
            .verify_password(req.password, account.password_hash.clone())
            .await?
        {
            tracing::warn!(email = %email, "Failed login attempt: invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        self.accounts.touch_last_login(&account.uid, now).await?;
        self.profiles
            .ensure_profile(&account.uid, &account.email, now)
            .await?;
        let login = self.profiles.record_login(&account.uid, now).await?;
        let profile = self.profiles.get_profile(&account.uid).await?;

        tracing::info!(uid = %account.uid, email = %email, "Successful login");

        Ok(AuthResponse {
            access_token: self.issue_token(&account.uid, &account.email, now)?,
            token_type: "Bearer",
            expires_in: self.access_token_ttl_seconds,
            profile,
            login: Some(login),
        })
    }

    /// Revokes the presented token until it would have expired anyway.
    pub async fn logout(&self, claims: &JwtClaims) -> Result<(), AuthError> {
        let expires_at: DateTime<Utc> = Utc
            .timestamp_opt(claims.exp as i64, 0)
            .single()
            .unwrap_or_else(Utc::now);
        self.revocations.revoke(&claims.jti, expires_at).await?;
        tracing::info!(uid = %claims.sub, "Signed out");
        Ok(())
    }

    pub async fn verify(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let claims = self.jwt.validate_token(token)?;
        if self.revocations.is_revoked(&claims.jti).await? {
            return Err(AuthError::Revoked);
        }
        Ok(claims)
    }

    pub fn current_user(claims: &JwtClaims) -> CurrentUser {
        CurrentUser {
            uid: claims.sub.clone(),
            email: claims.email.clone(),
        }
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        self.revocations.ping().await
    }

    fn issue_token(&self, uid: &str, email: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let exp = now + Duration::seconds(self.access_token_ttl_seconds);
        let claims = JwtClaims {
            sub: uid.to_string(),
            email: email.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        self.jwt.generate_token(&claims)
    }

    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let cost = self.bcrypt_cost;
        let hashed = tokio::task::spawn_blocking(move || hash(password, cost))
            .await
            .context("Password hashing task failed")?
            .context("Failed to hash password")?;
        Ok(hashed)
    }

    async fn verify_password(&self, password: String, hashed: String) -> Result<bool, AuthError> {
        let matches = tokio::task::spawn_blocking(move || verify(password, &hashed))
            .await
            .context("Password verification task failed")?
            .context("Failed to verify password")?;
        Ok(matches)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
