use std::sync::Arc;
use std::time::Duration;

use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::middlewares::auth::JwtService;

use self::account_store::{AccountStore, MongoAccountStore};
use self::auth_service::AuthService;
use self::flows::model::{GeminiModel, LanguageModel};
use self::flows::FlowService;
use self::profile_service::ProfileService;
use self::profile_store::{MongoProfileStore, ProfileStore};
use self::quiz_service::{QuizDeps, QuizRegistry};
use self::revocation::{RedisRevocationList, TokenRevocationList};
use self::webhook_service::WebhookService;

pub mod account_store;
pub mod auth_service;
pub mod flows;
pub mod gamification;
pub mod profile_service;
pub mod profile_store;
pub mod quiz_runtime;
pub mod quiz_service;
pub mod revocation;
pub mod webhook_service;

/// Storage and model backends the services are built over.
pub struct Backends {
    pub profiles: Arc<dyn ProfileStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub revocations: Arc<dyn TokenRevocationList>,
    pub model: Arc<dyn LanguageModel>,
}

pub struct AppState {
    pub config: Config,
    pub profiles: Arc<ProfileService>,
    pub auth: AuthService,
    pub flows: Arc<FlowService>,
    pub quizzes: QuizRegistry,
    pub webhooks: WebhookService,
}

impl AppState {
    /// Connects to MongoDB, Redis and the model provider.
    pub async fn connect(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let mut conn = redis.clone();
        tokio::time::timeout(
            Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let accounts = MongoAccountStore::new(mongo.clone());
        accounts.ensure_indexes().await?;

        let model = GeminiModel::new(config.ai.clone())?;
        tracing::info!(model = %config.ai.model, "Model provider configured");

        let backends = Backends {
            profiles: Arc::new(MongoProfileStore::new(mongo)),
            accounts: Arc::new(accounts),
            revocations: Arc::new(RedisRevocationList::new(redis)),
            model: Arc::new(model),
        };
        Ok(Self::with_backends(config, backends))
    }

    pub fn with_backends(config: Config, backends: Backends) -> Self {
        let profiles = Arc::new(ProfileService::new(backends.profiles));
        let flows = Arc::new(FlowService::new(backends.model));
        let auth = AuthService::new(
            backends.accounts,
            profiles.clone(),
            backends.revocations,
            JwtService::new(&config.jwt_secret),
            config.access_token_ttl_seconds,
        );
        let quizzes = QuizRegistry::new(QuizDeps {
            profiles: profiles.clone(),
            flows: flows.clone(),
            config: config.quiz.clone(),
        });
        let webhooks = WebhookService::new(config.webhooks.clone());

        Self {
            config,
            profiles,
            auth,
            flows,
            quizzes,
            webhooks,
        }
    }

    /// Variant of [`AppState::with_backends`] with a cheap bcrypt cost.
    pub fn for_tests(config: Config, backends: Backends) -> Self {
        let mut state = Self::with_backends(config, backends);
        state.auth = state.auth.with_bcrypt_cost(4);
        state
    }
}
