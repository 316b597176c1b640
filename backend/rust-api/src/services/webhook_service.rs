//! Acknowledgment of video-provider webhooks.
//!
//! Checks run in a fixed order: server secret configured, signature, payload
//! shape. Event processing beyond the acknowledgment is not done here.

use axum::http::StatusCode;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use crate::config::WebhookConfig;
use crate::metrics::WEBHOOK_EVENTS_TOTAL;
use crate::models::webhook::{WebhookAck, WebhookProvider};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("{0} webhook is not configured on this server")]
    MissingSecret(&'static str),
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::MissingSecret(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebhookError::InvalidSignature => StatusCode::FORBIDDEN,
            WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            WebhookError::MissingSecret(_) => "misconfigured",
            WebhookError::InvalidSignature => "rejected",
            WebhookError::MalformedPayload(_) => "malformed",
        }
    }
}

pub struct WebhookService {
    config: WebhookConfig,
}

impl WebhookService {
    pub fn new(config: WebhookConfig) -> Self {
        Self { config }
    }

    /// Validates one delivery. `signature` is the raw header value, if any.
    pub fn acknowledge(
        &self,
        provider: WebhookProvider,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookAck, WebhookError> {
        let result = self.check(provider, signature, body);
        let status = match &result {
            Ok(_) => "accepted",
            Err(err) => err.label(),
        };
        WEBHOOK_EVENTS_TOTAL
            .with_label_values(&[provider.as_str(), status])
            .inc();

        match &result {
            Ok(ack) => tracing::info!(
                provider = provider.as_str(),
                event_type = ?ack.event_type,
                "Webhook received"
            ),
            Err(err) => tracing::warn!(provider = provider.as_str(), "Webhook rejected: {}", err),
        }
        result
    }

    fn check(
        &self,
        provider: WebhookProvider,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookAck, WebhookError> {
        match provider {
            WebhookProvider::HeyGen => {
                let secret = self
                    .config
                    .heygen_secret
                    .as_deref()
                    .ok_or(WebhookError::MissingSecret(provider.as_str()))?;
                verify_signature(secret, signature.unwrap_or_default(), body)?;
            }
            WebhookProvider::Synthesia => {
                if self.config.synthesia_api_key.is_none() {
                    return Err(WebhookError::MissingSecret(provider.as_str()));
                }
            }
        }

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        let event_type = payload
            .get("event_type")
            .or_else(|| payload.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(WebhookAck {
            received: true,
            provider: provider.as_str(),
            event_type,
        })
    }
}

/// HMAC-SHA256 of the raw body, compared in constant time against the hex
/// encoded header value.
pub fn verify_signature(secret: &str, signature_hex: &str, body: &[u8]) -> Result<(), WebhookError> {
    let expected = hex::decode(signature_hex.trim()).map_err(|_| WebhookError::InvalidSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Hex HMAC-SHA256 signature as the provider computes it.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(heygen: Option<&str>, synthesia: Option<&str>) -> WebhookService {
        WebhookService::new(WebhookConfig {
            heygen_secret: heygen.map(str::to_string),
            synthesia_api_key: synthesia.map(str::to_string),
        })
    }

    const BODY: &[u8] = br#"{"event_type":"avatar_video.success","event_data":{"video_id":"v1"}}"#;

    #[test]
    fn signed_heygen_delivery_is_acknowledged() {
        let webhooks = service(Some("whsec"), None);
        let signature = sign("whsec", BODY);
        let ack = webhooks
            .acknowledge(WebhookProvider::HeyGen, Some(&signature), BODY)
            .unwrap();
        assert!(ack.received);
        assert_eq!(ack.event_type.as_deref(), Some("avatar_video.success"));
    }

    #[test]
    fn bad_signature_is_forbidden() {
        let webhooks = service(Some("whsec"), None);
        let wrong = sign("other", BODY);
        for signature in [Some(wrong.as_str()), Some("zz-not-hex"), None] {
            let err = webhooks
                .acknowledge(WebhookProvider::HeyGen, signature, BODY)
                .unwrap_err();
            assert_eq!(err.status(), StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn missing_secret_is_checked_first() {
        let webhooks = service(None, None);
        let err = webhooks
            .acknowledge(WebhookProvider::HeyGen, None, b"not json")
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = webhooks
            .acknowledge(WebhookProvider::Synthesia, None, BODY)
            .unwrap_err();
        assert!(matches!(err, WebhookError::MissingSecret("synthesia")));
    }

    #[test]
    fn signature_is_checked_before_payload() {
        let webhooks = service(Some("whsec"), None);
        let err = webhooks
            .acknowledge(WebhookProvider::HeyGen, Some("00"), b"not json")
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidSignature));

        let signature = sign("whsec", b"not json");
        let err = webhooks
            .acknowledge(WebhookProvider::HeyGen, Some(&signature), b"not json")
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn synthesia_accepts_unsigned_json() {
        let webhooks = service(None, Some("key"));
        let ack = webhooks
            .acknowledge(WebhookProvider::Synthesia, None, br#"{"type":"video.completed"}"#)
            .unwrap();
        assert_eq!(ack.provider, "synthesia");
        assert_eq!(ack.event_type.as_deref(), Some("video.completed"));
    }
}
