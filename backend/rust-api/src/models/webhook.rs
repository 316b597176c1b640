use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookProvider {
    /// Signs the raw body with HMAC-SHA256, hex encoded in the `signature` header.
    HeyGen,
    /// Unsigned; an API key must still be configured before events are accepted.
    Synthesia,
}

impl WebhookProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookProvider::HeyGen => "heygen",
            WebhookProvider::Synthesia => "synthesia",
        }
    }

    pub fn signature_header(&self) -> Option<&'static str> {
        match self {
            WebhookProvider::HeyGen => Some("signature"),
            WebhookProvider::Synthesia => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub provider: &'static str,
    pub event_type: Option<String>,
}
