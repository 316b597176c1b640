use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),
    #[error("{key} must be set ({hint})")]
    Missing {
        key: &'static str,
        hint: &'static str,
    },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub server_addr: String,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub redis_uri: String,
    pub jwt_secret: String,
    pub access_token_ttl_seconds: i64,
    /// `user:password` expected in Basic auth on `/metrics`.
    pub metrics_credentials: String,
    pub ai: AiConfig,
    pub webhooks: WebhookConfig,
    pub quiz: QuizConfig,
}

/// Hosted model provider settings. The API key is mandatory: a missing key
/// stops the server at startup instead of failing every flow request.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub heygen_secret: Option<String>,
    pub synthesia_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QuizConfig {
    pub max_questions: u32,
    pub idle_timeout_seconds: u64,
    pub reflections_enabled: bool,
    /// Live sessions one user may hold at a time.
    pub max_sessions_per_owner: usize,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            max_questions: 50,
            idle_timeout_seconds: 3600,
            reflections_enabled: true,
            max_sessions_per_owner: 5,
        }
    }
}

/// Plain environment variables accepted as fallbacks for the `APP_*` keys.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("SERVER_ADDR", "server.addr"),
    ("MONGO_URI", "database.mongo_uri"),
    ("MONGO_DATABASE", "database.mongo_database"),
    ("REDIS_URI", "redis.uri"),
    ("JWT_SECRET", "auth.jwt_secret"),
    ("METRICS_AUTH", "metrics.credentials"),
    ("GOOGLE_API_KEY", "ai.api_key"),
    ("GEMINI_API_KEY", "ai.api_key"),
    ("HEYGEN_WEBHOOK_SECRET", "webhooks.heygen_secret"),
    ("SYNTHESIA_API_KEY", "webhooks.synthesia_api_key"),
];

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        // Root .env first, then the crate-local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let environment = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut builder = config::Config::builder();
        for (var, key) in LEGACY_ENV_KEYS {
            if let Ok(value) = env::var(var) {
                builder = builder.set_default(*key, value)?;
            }
        }

        let settings = builder
            .add_source(
                config::File::with_name(&format!("config/{}", environment)).required(false),
            )
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Self::from_settings(&settings, &environment)
    }

    pub fn from_settings(
        settings: &config::Config,
        environment: &str,
    ) -> Result<Self, ConfigError> {
        let string_or = |key: &str, default: &str| {
            settings
                .get_string(key)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let optional_string = |key: &str| {
            settings
                .get_string(key)
                .ok()
                .filter(|value| !value.trim().is_empty())
        };

        let jwt_secret = match optional_string("auth.jwt_secret") {
            Some(secret) => secret,
            None if environment == "prod" => {
                return Err(ConfigError::Missing {
                    key: "auth.jwt_secret",
                    hint: "set APP_AUTH__JWT_SECRET or JWT_SECRET",
                })
            }
            None => {
                tracing::warn!("Using default JWT secret (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let api_key = optional_string("ai.api_key").ok_or(ConfigError::Missing {
            key: "ai.api_key",
            hint: "set APP_AI__API_KEY or GEMINI_API_KEY",
        })?;

        let access_token_ttl_seconds = settings
            .get_int("auth.access_token_ttl_seconds")
            .unwrap_or(3600);
        if access_token_ttl_seconds <= 0 {
            return Err(ConfigError::Invalid {
                key: "auth.access_token_ttl_seconds",
                reason: "must be positive".to_string(),
            });
        }

        let temperature = settings.get_float("ai.temperature").unwrap_or(0.4);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::Invalid {
                key: "ai.temperature",
                reason: format!("{} is outside 0.0..=2.0", temperature),
            });
        }

        let defaults = QuizConfig::default();
        let max_questions = settings
            .get_int("quiz.max_questions")
            .unwrap_or(i64::from(defaults.max_questions));
        let max_questions = u32::try_from(max_questions)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| ConfigError::Invalid {
                key: "quiz.max_questions",
                reason: format!("{} is not a positive count", max_questions),
            })?;

        Ok(Config {
            environment: environment.to_string(),
            server_addr: string_or("server.addr", "0.0.0.0:8081"),
            mongo_uri: string_or("database.mongo_uri", "mongodb://localhost:27017"),
            mongo_database: string_or("database.mongo_database", "studyforge"),
            redis_uri: string_or("redis.uri", "redis://127.0.0.1:6379/0"),
            jwt_secret,
            access_token_ttl_seconds,
            metrics_credentials: string_or("metrics.credentials", "admin:changeme"),
            ai: AiConfig {
                api_key,
                base_url: string_or(
                    "ai.base_url",
                    "https://generativelanguage.googleapis.com",
                ),
                model: string_or("ai.model", "gemini-2.0-flash"),
                temperature,
                timeout_seconds: settings
                    .get_int("ai.timeout_seconds")
                    .ok()
                    .and_then(|v| u64::try_from(v).ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(60),
            },
            webhooks: WebhookConfig {
                heygen_secret: optional_string("webhooks.heygen_secret"),
                synthesia_api_key: optional_string("webhooks.synthesia_api_key"),
            },
            quiz: QuizConfig {
                max_questions,
                idle_timeout_seconds: settings
                    .get_int("quiz.idle_timeout_seconds")
                    .ok()
                    .and_then(|v| u64::try_from(v).ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(defaults.idle_timeout_seconds),
                reflections_enabled: settings
                    .get_bool("quiz.reflections_enabled")
                    .unwrap_or(defaults.reflections_enabled),
                max_sessions_per_owner: settings
                    .get_int("quiz.max_sessions_per_owner")
                    .ok()
                    .and_then(|v| usize::try_from(v).ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(defaults.max_sessions_per_owner),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn settings(overrides: &[(&str, &str)]) -> config::Config {
        let mut builder = config::Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn defaults_apply_when_only_api_key_is_set() {
        let config = Config::from_settings(&settings(&[("ai.api_key", "k")]), "dev").unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:8081");
        assert_eq!(config.mongo_database, "studyforge");
        assert_eq!(config.ai.model, "gemini-2.0-flash");
        assert_eq!(config.quiz.max_questions, 50);
        assert!(config.quiz.reflections_enabled);
        assert_eq!(config.quiz.max_sessions_per_owner, 5);
        assert!(config.webhooks.heygen_secret.is_none());
        assert_eq!(config.metrics_credentials, "admin:changeme");
    }

    #[test]
    fn missing_api_key_is_a_startup_error() {
        let err = Config::from_settings(&settings(&[]), "dev").unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "ai.api_key", .. }));
    }

    #[test]
    fn prod_requires_jwt_secret() {
        let err = Config::from_settings(&settings(&[("ai.api_key", "k")]), "prod").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                key: "auth.jwt_secret",
                ..
            }
        ));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = Config::from_settings(
            &settings(&[("ai.api_key", "k"), ("quiz.max_questions", "0")]),
            "dev",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = Config::from_settings(
            &settings(&[("ai.api_key", "k"), ("ai.temperature", "3.5")]),
            "dev",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    #[serial]
    fn load_reads_app_prefixed_and_legacy_env() {
        env::set_var("SKIP_ROOT_ENV", "1");
        env::set_var("GEMINI_API_KEY", "legacy-key");
        env::set_var("APP_QUIZ__MAX_QUESTIONS", "20");
        env::set_var("APP_WEBHOOKS__HEYGEN_SECRET", "whsec");

        let config = Config::load().unwrap();
        assert_eq!(config.ai.api_key, "legacy-key");
        assert_eq!(config.quiz.max_questions, 20);
        assert_eq!(config.webhooks.heygen_secret.as_deref(), Some("whsec"));

        env::remove_var("SKIP_ROOT_ENV");
        env::remove_var("GEMINI_API_KEY");
        env::remove_var("APP_QUIZ__MAX_QUESTIONS");
        env::remove_var("APP_WEBHOOKS__HEYGEN_SECRET");
    }
}
