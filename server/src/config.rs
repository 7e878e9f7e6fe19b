//! Server configuration module.
//!
//! Parses configuration from environment variables for the SitePulse server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `SITEPULSE_USER_JWT_SECRET` | Yes | - | HS256 secret for end-user tokens |
//! | `SITEPULSE_CONTRIBUTOR_JWT_SECRET` | Yes | - | HS256 secret for contributor tokens |
//! | `SITEPULSE_ADMIN_JWT_SECRET` | Yes | - | HS256 secret for operator tokens |
//! | `SITEPULSE_STORE_URL` | Yes | - | Base URL of the data-store API |
//! | `SITEPULSE_STORE_API_KEY` | No | - | Bearer key sent to the data store |
//! | `SITEPULSE_PUBLISHER_TOKEN` | Yes | - | Shared token for the event-ingest endpoint |
//! | `PORT` | No | 8080 | HTTP server port |

use std::env;

use thiserror::Error;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HS256 secret for the end-user credential domain.
    pub user_jwt_secret: String,

    /// HS256 secret for the contributor credential domain.
    pub contributor_jwt_secret: String,

    /// HS256 secret for the operator credential domain.
    pub admin_jwt_secret: String,

    /// Base URL of the external data-store API.
    pub store_url: String,

    /// Optional bearer key for data-store requests.
    pub store_api_key: Option<String>,

    /// Shared token the check scheduler presents on `POST /events`.
    pub publisher_token: String,

    /// HTTP server port.
    pub port: u16,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing, a secret is
    /// empty, or the port is not a valid u16.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            user_jwt_secret: require_env("SITEPULSE_USER_JWT_SECRET")?,
            contributor_jwt_secret: require_env("SITEPULSE_CONTRIBUTOR_JWT_SECRET")?,
            admin_jwt_secret: require_env("SITEPULSE_ADMIN_JWT_SECRET")?,
            store_url: require_env("SITEPULSE_STORE_URL")?,
            store_api_key: env::var("SITEPULSE_STORE_API_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
            publisher_token: require_env("SITEPULSE_PUBLISHER_TOKEN")?,
            port: parse_port()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// The three domain secrets must be pairwise distinct: a shared secret
    /// would collapse the domain-precedence chain into "first domain wins"
    /// for every token, silently misclassifying principals.
    fn validate(&self) -> Result<(), ConfigError> {
        let secrets = [
            ("SITEPULSE_USER_JWT_SECRET", &self.user_jwt_secret),
            (
                "SITEPULSE_CONTRIBUTOR_JWT_SECRET",
                &self.contributor_jwt_secret,
            ),
            ("SITEPULSE_ADMIN_JWT_SECRET", &self.admin_jwt_secret),
        ];

        for (i, (var_a, secret_a)) in secrets.iter().enumerate() {
            for (var_b, secret_b) in &secrets[i + 1..] {
                if secret_a == secret_b {
                    return Err(ConfigError::InvalidFormat {
                        var: (*var_b).to_string(),
                        message: format!("must differ from {var_a}"),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Reads a required environment variable, rejecting empty values.
fn require_env(name: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}
