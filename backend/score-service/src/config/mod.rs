use crate::jobs::ScoreBatchConfig;
use db_pool::DbConfig;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Database configuration error: {0}")]
    Database(String),

    #[error("Unknown mode {0:?} (expected serve or batch)")]
    UnknownMode(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DbConfig,
    pub batch: ScoreBatchConfig,
    pub trigger: TriggerConfig,
    /// Apply bundled SQL migrations before serving
    pub run_migrations: bool,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
    pub http_host: String,
    pub http_port: u16,
    pub app_env: String,
}

impl ServiceConfig {
    pub fn is_development(&self) -> bool {
        matches!(
            self.app_env.to_ascii_lowercase().as_str(),
            "development" | "dev" | "local"
        )
    }
}

#[derive(Clone)]
pub struct TriggerConfig {
    pub secret: Option<String>,
}

impl std::fmt::Debug for TriggerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Process mode selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// HTTP server with the on-demand trigger
    #[default]
    Serve,
    /// One batch run, then exit
    Batch,
}

impl RunMode {
    /// Parse `--mode <serve|batch>` (or `--mode=...`) from process arguments
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut mode = None;
        while let Some(arg) = args.next() {
            if arg == "--mode" {
                mode = args.next();
            } else if let Some(value) = arg.strip_prefix("--mode=") {
                mode = Some(value.to_string());
            }
        }

        match mode.as_deref() {
            None | Some("serve") => Ok(RunMode::Serve),
            Some("batch") => Ok(RunMode::Batch),
            Some(other) => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let service = ServiceConfig {
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "score-service".to_string()),
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: parse_var("HTTP_PORT", "8012", "u16")?,
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        };

        let database =
            DbConfig::from_env(&service.service_name).map_err(ConfigError::Database)?;

        let trigger = TriggerConfig {
            secret: env::var("SCORE_BATCH_TRIGGER_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        };

        Ok(Config {
            service,
            database,
            batch: ScoreBatchConfig::from_env()?,
            trigger,
            run_migrations: parse_var("RUN_MIGRATIONS", "false", "bool")?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    key: &'static str,
    default: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|_| ConfigError::Invalid {
        key,
        expected,
        value,
    })
}

/// Parse `key` when set, otherwise return `default`
pub(crate) fn parse_var_or<T: std::str::FromStr>(
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value,
        }),
        Err(_) => Ok(default),
    }
}
