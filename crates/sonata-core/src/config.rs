//! Configuration module
//!
//! Runtime settings for the persistence layer and the submission workflow,
//! loaded from the environment (and an optional `.env` file).

use std::env;
use std::fmt;
use std::str::FromStr;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_FILTER: &str = "sonata=info";
const DEFAULT_ID_NAMESPACE: &str = "sonata";

/// How schema validation is scheduled after an upload is ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// The caller waits and the ingest reply reflects the verdict.
    Sync,
    /// Validation is spawned in the background; callers poll the upload.
    #[default]
    Async,
}

impl FromStr for ValidationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sync" | "synchronous" => Ok(ValidationMode::Sync),
            "async" | "asynchronous" => Ok(ValidationMode::Async),
            other => Err(anyhow::anyhow!(
                "VALIDATION_MODE must be 'sync' or 'async', got '{}'",
                other
            )),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Sync => write!(f, "sync"),
            ValidationMode::Async => write!(f, "async"),
        }
    }
}

/// What saving an upload does when its analysis id is already persisted and
/// the caller asked to ignore collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisResavePolicy {
    /// Always refuse with a duplicate-analysis error.
    Reject,
    /// Replace samples and files of the stored analysis while it is still UNPUBLISHED.
    #[default]
    ReplaceUnpublished,
}

impl FromStr for AnalysisResavePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(AnalysisResavePolicy::Reject),
            "replace_unpublished" | "replace-unpublished" => {
                Ok(AnalysisResavePolicy::ReplaceUnpublished)
            }
            other => Err(anyhow::anyhow!(
                "ANALYSIS_RESAVE_POLICY must be 'reject' or 'replace_unpublished', got '{}'",
                other
            )),
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    pub log_filter: String,
    pub validation_mode: ValidationMode,
    /// Keep the superseded payload (`replaced_payload`) on an upload once it is saved.
    pub retain_saved_payload: bool,
    pub analysis_resave_policy: AnalysisResavePolicy,
    /// Salt mixed into deterministic ids so separate deployments never collide.
    pub id_namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            environment: "development".to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            validation_mode: ValidationMode::default(),
            retain_saved_payload: false,
            analysis_resave_policy: AnalysisResavePolicy::default(),
            id_namespace: DEFAULT_ID_NAMESPACE.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let validation_mode = match env::var("VALIDATION_MODE") {
            Ok(value) => value.parse()?,
            Err(_) => ValidationMode::default(),
        };

        let analysis_resave_policy = match env::var("ANALYSIS_RESAVE_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => AnalysisResavePolicy::default(),
        };

        let config = Config {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty()),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            environment,
            log_filter: env::var("LOG_FILTER").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            validation_mode,
            retain_saved_payload: env::var("RETAIN_SAVED_PAYLOAD")
                .unwrap_or_else(|_| "false".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(false),
            analysis_resave_policy,
            id_namespace: env::var("ID_NAMESPACE")
                .unwrap_or_else(|_| DEFAULT_ID_NAMESPACE.to_string()),
        };

        Ok(config)
    }

    /// Configuration for tests and embedded use: in-memory friendly, synchronous validation.
    pub fn for_tests() -> Self {
        Self {
            validation_mode: ValidationMode::Sync,
            ..Self::default()
        }
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.db_max_connections == 0 {
            return Err(anyhow::anyhow!("DB_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.id_namespace.trim().is_empty() {
            return Err(anyhow::anyhow!("ID_NAMESPACE cannot be empty"));
        }

        match self.database_url.as_deref() {
            Some(url) if !url.starts_with("postgres://") && !url.starts_with("postgresql://") => {
                Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ))
            }
            None if self.is_production() => Err(anyhow::anyhow!(
                "DATABASE_URL must be set in production"
            )),
            _ => Ok(()),
        }
    }
}
