//! # Register Configuration
//!
//! Where the register runs, how long it waits and how hard it retries.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     LOYALTY_ORGANIZATION_ID=org-demo                                   │
//! │     LOYALTY_BRANCH_ID=branch-main                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/register/register.toml (Linux)                           │
//! │     ~/Library/Application Support/com.loyalty.register/register.toml   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # register.toml
//! [cashier]
//! organization_id = "org-demo"
//! branch_id = "branch-main"
//! cashier_id = "cashier-1"
//!
//! [session]
//! max_payload_age_secs = 300
//!
//! [timeouts]
//! lookup_secs = 8
//! commit_secs = 20
//!
//! [retry]
//! read_attempts = 3
//! initial_backoff_ms = 200
//! max_backoff_ms = 2000
//!
//! [ledger]
//! idempotency_ttl_hours = 24
//!
//! [database]
//! path = "./loyalty_dev.db"
//! max_connections = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use loyalty_core::SessionContext;
use loyalty_db::DbConfig;

use crate::error::ConfigError;
use crate::retry::ReadPolicy;

// =============================================================================
// Cashier
// =============================================================================

/// Who operates this register and where. Read once at sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashierConfig {
    #[serde(default = "default_organization_id")]
    pub organization_id: String,

    #[serde(default = "default_branch_id")]
    pub branch_id: String,

    #[serde(default = "default_cashier_id")]
    pub cashier_id: String,
}

fn default_organization_id() -> String {
    "org-demo".to_string()
}

fn default_branch_id() -> String {
    "branch-main".to_string()
}

fn default_cashier_id() -> String {
    "cashier-1".to_string()
}

impl Default for CashierConfig {
    fn default() -> Self {
        Self {
            organization_id: default_organization_id(),
            branch_id: default_branch_id(),
            cashier_id: default_cashier_id(),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Scanned codes older than this are rejected as expired.
    #[serde(default = "default_max_payload_age_secs")]
    pub max_payload_age_secs: u64,
}

fn default_max_payload_age_secs() -> u64 {
    (loyalty_core::DEFAULT_MAX_PAYLOAD_AGE_MS / 1000) as u64
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_payload_age_secs: default_max_payload_age_secs(),
        }
    }
}

// =============================================================================
// Timeouts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Budget for a read, retries included.
    #[serde(default = "default_lookup_secs")]
    pub lookup_secs: u64,

    /// Budget for a single commit attempt.
    #[serde(default = "default_commit_secs")]
    pub commit_secs: u64,
}

fn default_lookup_secs() -> u64 {
    8
}

fn default_commit_secs() -> u64 {
    20
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            lookup_secs: default_lookup_secs(),
            commit_secs: default_commit_secs(),
        }
    }
}

// =============================================================================
// Retry
// =============================================================================

/// Read retries. Commits are never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_read_attempts")]
    pub read_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_read_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            read_attempts: default_read_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

// =============================================================================
// Ledger
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// How long an idempotency record is kept.
    #[serde(default = "default_idempotency_ttl_hours")]
    pub idempotency_ttl_hours: u64,
}

fn default_idempotency_ttl_hours() -> u64 {
    24
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl_hours: default_idempotency_ttl_hours(),
        }
    }
}

// =============================================================================
// Database
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./loyalty_dev.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Register Config (Top-Level)
// =============================================================================

/// Complete register configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterConfig {
    #[serde(default)]
    pub cashier: CashierConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

impl RegisterConfig {
    /// Loads configuration: defaults, then the TOML file, then environment
    /// overrides, then validation.
    ///
    /// A missing file is not an error.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading register config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or falls back to defaults.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load register config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::SaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        info!(?path, "Register config saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("cashier.organization_id", &self.cashier.organization_id),
            ("cashier.branch_id", &self.cashier.branch_id),
            ("cashier.cashier_id", &self.cashier.cashier_id),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", field)));
            }
        }

        if self.session.max_payload_age_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.max_payload_age_secs must be greater than 0".into(),
            ));
        }

        if self.timeouts.lookup_secs == 0 || self.timeouts.commit_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be greater than 0".into()));
        }

        if self.retry.read_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.read_attempts must be at least 1".into(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("LOYALTY_ORGANIZATION_ID") {
            debug!(organization_id = %id, "Overriding organization from environment");
            self.cashier.organization_id = id;
        }

        if let Ok(id) = std::env::var("LOYALTY_BRANCH_ID") {
            debug!(branch_id = %id, "Overriding branch from environment");
            self.cashier.branch_id = id;
        }

        if let Ok(id) = std::env::var("LOYALTY_CASHIER_ID") {
            self.cashier.cashier_id = id;
        }

        if let Ok(path) = std::env::var("LOYALTY_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(age) = std::env::var("LOYALTY_MAX_PAYLOAD_AGE_SECS") {
            match age.parse::<u64>() {
                Ok(secs) => self.session.max_payload_age_secs = secs,
                Err(_) => warn!(value = %age, "Ignoring invalid LOYALTY_MAX_PAYLOAD_AGE_SECS"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "loyalty", "register")
            .map(|dirs| dirs.config_dir().join("register.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// The session context every orchestrator call runs under.
    pub fn session_context(&self) -> SessionContext {
        SessionContext::new(
            &self.cashier.organization_id,
            &self.cashier.branch_id,
            &self.cashier.cashier_id,
        )
    }

    pub fn max_payload_age_ms(&self) -> i64 {
        i64::try_from(self.session.max_payload_age_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    pub fn read_policy(&self) -> ReadPolicy {
        ReadPolicy {
            timeout: Duration::from_secs(self.timeouts.lookup_secs),
            max_attempts: self.retry.read_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.commit_secs)
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .idempotency_ttl(Duration::from_secs(
                self.ledger.idempotency_ttl_hours.saturating_mul(3600),
            ))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegisterConfig::default();
        assert_eq!(config.timeouts.lookup_secs, 8);
        assert_eq!(config.timeouts.commit_secs, 20);
        assert_eq!(config.max_payload_age_ms(), 300_000);
        assert_eq!(config.ledger.idempotency_ttl_hours, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: RegisterConfig = toml::from_str(
            r#"
            [cashier]
            organization_id = "org-7"
            branch_id = "branch-3"

            [timeouts]
            commit_secs = 45
            "#,
        )
        .unwrap();

        assert_eq!(config.cashier.organization_id, "org-7");
        assert_eq!(config.cashier.cashier_id, "cashier-1");
        assert_eq!(config.timeouts.lookup_secs, 8);
        assert_eq!(config.commit_timeout(), Duration::from_secs(45));
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_validation_rejects_empty_branch() {
        let mut config = RegisterConfig::default();
        config.cashier.branch_id = " ".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validation_rejects_inverted_backoff() {
        let mut config = RegisterConfig::default();
        config.retry.initial_backoff_ms = 5_000;
        assert!(config.validate().is_err());

        config.retry.initial_backoff_ms = 100;
        config.retry.read_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_context_and_read_policy() {
        let config = RegisterConfig::default();
        let ctx = config.session_context();
        assert_eq!(ctx.organization_id, "org-demo");
        assert_eq!(ctx.branch_id, "branch-main");

        let policy = config.read_policy();
        assert_eq!(policy.timeout, Duration::from_secs(8));
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn test_load_and_save_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("register.toml");
        let mut config = RegisterConfig::default();
        config.cashier.cashier_id = "cashier-9".into();
        config.save(Some(path.clone())).unwrap();

        let loaded = RegisterConfig::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.cashier.cashier_id, "cashier-9");
    }

    #[test]
    fn test_toml_serialization() {
        let config = RegisterConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[cashier]"));
        assert!(toml_str.contains("[timeouts]"));
        assert!(toml_str.contains("[database]"));
    }
}
