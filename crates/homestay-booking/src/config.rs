//! # Booking Configuration
//!
//! Configuration for the coordinator: platform fee, retry policy and store
//! location.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HOMESTAY_SERVICE_FEE_BPS=1000                                      │
//! │     HOMESTAY_DB_PATH=/var/lib/homestay/booking.db                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/homestay/booking.toml (Linux)                            │
//! │     ~/Library/Application Support/kr.homestay.booking/booking.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     10% fee, 3 attempts, 10 s step timeout                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # booking.toml
//! [pricing]
//! service_fee_bps = 1000
//!
//! [retry]
//! max_attempts = 3
//! initial_backoff_ms = 200
//! max_backoff_ms = 2000
//! step_timeout_ms = 10000
//!
//! [database]
//! path = "booking.db"
//! max_connections = 5
//! ```

use homestay_core::{FeeRate, DEFAULT_SERVICE_FEE_BPS};
use homestay_db::DbConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{BookingError, BookingResult};

// =============================================================================
// Pricing Settings
// =============================================================================

/// Platform pricing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    /// Service fee in basis points of the pre-fee subtotal.
    /// Default: 1000 (10%)
    #[serde(default = "default_service_fee_bps")]
    pub service_fee_bps: u32,
}

fn default_service_fee_bps() -> u32 {
    DEFAULT_SERVICE_FEE_BPS
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings {
            service_fee_bps: default_service_fee_bps(),
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Retry policy for external calls (availability, ledger writes, gateway).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts per external call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound of a single backoff delay (milliseconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Per-attempt timeout (milliseconds). A timed-out step counts as
    /// failed.
    #[serde(default = "default_step_timeout")]
    pub step_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    200
}
fn default_max_backoff() -> u64 {
    2_000
}
fn default_step_timeout() -> u64 {
    10_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            step_timeout_ms: default_step_timeout(),
        }
    }
}

impl RetrySettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Ledger Store location and pool size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("kr", "homestay", "booking")
        .map(|dirs| dirs.data_dir().join("booking.db"))
        .unwrap_or_else(|| PathBuf::from("booking.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete coordinator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingConfig {
    #[serde(default)]
    pub pricing: PricingSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl BookingConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (booking.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> BookingResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading booking config from file");
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

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load booking config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> BookingResult<()> {
        if self.pricing.service_fee_bps > 10_000 {
            return Err(BookingError::Config(format!(
                "service_fee_bps must be at most 10000, got {}",
                self.pricing.service_fee_bps
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(BookingError::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(BookingError::Config(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }

        if self.retry.step_timeout_ms == 0 {
            return Err(BookingError::Config(
                "step_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(BookingError::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(bps) = std::env::var("HOMESTAY_SERVICE_FEE_BPS") {
            match bps.parse::<u32>() {
                Ok(b) => {
                    debug!(service_fee_bps = b, "Overriding service fee from environment");
                    self.pricing.service_fee_bps = b;
                }
                Err(_) => warn!(value = %bps, "Ignoring unparsable HOMESTAY_SERVICE_FEE_BPS"),
            }
        }

        if let Ok(attempts) = std::env::var("HOMESTAY_RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                self.retry.max_attempts = n;
            }
        }

        if let Ok(ms) = std::env::var("HOMESTAY_STEP_TIMEOUT_MS") {
            if let Ok(n) = ms.parse::<u64>() {
                self.retry.step_timeout_ms = n;
            }
        }

        if let Ok(path) = std::env::var("HOMESTAY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("HOMESTAY_DB_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse::<u32>() {
                self.database.max_connections = n;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("kr", "homestay", "booking")
            .map(|dirs| dirs.config_dir().join("booking.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// The configured platform fee.
    pub fn service_fee_rate(&self) -> FeeRate {
        FeeRate::from_bps(self.pricing.service_fee_bps)
    }

    /// Store configuration for [`homestay_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }
}
