//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default Supabase URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://random.supabase.co",
};

/// Default Supabase publishable key (can be overridden at compile time via SUPABASE_PUBLISHABLE_KEY env var).
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str = match option_env!("SUPABASE_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "random-key",
};

/// Shipped AI provider key seeded into the key store when the user has none.
/// Only ever injected at build time; there is no literal fallback.
pub const DEFAULT_AI_KEY: Option<&str> = option_env!("DASHBOARD_DEFAULT_AI_KEY");

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Session snapshot TTL.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 5 * 60;

/// Minimum spacing between verification refresh attempts.
pub const DEFAULT_VERIFICATION_COOLDOWN_SECS: u64 = 30;

/// Interval of the background profile reconciliation sweep.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10 * 60;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase publishable API key (public, safe to expose).
    #[serde(default = "default_supabase_publishable_key")]
    pub supabase_publishable_key: String,
    /// Default AI provider key seeded into the key store.
    #[serde(default = "default_ai_key", skip_serializing)]
    pub default_ai_key: Option<String>,
    /// Local-development override: create profiles for unverified accounts.
    #[serde(default)]
    pub allow_unverified_profiles: bool,
    /// Session snapshot TTL in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_cache_ttl_secs: u64,
    /// Verification refresh cooldown in seconds.
    #[serde(default = "default_verification_cooldown_secs")]
    pub verification_cooldown_secs: u64,
    /// Reconciliation sweep interval in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_publishable_key() -> String {
    DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string()
}

fn default_ai_key() -> Option<String> {
    DEFAULT_AI_KEY.map(|s| s.to_string())
}

fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}

fn default_verification_cooldown_secs() -> u64 {
    DEFAULT_VERIFICATION_COOLDOWN_SECS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            supabase_url: default_supabase_url(),
            supabase_publishable_key: default_supabase_publishable_key(),
            default_ai_key: default_ai_key(),
            allow_unverified_profiles: false,
            session_cache_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            verification_cooldown_secs: DEFAULT_VERIFICATION_COOLDOWN_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file. The default AI key is never written.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override values from environment variables.
    ///
    /// `lookup` abstracts `std::env::var` so overrides can be tested without
    /// touching the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(level) = non_empty("DASHBOARD_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = non_empty("DASHBOARD_SUPABASE_URL") {
            self.supabase_url = url;
        }
        if let Some(key) = non_empty("DASHBOARD_SUPABASE_PUBLISHABLE_KEY") {
            self.supabase_publishable_key = key;
        }
        if let Some(key) = non_empty("DASHBOARD_DEFAULT_AI_KEY") {
            self.default_ai_key = Some(key);
        }
        if let Some(flag) = non_empty("DASHBOARD_ALLOW_UNVERIFIED_PROFILES") {
            self.allow_unverified_profiles = matches!(
                flag.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(ttl) = non_empty("DASHBOARD_SESSION_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.session_cache_ttl_secs = ttl;
        }
    }

    /// Reject configurations the auth layer cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        self.supabase_url()?;
        if self.supabase_publishable_key.trim().is_empty() {
            return Err(CoreError::Config(
                "supabase_publishable_key must not be empty".to_string(),
            ));
        }
        if self.session_cache_ttl_secs == 0 {
            return Err(CoreError::Config(
                "session_cache_ttl_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }
}
