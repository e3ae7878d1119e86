//! Process configuration, loaded once at startup from the environment
//! (spec.md §6 "Process env"). Mirrors the load-validate-construct-once
//! shape of `r2e-observability::ObservabilityConfig` — a typed struct built
//! by a fallible `from_env()`, then passed by value into every component
//! that needs it. No global config singleton.

use crate::provider::Provider;
use std::collections::HashMap;
use std::env::VarError;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub public_origin: String,
    pub internal_ws_secret: String,
    pub scheduled_posts_interval: Duration,
    pub social_import_workers_enabled: bool,
    pub providers: HashMap<Provider, ProviderConfig>,
}

/// Per-provider governor + import tuning (spec.md §4.3, §4.7).
#[derive(Debug, Clone, Copy)]
pub struct ProviderConfig {
    /// Token-bucket requests-per-second.
    pub requests_per_second: f64,
    /// Token-bucket burst size.
    pub burst: u32,
    /// Daily import quota; `0` means unlimited.
    pub daily_max: u32,
    /// ImportRunner tick interval for this provider.
    pub import_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            burst: 5,
            daily_max: 0,
            import_interval: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingVar(name) => write!(f, "missing required env var {name}"),
            ConfigError::InvalidVar { name, value } => {
                write!(f, "invalid value for {name}: {value:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        Ok(_) | Err(VarError::NotPresent) => Err(ConfigError::MissingVar(name)),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::InvalidVar {
            name,
            value: "<non-unicode>".to_string(),
        }),
    }
}

fn optional_parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidVar { name, value: v }),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from the process environment, failing fast on a
    /// missing `DATABASE_URL` (spec.md §6 exit codes: fatal startup error).
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let port = optional_parsed("PORT", 3000u16)?;
        let public_origin =
            std::env::var("PUBLIC_ORIGIN").unwrap_or_else(|_| format!("http://localhost:{port}"));
        let internal_ws_secret = std::env::var("INTERNAL_WS_SECRET").unwrap_or_default();
        let scheduled_posts_interval = Duration::from_secs(optional_parsed(
            "SCHEDULED_POSTS_INTERVAL_SECONDS",
            60u64,
        )?);
        let social_import_workers_enabled =
            optional_parsed("SOCIAL_IMPORT_WORKERS_ENABLED", true)?;

        let mut providers = HashMap::new();
        for &provider in Provider::ALL {
            let upper = provider.as_str().to_uppercase();
            let rps = optional_parsed::<f64>(
                leak(format!("{upper}_RPS")),
                ProviderConfig::default().requests_per_second,
            )?;
            let burst = optional_parsed::<u32>(
                leak(format!("{upper}_BURST")),
                ProviderConfig::default().burst,
            )?;
            let daily_max = optional_parsed::<u32>(
                leak(format!("{upper}_DAILY_MAX")),
                ProviderConfig::default().daily_max,
            )?;
            let import_interval_secs = optional_parsed::<u64>(
                leak(format!("SOCIAL_IMPORT_{upper}_INTERVAL_SECONDS")),
                ProviderConfig::default().import_interval.as_secs(),
            )?;
            providers.insert(
                provider,
                ProviderConfig {
                    requests_per_second: rps,
                    burst,
                    daily_max,
                    import_interval: Duration::from_secs(import_interval_secs),
                },
            );
        }

        Ok(Self {
            database_url,
            port,
            public_origin,
            internal_ws_secret,
            scheduled_posts_interval,
            social_import_workers_enabled,
            providers,
        })
    }

    pub fn provider(&self, provider: Provider) -> ProviderConfig {
        self.providers.get(&provider).copied().unwrap_or_default()
    }
}

/// Env var names are built at runtime (per-provider), but `std::env::var`
/// wants a `&str` borrow that our `ConfigError` can carry as `'static` for
/// simplicity of the call sites above; leaking a handful of short strings
/// once at startup is cheap and bounded by `Provider::ALL`'s fixed size.
fn leak(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_requires_database_url() {
        std::env::remove_var("DATABASE_URL");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("DATABASE_URL")));
    }

    #[test]
    #[serial]
    fn from_env_applies_provider_defaults() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        let config = Config::from_env().unwrap();
        let ig = config.provider(Provider::Instagram);
        assert_eq!(ig.daily_max, 0);
        std::env::remove_var("DATABASE_URL");
    }
}
