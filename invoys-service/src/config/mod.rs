use crate::services::HttpNotifierConfig;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct InvoysConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Absent means the in-process store.
    pub database: Option<DatabaseConfig>,
    /// Shared secret expected in `X-Cron-Secret`. Without it the cron
    /// endpoint rejects every call.
    pub cron_secret: Option<Secret<String>>,
    /// Public URL of the web app, used for invoice links in emails.
    pub app_base_url: String,
    pub product_name: String,
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: Secret<String>,
    pub from_email: String,
    pub timeout_secs: u64,
}

impl NotifierConfig {
    pub fn http(&self) -> HttpNotifierConfig {
        HttpNotifierConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            from_email: self.from_email.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl Default for InvoysConfig {
    fn default() -> Self {
        Self {
            common: core_config::Config::default(),
            service_name: "invoys-service".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: None,
            cron_secret: None,
            app_base_url: "http://localhost:3000".to_string(),
            product_name: "Invoys".to_string(),
            notifier: NotifierConfig {
                enabled: false,
                api_url: String::new(),
                api_key: Secret::new(String::new()),
                from_email: "invoices@invoys.local".to_string(),
                timeout_secs: 10,
            },
        }
    }
}

impl InvoysConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let defaults = Self::default();

        let database = match env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => Some(DatabaseConfig {
                url: Secret::new(url),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 1)?,
            }),
            _ => None,
        };

        let notifier_enabled: bool = parse_env("NOTIFIER_ENABLED", false)?;
        let notifier = NotifierConfig {
            enabled: notifier_enabled,
            api_url: get_env("NOTIFIER_API_URL", Some(""), notifier_enabled)?,
            api_key: Secret::new(get_env("NOTIFIER_API_KEY", Some(""), notifier_enabled)?),
            from_email: get_env(
                "NOTIFIER_FROM_EMAIL",
                Some(&defaults.notifier.from_email),
                false,
            )?,
            timeout_secs: parse_env("NOTIFIER_TIMEOUT_SECS", defaults.notifier.timeout_secs)?,
        };

        Ok(Self {
            common,
            service_name: get_env("SERVICE_NAME", Some(&defaults.service_name), false)?,
            log_level: get_env("LOG_LEVEL", Some(&defaults.log_level), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database,
            cron_secret: env::var("CRON_SECRET")
                .ok()
                .filter(|s| !s.is_empty())
                .map(Secret::new),
            app_base_url: get_env("APP_BASE_URL", Some(&defaults.app_base_url), false)?,
            product_name: get_env("PRODUCT_NAME", Some(&defaults.product_name), false)?,
            notifier,
        })
    }
}

/// Read `key`, falling back to `default`. A `required` key must be set and
/// non-empty.
fn get_env(key: &str, default: Option<&str>, required: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ if required => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} is required but not set",
            key
        ))),
        _ => default.map(str::to_string).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("{} is required but not set", key))
        }),
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val.parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, val, e))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear() {
        for key in [
            "DATABASE_URL",
            "DATABASE_MAX_CONNECTIONS",
            "CRON_SECRET",
            "NOTIFIER_ENABLED",
            "NOTIFIER_API_URL",
            "NOTIFIER_API_KEY",
            "APP_BASE_URL",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_to_in_process_store_and_no_notifier() {
        clear();
        let config = InvoysConfig::from_env().unwrap();
        assert!(config.database.is_none());
        assert!(config.cron_secret.is_none());
        assert!(!config.notifier.enabled);
        assert_eq!(config.app_base_url, "http://localhost:3000");
        assert_eq!(config.notifier.http().timeout, Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn reads_database_settings() {
        clear();
        env::set_var("DATABASE_URL", "postgres://localhost/invoys");
        env::set_var("DATABASE_MAX_CONNECTIONS", "4");
        let config = InvoysConfig::from_env().unwrap();
        clear();

        let database = config.database.unwrap();
        assert_eq!(database.max_connections, 4);
        assert_eq!(database.min_connections, 1);
    }

    #[test]
    #[serial]
    fn enabled_notifier_requires_api_url() {
        clear();
        env::set_var("NOTIFIER_ENABLED", "true");
        let result = InvoysConfig::from_env();
        clear();

        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    #[serial]
    fn malformed_number_is_a_config_error() {
        clear();
        env::set_var("DATABASE_URL", "postgres://localhost/invoys");
        env::set_var("DATABASE_MAX_CONNECTIONS", "many");
        let result = InvoysConfig::from_env();
        clear();

        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
