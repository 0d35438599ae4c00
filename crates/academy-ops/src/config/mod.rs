use chrono_tz::Tz;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::prospects::FollowUpPolicy;

/// Upper bound for the "days before" offsets, about ten years.
const MAX_LEAD_DAYS: i64 = 3650;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub scheduling: SchedulingConfig,
    pub notifications: NotificationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let data_dir = PathBuf::from(env::var("APP_DATA_DIR").unwrap_or_else(|_| "data".into()));

        let timezone_raw = env::var("APP_TIMEZONE").unwrap_or_else(|_| "Europe/Paris".into());
        let timezone = timezone_raw
            .trim()
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(timezone_raw.clone()))?;

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{host}:{port}"))
            .trim_end_matches('/')
            .to_string();

        let scheduling = SchedulingConfig {
            interval: Duration::from_secs(env_number("SCHEDULER_INTERVAL_SECS", 1800)?),
            timezone,
            reminder_lead_days: env_days("REMINDER_LEAD_DAYS", 5)?,
            public_base_url,
            follow_up: FollowUpPolicy {
                days_before: env_days("FOLLOWUP_DAYS_BEFORE", 21)?,
                discount_percent: env_number("FOLLOWUP_DISCOUNT_PERCENT", 30)?,
                price_margin: env_number("FOLLOWUP_PRICE_MARGIN", 100)?,
            },
        };

        let notifications = NotificationConfig {
            email_webhook: optional_env("NOTIFY_EMAIL_WEBHOOK"),
            sms_webhook: optional_env("NOTIFY_SMS_WEBHOOK"),
            timeout: Duration::from_secs(env_number("NOTIFY_TIMEOUT_SECS", 10)?),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            storage: StorageConfig { data_dir },
            scheduling,
            notifications,
        })
    }
}

fn env_number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        _ => Ok(default),
    }
}

fn env_days(key: &'static str, default: i64) -> Result<i64, ConfigError> {
    let days = env_number(key, default)?;
    if (0..=MAX_LEAD_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(ConfigError::InvalidNumber {
            key,
            value: days.to_string(),
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Location of the persisted state document.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }
}

/// Calendar and trigger parameters shared by the session workflow and the dispatch engine.
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    pub interval: Duration,
    pub timezone: Tz,
    pub reminder_lead_days: i64,
    pub public_base_url: String,
    pub follow_up: FollowUpPolicy,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1800),
            timezone: Tz::Europe__Paris,
            reminder_lead_days: 5,
            public_base_url: "http://127.0.0.1:3000".to_string(),
            follow_up: FollowUpPolicy::default(),
        }
    }
}

/// Outbound channel endpoints. A missing webhook falls back to a log-only channel.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub email_webhook: Option<String>,
    pub sms_webhook: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimezone(String),
    InvalidNumber { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimezone(value) => {
                write!(f, "APP_TIMEZONE '{value}' is not a known IANA timezone")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative number in range, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidTimezone(_)
            | ConfigError::InvalidNumber { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_DATA_DIR",
            "APP_TIMEZONE",
            "PUBLIC_BASE_URL",
            "SCHEDULER_INTERVAL_SECS",
            "REMINDER_LEAD_DAYS",
            "FOLLOWUP_DAYS_BEFORE",
            "FOLLOWUP_DISCOUNT_PERCENT",
            "FOLLOWUP_PRICE_MARGIN",
            "NOTIFY_EMAIL_WEBHOOK",
            "NOTIFY_SMS_WEBHOOK",
            "NOTIFY_TIMEOUT_SECS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.scheduling.interval, Duration::from_secs(1800));
        assert_eq!(config.scheduling.reminder_lead_days, 5);
        assert_eq!(config.scheduling.timezone, Tz::Europe__Paris);
        assert_eq!(config.scheduling.follow_up.days_before, 21);
        assert_eq!(config.scheduling.follow_up.discount_percent, 30);
        assert_eq!(config.scheduling.follow_up.price_margin, 100);
        assert_eq!(config.scheduling.public_base_url, "http://127.0.0.1:3000");
        assert!(config.notifications.email_webhook.is_none());
        assert_eq!(config.notifications.timeout, Duration::from_secs(10));
        assert_eq!(config.storage.state_path(), PathBuf::from("data/state.json"));
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn rejects_unknown_timezone() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_TIMEZONE", "Mars/Olympus_Mons");
        let err = AppConfig::load().expect_err("timezone must be validated");
        assert!(matches!(err, ConfigError::InvalidTimezone(_)));
        reset_env();
    }

    #[test]
    fn rejects_malformed_numbers() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("REMINDER_LEAD_DAYS", "five");
        let err = AppConfig::load().expect_err("numbers must be validated");
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                key: "REMINDER_LEAD_DAYS",
                ..
            }
        ));
        reset_env();
    }

    #[test]
    fn rejects_day_offsets_outside_range() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        for (key, value) in [
            ("REMINDER_LEAD_DAYS", "-1"),
            ("REMINDER_LEAD_DAYS", "200000000000000"),
            ("FOLLOWUP_DAYS_BEFORE", "-21"),
            ("FOLLOWUP_DAYS_BEFORE", "3651"),
        ] {
            reset_env();
            env::set_var(key, value);
            let err = AppConfig::load().expect_err("offset must be in range");
            assert!(
                matches!(&err, ConfigError::InvalidNumber { key: rejected, value: raw } if *rejected == key && raw == value),
                "{key}={value} gave {err}"
            );
        }

        reset_env();
        env::set_var("REMINDER_LEAD_DAYS", "0");
        env::set_var("FOLLOWUP_DAYS_BEFORE", "3650");
        let config = AppConfig::load().expect("bounds are inclusive");
        assert_eq!(config.scheduling.reminder_lead_days, 0);
        assert_eq!(config.scheduling.follow_up.days_before, 3650);
        reset_env();
    }

    #[test]
    fn trims_trailing_slash_from_public_url() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PUBLIC_BASE_URL", "https://academy.example/");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.scheduling.public_base_url, "https://academy.example");
        reset_env();
    }
}
