use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::RetryPolicy;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub store: StoreSettings,
    pub database: Option<DatabaseSettings>,
    pub redis: Option<RedisSettings>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    pub appwrite: Option<AppwriteSettings>,
    #[serde(default)]
    pub quota: QuotaSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Persistence backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_l1_cache_size")]
    pub l1_cache_size: u64,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            l1_cache_size: default_l1_cache_size(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_l1_cache_size() -> u64 { 10_000 }
fn default_cache_ttl() -> u64 { 60 }

/// Identity provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    #[default]
    Appwrite,
    Jwt,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthSettings {
    #[serde(default)]
    pub provider: AuthProvider,
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppwriteSettings {
    pub endpoint: String,
    pub project_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaSettings {
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            window_secs: default_window_secs(),
        }
    }
}

impl QuotaSettings {
    /// Window length; out-of-range values are clamped, `validate` rejects them
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_secs.clamp(1, MAX_WINDOW_SECS) as i64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_secs == 0 {
            return Err(ConfigError::Message(
                "quota.window_secs must be greater than zero".to_string(),
            ));
        }
        if self.window_secs > MAX_WINDOW_SECS {
            return Err(ConfigError::Message(format!(
                "quota.window_secs must be at most {} (got {})",
                MAX_WINDOW_SECS, self.window_secs
            )));
        }
        Ok(())
    }
}

fn default_daily_limit() -> u32 { 50 }
fn default_window_secs() -> u64 { 24 * 60 * 60 }

/// One year
const MAX_WINDOW_SECS: u64 = 366 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

fn default_max_attempts() -> u32 { 5 }
fn default_base_delay_ms() -> u64 { 20 }
fn default_max_delay_ms() -> u64 { 250 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with LUME_)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., LUME__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("LUME")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings = substitute_env_vars(settings)?;

        let settings: Self = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("LUME")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would disable or break quota enforcement
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.quota.validate()
    }
}

/// Apply the conventional unprefixed variables on top of the layered config
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(database_url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database.url", database_url)?;
    }
    if let Ok(redis_url) = env::var("REDIS_URL") {
        builder = builder.set_override("redis.url", redis_url)?;
    }
    if let Ok(secret) = env::var("JWT_SECRET") {
        builder = builder.set_override("auth.jwt_secret", secret)?;
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quota() {
        let quota = QuotaSettings::default();
        assert_eq!(quota.daily_limit, 50);
        assert_eq!(quota.window(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetrySettings::default().policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(20));
        assert_eq!(policy.max_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_default_logging() {
        let logging = LoggingSettings::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, "json");
    }

    #[test]
    fn test_quota_window_bounds() {
        let zero = QuotaSettings { daily_limit: 2, window_secs: 0 };
        assert!(matches!(zero.validate(), Err(ConfigError::Message(_))));

        let huge = QuotaSettings { daily_limit: 2, window_secs: 1 << 62 };
        assert!(matches!(huge.validate(), Err(ConfigError::Message(_))));
        assert_eq!(huge.window(), chrono::Duration::seconds(MAX_WINDOW_SECS as i64));

        let hour = QuotaSettings { daily_limit: 2, window_secs: 3600 };
        assert!(hour.validate().is_ok());
        assert_eq!(hour.window(), chrono::Duration::hours(1));
    }

    fn load_quota_section(quota: &str) -> Result<Settings, ConfigError> {
        let path = std::env::temp_dir().join(format!("lume-swipe-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            format!("[server]\nhost = \"127.0.0.1\"\nport = 9000\n\n[quota]\n{}\n", quota),
        )
        .unwrap();

        let result = Settings::load_from(&path);
        std::fs::remove_file(&path).ok();
        result
    }

    #[test]
    fn test_load_rejects_zero_window() {
        let err = load_quota_section("daily_limit = 2\nwindow_secs = 0").unwrap_err();
        assert!(err.to_string().contains("window_secs"));
    }

    #[test]
    fn test_load_rejects_oversized_window() {
        let err = load_quota_section("window_secs = 4611686018427387904").unwrap_err();
        assert!(err.to_string().contains("window_secs"));

        let settings = load_quota_section("window_secs = 3600").unwrap();
        assert_eq!(settings.quota.window(), chrono::Duration::hours(1));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("lume-swipe-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"
[server]
host = "127.0.0.1"
port = 9000

[store]
backend = "redis"

[redis]
url = "redis://localhost:6379"

[auth]
provider = "jwt"
jwt_secret = "s3cret"

[quota]
daily_limit = 20
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.store.backend, StoreBackend::Redis);
        assert_eq!(settings.auth.provider, AuthProvider::Jwt);
        assert_eq!(settings.quota.daily_limit, 20);
        assert_eq!(settings.quota.window_secs, 86_400);
        assert_eq!(settings.retry.max_attempts, 5);
        assert!(settings.database.is_none());
    }
}
