use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `supabase.key`
pub const KEY_ENV_VAR: &str = "QSOLIVE_SUPABASE_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub udp: UdpConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    /// Service-role key; inserts bypass row-level security
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdpConfig {
    #[serde(default = "default_udp_host")]
    pub host: String,
    #[serde(default = "default_udp_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperatorConfig {
    pub callsign: Option<String>,
}

/// What the listener does when the delivery queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Drop the incoming record immediately
    DropNewest,
    /// Wait up to `enqueue_timeout_ms` for space, then drop the incoming record
    Block,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Seconds between attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_overflow")]
    pub overflow: OverflowPolicy,
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Send `qso_key` and ask the endpoint to ignore duplicates; needs a
    /// unique `qso_key` column on `contacts`
    #[serde(default)]
    pub idempotency_key: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file: Option<PathBuf>,
}

fn default_udp_host() -> String {
    "0.0.0.0".to_string()
}

fn default_udp_port() -> u16 {
    2237
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    256
}

fn default_overflow() -> OverflowPolicy {
    OverflowPolicy::Block
}

fn default_enqueue_timeout_ms() -> u64 {
    1000
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            host: default_udp_host(),
            port: default_udp_port(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            timeout_secs: default_timeout_secs(),
            queue_capacity: default_queue_capacity(),
            overflow: default_overflow(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            idempotency_key: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl UdpConfig {
    /// `host:port` string suitable for `UdpSocket::bind`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        let mut config = Self::from_toml(&content)?;

        if let Ok(key) = std::env::var(KEY_ENV_VAR) {
            if !key.trim().is_empty() {
                config.supabase.key = key;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.supabase.url.trim().is_empty() {
            anyhow::bail!("supabase.url must not be empty");
        }
        if self.supabase.key.trim().is_empty() {
            anyhow::bail!("supabase.key must not be empty (or set {})", KEY_ENV_VAR);
        }
        if self.delivery.retry_attempts == 0 {
            anyhow::bail!("delivery.retry_attempts must be at least 1");
        }
        if self.delivery.queue_capacity == 0 {
            anyhow::bail!("delivery.queue_capacity must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [supabase]
        url = "https://example.supabase.co"
        key = "service-role-key"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.udp.bind_addr(), "0.0.0.0:2237");
        assert_eq!(config.delivery.retry_attempts, 3);
        assert_eq!(config.delivery.retry_delay, 5);
        assert_eq!(config.delivery.overflow, OverflowPolicy::Block);
        assert!(!config.delivery.idempotency_key);
        assert_eq!(config.logging.level, "info");
        assert!(config.operator.callsign.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            [supabase]
            url = "http://localhost:54321"
            key = "k"

            [udp]
            host = "127.0.0.1"
            port = 12060

            [operator]
            callsign = "N1XYZ"

            [delivery]
            retry_attempts = 5
            retry_delay = 2
            overflow = "drop-newest"
            idempotency_key = true

            [logging]
            level = "debug"
            file = "qsolive_client.log"
            "#,
        )
        .unwrap();

        assert_eq!(config.udp.bind_addr(), "127.0.0.1:12060");
        assert_eq!(config.operator.callsign.as_deref(), Some("N1XYZ"));
        assert_eq!(config.delivery.retry_attempts, 5);
        assert_eq!(config.delivery.overflow, OverflowPolicy::DropNewest);
        assert!(config.delivery.idempotency_key);
        assert_eq!(
            config.logging.file.as_deref(),
            Some(Path::new("qsolive_client.log"))
        );
    }

    #[test]
    fn test_missing_supabase_section_fails() {
        assert!(Config::from_toml("[udp]\nport = 2237\n").is_err());
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.delivery.retry_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.supabase.key = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load(Path::new("/nonexistent/qsolive.toml")).is_err());
    }
}
