use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, ensure};

use tern_protocol::SessionConfig;

/// Runtime settings for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Well-known endpoint requests arrive on.
    pub bind_addr: SocketAddr,
    pub storage_dir: PathBuf,
    /// Timeout and retry budget for every transfer session.
    pub session: SessionConfig,
    /// How often the janitor reaps finished workers.
    pub janitor_interval: Duration,
    /// Receive timeout of the accept loop; bounds shutdown latency.
    pub poll_interval: Duration,
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr, storage_dir: PathBuf) -> Self {
        Self {
            bind_addr,
            storage_dir,
            session: SessionConfig::default(),
            janitor_interval: Duration::from_secs(15),
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Read `TERN_*` variables, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("TERN_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("TERN_PORT")
            .unwrap_or_else(|_| "69".into())
            .parse()?;
        let storage_dir: PathBuf = std::env::var("TERN_STORAGE_DIR")
            .unwrap_or_else(|_| "./server-storage".into())
            .into();

        // a zero read timeout is rejected by the socket layer
        let timeout_secs = positive("TERN_TIMEOUT_SECS", env_or("TERN_TIMEOUT_SECS", 5)?)?;
        let max_retries: u32 = env_or("TERN_MAX_RETRIES", 5)?;
        let janitor_secs = positive("TERN_JANITOR_INTERVAL_SECS", env_or("TERN_JANITOR_INTERVAL_SECS", 15)?)?;
        let poll_millis = positive("TERN_POLL_MILLIS", env_or("TERN_POLL_MILLIS", 500)?)?;

        let bind_addr: SocketAddr = format!("{}:{}", host, port).parse()?;
        Ok(Self {
            bind_addr,
            storage_dir,
            session: SessionConfig {
                timeout: Duration::from_secs(timeout_secs),
                max_retries,
            },
            janitor_interval: Duration::from_secs(janitor_secs),
            poll_interval: Duration::from_millis(poll_millis),
        })
    }
}

fn positive(key: &str, value: u64) -> anyhow::Result<u64> {
    ensure!(value > 0, "{} must be at least 1", key);
    Ok(value)
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_or(key, std::env::var(key).ok().as_deref(), default)
}

/// Parse `value` as `T`, or use `default` when the variable is unset.
fn parse_or<T>(key: &str, value: Option<&str>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v.trim().parse().with_context(|| format!("invalid {}={:?}", key, v)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = ServerConfig::new("127.0.0.1:69".parse().unwrap(), "store".into());
        assert_eq!(config.session.timeout, Duration::from_secs(5));
        assert_eq!(config.session.max_retries, 5);
        assert_eq!(config.janitor_interval, Duration::from_secs(15));
    }

    #[test]
    fn unset_variables_fall_back() {
        assert_eq!(env_or("TERN_TEST_SURELY_UNSET_VARIABLE", 42u64).unwrap(), 42);
    }

    #[test]
    fn out_of_range_values_are_errors() {
        assert_eq!(parse_or("TERN_PORT", Some("6969"), 69u16).unwrap(), 6969);
        assert!(parse_or("TERN_PORT", Some("70000"), 69u16).is_err());
        assert!(parse_or("TERN_MAX_RETRIES", Some("4294967296"), 5u32).is_err());
        assert!(parse_or("TERN_MAX_RETRIES", Some("five"), 5u32).is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(positive("TERN_TIMEOUT_SECS", 0).is_err());
        assert_eq!(positive("TERN_TIMEOUT_SECS", 3).unwrap(), 3);
    }
}
