use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tern_protocol::SessionConfig;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server's well-known endpoint.
    pub server: SocketAddr,
    /// Directory holding the client's files.
    pub local_dir: PathBuf,
    pub session: SessionConfig,
}

impl ClientConfig {
    pub fn new(server: SocketAddr, local_dir: PathBuf) -> Self {
        Self {
            server,
            local_dir,
            session: SessionConfig::default(),
        }
    }

    /// Resolve `server` (a host, or `host:port`) and read `TERN_*` variables.
    pub fn from_env(server: &str) -> Result<Self> {
        let port: u16 = env_or("TERN_SERVER_PORT", 69)?;
        let local_dir: PathBuf = std::env::var("TERN_LOCAL_DIR")
            .unwrap_or_else(|_| "./client-storage".into())
            .into();
        let timeout_secs: u64 = env_or("TERN_TIMEOUT_SECS", 5)?;
        if timeout_secs == 0 {
            // a zero read timeout is rejected by the socket layer
            return Err(ClientError::InvalidConfig {
                key: "TERN_TIMEOUT_SECS",
                value: "0".into(),
            });
        }
        let max_retries: u32 = env_or("TERN_MAX_RETRIES", 5)?;

        Ok(Self {
            server: resolve(server, port)?,
            local_dir,
            session: SessionConfig {
                timeout: Duration::from_secs(timeout_secs),
                max_retries,
            },
        })
    }
}

/// Parse `host:port` directly, otherwise look `host` up on `default_port`.
pub fn resolve(server: &str, default_port: u16) -> Result<SocketAddr> {
    if let Ok(addr) = server.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let unresolved = || ClientError::UnresolvedServer(server.to_string());
    (server, default_port)
        .to_socket_addrs()
        .map_err(|_| unresolved())?
        .next()
        .ok_or_else(unresolved)
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T> {
    parse_or(key, std::env::var(key).ok(), default)
}

/// Parse `value` as `T`, or use `default` when the variable is unset.
fn parse_or<T: FromStr>(key: &'static str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ClientError::InvalidConfig { key, value: v }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_port_wins() {
        let addr = resolve("127.0.0.1:6969", 69).unwrap();
        assert_eq!(addr.port(), 6969);
    }

    #[test]
    fn bare_ip_uses_default_port() {
        let addr = resolve("127.0.0.1", 69).unwrap();
        assert_eq!(addr, "127.0.0.1:69".parse().unwrap());
    }

    #[test]
    fn variables_parse_into_their_own_type() {
        assert_eq!(parse_or("TERN_SERVER_PORT", None, 69u16).unwrap(), 69);
        assert_eq!(parse_or("TERN_SERVER_PORT", Some("6969".into()), 69u16).unwrap(), 6969);
        assert!(matches!(
            parse_or("TERN_SERVER_PORT", Some("70000".into()), 69u16),
            Err(ClientError::InvalidConfig { key: "TERN_SERVER_PORT", .. })
        ));
        assert!(parse_or("TERN_MAX_RETRIES", Some("-1".into()), 5u32).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            resolve("not a host name", 69),
            Err(ClientError::UnresolvedServer(_))
        ));
    }
}
