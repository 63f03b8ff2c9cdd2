use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::store::StoreConfig;

pub const DEFAULT_NETWORK_NAME: &str = "whatsapp-mvp_zapi_network";
pub const DEFAULT_CONNECTOR_IMAGE: &str = "conector-baileys:latest";
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub store: StoreConfig,
    pub provisioning: ProvisioningConfig,
    pub connector: ConnectorConfig,
    pub docker_socket: PathBuf,
}

/// Fixed parameters of every connector container.
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    pub network_name: String,
    pub connector_image: String,
}

/// How connectors are reached once running.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub port: u16,
    pub timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            timeout: Duration::from_secs(15),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            var(name).ok_or_else(|| anyhow!("{name} must be set to start the facade"))
        };

        let listen_addr = var("ZAPI_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8000".to_string())
            .parse()
            .context("ZAPI_LISTEN_ADDR is not a socket address")?;

        let log_level = var("ZAPI_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let store = StoreConfig {
            url: required("SUPABASE_URL")?,
            key: required("SUPABASE_KEY")?,
        };

        let provisioning = ProvisioningConfig {
            network_name: var("ZAPI_NETWORK_NAME")
                .unwrap_or_else(|| DEFAULT_NETWORK_NAME.to_string()),
            connector_image: var("ZAPI_CONNECTOR_IMAGE")
                .unwrap_or_else(|| DEFAULT_CONNECTOR_IMAGE.to_string()),
        };

        let defaults = ConnectorConfig::default();
        let connector = ConnectorConfig {
            port: match var("ZAPI_CONNECTOR_PORT") {
                Some(v) => v.parse().context("ZAPI_CONNECTOR_PORT is not a port")?,
                None => defaults.port,
            },
            timeout: match var("ZAPI_CONNECTOR_TIMEOUT_SECS") {
                Some(v) => Duration::from_secs(
                    v.parse()
                        .context("ZAPI_CONNECTOR_TIMEOUT_SECS is not a number of seconds")?,
                ),
                None => defaults.timeout,
            },
        };

        let docker_host = var("DOCKER_HOST").unwrap_or_else(|| DEFAULT_DOCKER_HOST.to_string());
        let Some(socket) = docker_host.strip_prefix("unix://") else {
            bail!("DOCKER_HOST must be a unix:// socket, got '{docker_host}'");
        };

        Ok(Self {
            listen_addr,
            log_level,
            store,
            provisioning,
            connector,
            docker_socket: PathBuf::from(socket),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://db.example"),
            ("SUPABASE_KEY", "key"),
        ]))
        .unwrap();

        assert_eq!(config.listen_addr.port(), 8000);
        assert_eq!(config.provisioning.network_name, DEFAULT_NETWORK_NAME);
        assert_eq!(config.provisioning.connector_image, DEFAULT_CONNECTOR_IMAGE);
        assert_eq!(config.connector.port, 3000);
        assert_eq!(config.connector.timeout, Duration::from_secs(15));
        assert_eq!(config.docker_socket, PathBuf::from("/var/run/docker.sock"));
    }

    #[test]
    fn test_missing_store_credentials_fail_fast() {
        let err = Config::from_lookup(lookup(&[("SUPABASE_URL", "https://db.example")]))
            .unwrap_err();
        assert!(err.to_string().contains("SUPABASE_KEY"));

        let err = Config::from_lookup(lookup(&[("SUPABASE_URL", ""), ("SUPABASE_KEY", "k")]))
            .unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://db.example"),
            ("SUPABASE_KEY", "key"),
            ("ZAPI_NETWORK_NAME", "other_net"),
            ("ZAPI_CONNECTOR_PORT", "3100"),
            ("ZAPI_CONNECTOR_TIMEOUT_SECS", "2"),
            ("DOCKER_HOST", "unix:///tmp/docker.sock"),
        ]))
        .unwrap();

        assert_eq!(config.provisioning.network_name, "other_net");
        assert_eq!(config.connector.port, 3100);
        assert_eq!(config.connector.timeout, Duration::from_secs(2));
        assert_eq!(config.docker_socket, PathBuf::from("/tmp/docker.sock"));
    }

    #[test]
    fn test_tcp_docker_host_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://db.example"),
            ("SUPABASE_KEY", "key"),
            ("DOCKER_HOST", "tcp://127.0.0.1:2375"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DOCKER_HOST"));
    }
}
