//! Deployment configuration, validated before any side effect.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised by configuration validation.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required option '{0}'")]
    MissingOption(&'static str),

    #[error("port '{0}' must be non-zero")]
    InvalidPort(&'static str),
}

/// Ports the provisioned service listens on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ports {
    /// REST API port.
    pub api: u16,
    /// VPN (UDP) port.
    pub vpn: u16,
}

/// Everything a deployment plan needs, passed in explicitly at
/// construction rather than read from ambient environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Server address advertised by the service.
    pub host: String,
    /// Bearer credential for the service's REST API.
    pub auth_token: String,
    /// Container image to run.
    pub image_reference: String,
    /// Whether to provision a first VPN client after the API is up.
    pub create_first_client: bool,
    /// DNS server handed to clients.
    pub dns_server: String,
    /// Listen ports.
    pub ports: Ports,
    /// Host directory holding the service's persistent configuration.
    /// Its contents are opaque to the engine.
    pub state_dir: PathBuf,
    /// Name for the first client, when one is created.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Where fetched client artifacts (config, QR image) are written.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
}

fn default_client_name() -> String {
    "client-1".to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(".")
}

impl DeployConfig {
    /// Reject the configuration before any stage runs. Every required
    /// option must be present and well-formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingOption("host"));
        }
        if self.auth_token.trim().is_empty() {
            return Err(ConfigError::MissingOption("auth_token"));
        }
        if self.image_reference.trim().is_empty() {
            return Err(ConfigError::MissingOption("image_reference"));
        }
        if self.dns_server.trim().is_empty() {
            return Err(ConfigError::MissingOption("dns_server"));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingOption("state_dir"));
        }
        if self.ports.api == 0 {
            return Err(ConfigError::InvalidPort("api"));
        }
        if self.ports.vpn == 0 {
            return Err(ConfigError::InvalidPort("vpn"));
        }
        Ok(())
    }

    /// Base URL of the service's REST API.
    pub fn api_base(&self) -> String {
        format!("http://{}:{}", self.host, self.ports.api)
    }
}
