//! relaysync configuration
//!
//! Loaded from TOML. A missing file yields the built-in defaults, which
//! describe the stock two-OpenVPN, one-WireGuard deployment.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/usr/local/etc/relaysync.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File exists but could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        /// Offending file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// File is not valid TOML for [`SyncConfig`]
    #[error("cannot parse {path}: {source}")]
    Parse {
        /// Offending file
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },
    /// Values failed validation
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Tunnel technology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TunnelKind {
    /// OpenVPN client, addressed by host and port
    #[serde(rename = "openvpn")]
    OpenVpn,
    /// WireGuard peer, addressed by host and public key
    #[serde(rename = "wireguard")]
    WireGuard,
}

impl TunnelKind {
    /// Service name understood by the service control
    pub fn service(&self) -> &'static str {
        match self {
            TunnelKind::OpenVpn => "openvpn",
            TunnelKind::WireGuard => "wireguard",
        }
    }
}

impl fmt::Display for TunnelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelKind::OpenVpn => f.write_str("OpenVPN"),
            TunnelKind::WireGuard => f.write_str("WireGuard"),
        }
    }
}

/// One logical tunnel relaysync keeps pointed at a good relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelDefinition {
    /// Technology
    pub kind: TunnelKind,
    /// Description (OpenVPN) or name (WireGuard) of the client entry
    pub name: String,
    /// Port written to the client entry
    pub port: u16,
    /// NordVPN country id
    pub country: String,
    /// Server group identifier, e.g. `legacy_standard`
    #[serde(default)]
    pub group: Option<String>,
    /// Server technology identifier, e.g. `openvpn_udp`
    #[serde(default)]
    pub technology: Option<String>,
}

impl TunnelDefinition {
    /// OpenVPN tunnel definition
    pub fn openvpn(name: &str, port: u16, country: &str) -> Self {
        Self {
            kind: TunnelKind::OpenVpn,
            name: name.into(),
            port,
            country: country.into(),
            group: None,
            technology: None,
        }
    }

    /// WireGuard tunnel definition
    pub fn wireguard(name: &str, port: u16, country: &str) -> Self {
        Self {
            kind: TunnelKind::WireGuard,
            ..Self::openvpn(name, port, country)
        }
    }

    /// Set the server group filter
    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set the server technology filter
    pub fn with_technology(mut self, technology: &str) -> Self {
        self.technology = Some(technology.into());
        self
    }
}

/// Location of the configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    /// Live document
    pub path: PathBuf,
    /// Appended to `path` to form the backup path
    pub backup_suffix: String,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/conf/config.xml"),
            backup_suffix: ".bak".into(),
        }
    }
}

impl DocumentSettings {
    /// Sibling path the live document is copied to before a run
    pub fn backup_path(&self) -> PathBuf {
        let mut raw = self.path.clone().into_os_string();
        raw.push(&self.backup_suffix);
        PathBuf::from(raw)
    }
}

/// Recommendation API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Recommendations endpoint
    pub url: String,
    /// Candidates requested per query
    pub limit: u32,
    /// Request timeout
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: "https://api.nordvpn.com/v1/servers/recommendations".into(),
            limit: 3,
            timeout_secs: 15,
        }
    }
}

impl ApiSettings {
    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Service control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service control program
    pub program: String,
    /// Pause after each OpenVPN restart
    pub restart_pause_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            program: "pluginctl".into(),
            restart_pause_ms: 1000,
        }
    }
}

impl ServiceSettings {
    /// Pause after each OpenVPN restart
    pub fn restart_pause(&self) -> Duration {
        Duration::from_millis(self.restart_pause_ms)
    }
}

/// Full relaysync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Configuration document
    pub document: DocumentSettings,
    /// Recommendation API
    pub api: ApiSettings,
    /// Service control
    pub service: ServiceSettings,
    /// Tunnel definitions, in processing order
    #[serde(rename = "tunnel")]
    pub tunnels: Vec<TunnelDefinition>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            document: DocumentSettings::default(),
            api: ApiSettings::default(),
            service: ServiceSettings::default(),
            tunnels: vec![
                TunnelDefinition::openvpn("NordVPN Main", 1194, "81")
                    .with_group("legacy_standard")
                    .with_technology("openvpn_udp"),
                TunnelDefinition::openvpn("NordVPN Fallback", 443, "81")
                    .with_group("legacy_standard")
                    .with_technology("openvpn_tcp"),
                TunnelDefinition::wireguard("WG Main", 51820, "81")
                    .with_group("legacy_standard")
                    .with_technology("wireguard"),
            ],
        }
    }
}

impl SyncConfig {
    /// Load and validate from file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Check required fields
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.document.backup_suffix.is_empty() {
            return Err(ConfigError::Invalid("document.backup_suffix must not be empty".into()));
        }
        if self.api.limit == 0 {
            return Err(ConfigError::Invalid("api.limit must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for tunnel in &self.tunnels {
            if tunnel.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} tunnel without a name", tunnel.kind)));
            }
            if tunnel.country.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("tunnel '{}' has no country", tunnel.name)));
            }
            if tunnel.port == 0 {
                return Err(ConfigError::Invalid(format!("tunnel '{}' has port 0", tunnel.name)));
            }
            if !seen.insert((tunnel.kind, tunnel.name.as_str())) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate {} tunnel '{}'",
                    tunnel.kind, tunnel.name
                )));
            }
        }
        Ok(())
    }

    /// Definitions of one kind, in configured order
    pub fn definitions(&self, kind: TunnelKind) -> Vec<TunnelDefinition> {
        self.tunnels.iter().filter(|t| t.kind == kind).cloned().collect()
    }
}
