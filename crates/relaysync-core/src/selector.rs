//! Endpoint selection from the NordVPN recommendation API
//!
//! One query per tunnel, no retries. Failures degrade to "no endpoint" and
//! never leave this module.

use crate::config::ApiSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Technology identifier whose candidates carry a WireGuard public key
pub const WIREGUARD_TECHNOLOGY: &str = "wireguard_udp";

/// Metadata entry holding the WireGuard public key
const PUBLIC_KEY_METADATA: &str = "public_key";

/// Recommendation query errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Transport failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success HTTP status
    #[error("unexpected status {0}")]
    Status(u16),
    /// Body is not a candidate list
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Filters for one recommendation query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationQuery {
    /// Country id
    pub country: String,
    /// Server group identifier
    pub group: Option<String>,
    /// Server technology identifier
    pub technology: Option<String>,
    /// Maximum number of candidates
    pub limit: u32,
}

impl RecommendationQuery {
    /// Query string pairs, empty filters omitted
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("filters[country_id]", self.country.clone()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(group) = self.group.as_deref().filter(|g| !g.is_empty()) {
            params.push(("filters[servers_groups][identifier]", group.to_string()));
        }
        if let Some(technology) = self.technology.as_deref().filter(|t| !t.is_empty()) {
            params.push(("filters[servers_technologies][identifier]", technology.to_string()));
        }
        params
    }
}

/// Recommended server as returned by the API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayCandidate {
    /// Hostname, e.g. `de1042.nordvpn.com`
    #[serde(default)]
    pub name: Option<String>,
    /// Connection address
    #[serde(default)]
    pub station: Option<String>,
    /// Technologies offered by the server
    #[serde(default)]
    pub technologies: Vec<CandidateTechnology>,
}

/// Technology entry of a candidate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateTechnology {
    /// Technology identifier
    #[serde(default)]
    pub identifier: String,
    /// Per-technology metadata
    #[serde(default)]
    pub metadata: Vec<TechnologyMetadata>,
}

/// Metadata pair
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnologyMetadata {
    /// Entry name
    #[serde(default)]
    pub name: String,
    /// Entry value
    #[serde(default)]
    pub value: serde_json::Value,
}

impl RelayCandidate {
    /// Candidate with only an address
    pub fn with_station(station: &str) -> Self {
        Self {
            station: Some(station.into()),
            ..Self::default()
        }
    }

    /// Non-empty station address
    pub fn address(&self) -> Option<&str> {
        self.station.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Public key published for `technology`
    pub fn public_key(&self, technology: &str) -> Option<&str> {
        self.technologies
            .iter()
            .find(|t| t.identifier == technology)?
            .metadata
            .iter()
            .find(|m| m.name == PUBLIC_KEY_METADATA)?
            .value
            .as_str()
    }
}

/// Source of ranked relay candidates
#[async_trait]
pub trait RelayDirectory: Send + Sync {
    /// Candidates for `query`, best first
    async fn recommendations(&self, query: &RecommendationQuery) -> Result<Vec<RelayCandidate>, RelayError>;
}

/// NordVPN recommendations endpoint
pub struct NordVpnDirectory {
    url: String,
    client: reqwest::Client,
}

impl NordVpnDirectory {
    /// Client for the configured endpoint
    pub fn new(settings: &ApiSettings) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(concat!("relaysync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            url: settings.url.clone(),
            client,
        })
    }
}

#[async_trait]
impl RelayDirectory for NordVpnDirectory {
    async fn recommendations(&self, query: &RecommendationQuery) -> Result<Vec<RelayCandidate>, RelayError> {
        tracing::debug!(url = %self.url, ?query, "requesting recommendations");

        let response = self.client.get(&self.url).query(&query.params()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Normalised selection result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointDescriptor {
    /// Address only
    Plain {
        /// Relay address
        address: String,
    },
    /// Address with WireGuard key material
    Keyed {
        /// Relay address
        address: String,
        /// Base64 public key, empty when the API omitted it
        public_key: String,
        /// Relay hostname, empty when the API omitted it
        name: String,
    },
}

impl EndpointDescriptor {
    /// Relay address, never empty
    pub fn address(&self) -> &str {
        match self {
            EndpointDescriptor::Plain { address } | EndpointDescriptor::Keyed { address, .. } => address,
        }
    }

    /// Public key, for keyed descriptors
    pub fn public_key(&self) -> Option<&str> {
        match self {
            EndpointDescriptor::Keyed { public_key, .. } => Some(public_key.as_str()),
            EndpointDescriptor::Plain { .. } => None,
        }
    }
}

/// Picks one relay per call, skipping the previously chosen address
pub struct EndpointSelector<D> {
    directory: D,
    limit: u32,
}

impl<D: RelayDirectory> EndpointSelector<D> {
    /// Selector requesting `limit` candidates per query
    pub fn new(directory: D, limit: u32) -> Self {
        Self {
            directory,
            limit: limit.max(1),
        }
    }

    /// Underlying directory
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Best candidate whose address differs from `exclude`
    ///
    /// Returns `None` when the query fails, the list is empty, or every
    /// candidate carries the excluded address.
    pub async fn select(
        &self,
        country: &str,
        group: Option<&str>,
        technology: Option<&str>,
        exclude: Option<&str>,
    ) -> Option<EndpointDescriptor> {
        let query = RecommendationQuery {
            country: country.to_string(),
            group: group.map(String::from),
            technology: technology.map(String::from),
            limit: self.limit,
        };

        let candidates = match self.directory.recommendations(&query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(country, error = %e, "recommendation query failed");
                return None;
            }
        };

        let Some((candidate, address)) = candidates
            .iter()
            .filter_map(|c| c.address().map(|a| (c, a)))
            .find(|(_, address)| Some(*address) != exclude)
        else {
            tracing::info!(country, candidates = candidates.len(), ?exclude, "no eligible relay");
            return None;
        };

        let descriptor = match technology {
            Some(technology) if technology == WIREGUARD_TECHNOLOGY => EndpointDescriptor::Keyed {
                address: address.to_string(),
                public_key: candidate.public_key(technology).unwrap_or_default().to_string(),
                name: candidate.name.clone().unwrap_or_default(),
            },
            _ => EndpointDescriptor::Plain {
                address: address.to_string(),
            },
        };
        tracing::debug!(address, relay = candidate.name.as_deref().unwrap_or(""), "selected relay");
        Some(descriptor)
    }
}
