//! relaysync - VPN relay selection for OPNsense
//!
//! Keeps the OpenVPN and WireGuard client entries of an OPNsense
//! `config.xml` pointed at relays recommended by the NordVPN API.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Orchestrator                             │
//! │   backup ─▶ load ─▶ reconcile (per kind) ─▶ write ─▶ restart     │
//! └───────────────┬──────────────────────────────────────┬───────────┘
//!                 │                                      │
//!        ┌────────▼────────┐                    ┌────────▼────────┐
//!        │   Reconciler    │                    │ ServiceControl  │
//!        └───┬─────────┬───┘                    │   (pluginctl)   │
//!            │         │                        └─────────────────┘
//!   ┌────────▼───┐ ┌───▼──────────────┐
//!   │  Locator   │ │ EndpointSelector │
//!   │ (strategy) │ │ (RelayDirectory) │
//!   └────────────┘ └──────────────────┘
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod diagnostics;
pub mod document;
pub mod locator;
pub mod orchestrator;
pub mod reconciler;
pub mod selector;
pub mod service;

#[cfg(test)]
mod testing;

use thiserror::Error;

pub use config::{SyncConfig, TunnelDefinition, TunnelKind};
pub use diagnostics::{inspect_wireguard, WireGuardReport};
pub use document::{Document, Element};
pub use locator::Locator;
pub use orchestrator::{Orchestrator, RunStatus, RunSummary, Scope};
pub use reconciler::{ReconcileReport, Reconciler, SchemaAnomaly};
pub use selector::{EndpointDescriptor, EndpointSelector, NordVpnDirectory, RelayDirectory};
pub use service::{PluginCtl, ServiceControl};

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum SyncError {
    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed XML
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Configuration could not be loaded or is invalid
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    /// Document is well-formed XML but unusable
    #[error("document error: {0}")]
    Document(String),
}

/// Result type for relaysync
pub type SyncResult<T> = Result<T, SyncError>;
