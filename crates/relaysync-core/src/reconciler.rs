//! Points the client entries of one tunnel kind at fresh relays
//!
//! Definitions are processed in order. The address chosen for one tunnel is
//! excluded from the next selection so sibling tunnels land on different
//! relays. A tunnel whose selection fails keeps its entry untouched and does
//! not reset the exclusion.

use crate::config::{TunnelDefinition, TunnelKind};
use crate::document::Element;
use crate::locator::Locator;
use crate::selector::{EndpointDescriptor, EndpointSelector, RelayDirectory, WIREGUARD_TECHNOLOGY};
use serde::Serialize;

/// Located entry that cannot be restarted individually
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SchemaAnomaly {
    /// OpenVPN client without a `vpnid`
    MissingVpnId {
        /// Tunnel name
        tunnel: String,
    },
    /// WireGuard client without a `uuid` attribute
    MissingUuid {
        /// Tunnel name
        tunnel: String,
    },
}

/// Outcome of reconciling one tunnel kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Restart keys in discovery order
    pub restart_keys: Vec<String>,
    /// Entries updated without a restart key
    pub anomalies: Vec<SchemaAnomaly>,
    /// Tunnels whose entry was rewritten
    pub updated: Vec<String>,
    /// Tunnels left alone (entry missing or no relay)
    pub skipped: Vec<String>,
}

impl ReconcileReport {
    /// No restart scheduled
    pub fn is_empty(&self) -> bool {
        self.restart_keys.is_empty()
    }
}

/// Reconciles client entries against relay recommendations
pub struct Reconciler<'a, D> {
    selector: &'a EndpointSelector<D>,
}

impl<'a, D: RelayDirectory> Reconciler<'a, D> {
    /// Reconciler drawing relays from `selector`
    pub fn new(selector: &'a EndpointSelector<D>) -> Self {
        Self { selector }
    }

    /// Update every entry of `kind` named in `definitions`
    pub async fn reconcile(
        &self,
        root: &mut Element,
        kind: TunnelKind,
        definitions: &[TunnelDefinition],
    ) -> ReconcileReport {
        let locator = Locator::for_kind(kind);
        let mut report = ReconcileReport::default();
        let mut previous_address: Option<String> = None;

        tracing::info!(%kind, tunnels = definitions.len(), "updating clients");

        for definition in definitions {
            let tunnel = definition.name.as_str();

            let Some(path) = locator.locate(root, tunnel) else {
                tracing::info!(%kind, tunnel, "client entry not found, skipping");
                report.skipped.push(tunnel.to_string());
                continue;
            };

            // only wireguard_udp candidates carry a public key
            let technology = match kind {
                TunnelKind::OpenVpn => definition.technology.as_deref(),
                TunnelKind::WireGuard => Some(WIREGUARD_TECHNOLOGY),
            };

            let Some(descriptor) = self
                .selector
                .select(
                    &definition.country,
                    definition.group.as_deref(),
                    technology,
                    previous_address.as_deref(),
                )
                .await
            else {
                tracing::info!(%kind, tunnel, "no relay available, leaving entry unchanged");
                report.skipped.push(tunnel.to_string());
                continue;
            };

            previous_address = Some(descriptor.address().to_string());
            tracing::info!(%kind, tunnel, address = descriptor.address(), "found relay");

            let Some(entry) = root.element_at_mut(&path) else {
                report.skipped.push(tunnel.to_string());
                continue;
            };
            match kind {
                TunnelKind::OpenVpn => apply_openvpn(entry, definition, &descriptor, &mut report),
                TunnelKind::WireGuard => apply_wireguard(entry, definition, &descriptor, &mut report),
            }
            report.updated.push(tunnel.to_string());
        }

        report
    }
}

fn apply_openvpn(
    entry: &mut Element,
    definition: &TunnelDefinition,
    descriptor: &EndpointDescriptor,
    report: &mut ReconcileReport,
) {
    entry.set_child_text("server_addr", descriptor.address());
    entry.set_child_text("server_port", &definition.port.to_string());

    match entry.child_text("vpnid").filter(|id| !id.trim().is_empty()) {
        Some(vpnid) => {
            tracing::debug!(tunnel = %definition.name, %vpnid, "scheduled for restart");
            report.restart_keys.push(vpnid);
        }
        None => {
            tracing::warn!(tunnel = %definition.name, "client entry has no vpnid, cannot restart it");
            report.anomalies.push(SchemaAnomaly::MissingVpnId {
                tunnel: definition.name.clone(),
            });
        }
    }
}

fn apply_wireguard(
    entry: &mut Element,
    definition: &TunnelDefinition,
    descriptor: &EndpointDescriptor,
    report: &mut ReconcileReport,
) {
    entry.set_child_text("serveraddress", descriptor.address());

    match descriptor.public_key().filter(|key| !key.is_empty()) {
        Some(key) => entry.set_child_text("pubkey", key),
        None => tracing::warn!(tunnel = %definition.name, "relay published no public key, keeping stored key"),
    }

    if entry.child("serverport").is_some() {
        entry.set_child_text("serverport", &definition.port.to_string());
    }

    match entry.attribute("uuid").filter(|uuid| !uuid.trim().is_empty()) {
        Some(uuid) => {
            tracing::debug!(tunnel = %definition.name, uuid, "scheduled for restart");
            report.restart_keys.push(uuid.to_string());
        }
        None => {
            tracing::warn!(tunnel = %definition.name, "client entry has no uuid, updated but not restarted");
            report.anomalies.push(SchemaAnomaly::MissingUuid {
                tunnel: definition.name.clone(),
            });
        }
    }
}
