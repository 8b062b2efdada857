//! Apply and restart
//!
//! ```text
//! NoBackup ─▶ BackedUp ─▶ Loaded ─▶ Reconciled ─┬─▶ Written ─▶ Restarted
//!    │                                           └─▶ NoChange
//!    └─▶ SourceMissing (exit 1)
//! ```

use crate::config::{SyncConfig, TunnelKind};
use crate::document::Document;
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::selector::{EndpointSelector, RelayDirectory};
use crate::service::ServiceControl;
use crate::SyncResult;
use serde::Serialize;
use std::time::Duration;

/// Tunnel kinds handled by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// OpenVPN clients only
    OpenVpn,
    /// WireGuard clients only
    WireGuard,
    /// Both
    All,
}

impl Scope {
    /// Kinds in processing order
    pub fn kinds(&self) -> &'static [TunnelKind] {
        match self {
            Scope::OpenVpn => &[TunnelKind::OpenVpn],
            Scope::WireGuard => &[TunnelKind::WireGuard],
            Scope::All => &[TunnelKind::OpenVpn, TunnelKind::WireGuard],
        }
    }
}

/// Reports of one run, per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// OpenVPN reconciliation
    pub openvpn: ReconcileReport,
    /// WireGuard reconciliation
    pub wireguard: ReconcileReport,
}

impl RunSummary {
    fn report_mut(&mut self, kind: TunnelKind) -> &mut ReconcileReport {
        match kind {
            TunnelKind::OpenVpn => &mut self.openvpn,
            TunnelKind::WireGuard => &mut self.wireguard,
        }
    }

    /// No restart scheduled for any kind
    pub fn is_empty(&self) -> bool {
        self.openvpn.is_empty() && self.wireguard.is_empty()
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Live document absent, nothing touched
    SourceMissing,
    /// Nothing to restart, document not written
    NothingToDo(RunSummary),
    /// Document written and services restarted
    Applied(RunSummary),
}

impl RunStatus {
    /// Process exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::SourceMissing => 1,
            RunStatus::NothingToDo(_) | RunStatus::Applied(_) => 0,
        }
    }
}

/// Runs backup, reconciliation, write-back and restarts
pub struct Orchestrator<D, S> {
    config: SyncConfig,
    selector: EndpointSelector<D>,
    services: S,
    restart_pause: Duration,
}

impl<D: RelayDirectory, S: ServiceControl> Orchestrator<D, S> {
    /// Orchestrator for `config`
    pub fn new(config: &SyncConfig, directory: D, services: S) -> Self {
        Self {
            config: config.clone(),
            selector: EndpointSelector::new(directory, config.api.limit),
            services,
            restart_pause: config.service.restart_pause(),
        }
    }

    /// Relay selector
    pub fn selector(&self) -> &EndpointSelector<D> {
        &self.selector
    }

    /// Service control
    pub fn services(&self) -> &S {
        &self.services
    }

    /// Execute one run over `scope`
    pub async fn run(&self, scope: Scope) -> SyncResult<RunStatus> {
        let live = &self.config.document.path;
        if !live.exists() {
            tracing::error!(path = %live.display(), "config file not found, stopping");
            return Ok(RunStatus::SourceMissing);
        }

        let backup = self.config.document.backup_path();
        std::fs::copy(live, &backup)?;
        tracing::info!(backup = %backup.display(), "created backup of config file");

        let mut document = Document::load(&backup)?;
        let reconciler = Reconciler::new(&self.selector);
        let mut summary = RunSummary::default();

        for &kind in scope.kinds() {
            let definitions = self.config.definitions(kind);
            let report = reconciler.reconcile(document.root_mut(), kind, &definitions).await;
            *summary.report_mut(kind) = report;
        }

        if summary.is_empty() {
            tracing::info!("nothing to do, stopping");
            return Ok(RunStatus::NothingToDo(summary));
        }

        document.save(live)?;
        tracing::info!(path = %live.display(), "config has been updated");

        self.restart(&summary).await;
        Ok(RunStatus::Applied(summary))
    }

    async fn restart(&self, summary: &RunSummary) {
        if !summary.openvpn.restart_keys.is_empty() {
            tracing::info!(count = summary.openvpn.restart_keys.len(), "restarting OpenVPN clients");
        }
        for vpnid in &summary.openvpn.restart_keys {
            self.services
                .restart(TunnelKind::OpenVpn.service(), Some(vpnid.as_str()))
                .await;
            tokio::time::sleep(self.restart_pause).await;
        }

        // individual WireGuard clients cannot be restarted
        if !summary.wireguard.restart_keys.is_empty() {
            tracing::info!(count = summary.wireguard.restart_keys.len(), "restarting WireGuard service");
            self.services.restart(TunnelKind::WireGuard.service(), None).await;
        }
    }
}
