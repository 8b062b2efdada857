//! relaysync CLI
//!
//! Points the VPN client entries of an OPNsense `config.xml` at relays
//! recommended by the NordVPN API, then restarts the affected clients.
//!
//! # Usage
//!
//! ```bash
//! relaysync
//! relaysync --type all --verbose
//! relaysync --diagnose --format json
//! relaysync -c ./relaysync.toml --document ./config.xml --type wireguard
//! ```

use anyhow::Context;
use clap::{Parser, ValueEnum};
use relaysync_core::config::DEFAULT_CONFIG_PATH;
use relaysync_core::{
    inspect_wireguard, Document, NordVpnDirectory, Orchestrator, PluginCtl, RunStatus, Scope,
    SyncConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod output;

#[derive(Parser)]
#[command(name = "relaysync")]
#[command(version)]
#[command(about = "Keep OPNsense VPN clients on recommended NordVPN relays", long_about = None)]
struct Cli {
    /// Tunnel types to update
    #[arg(long = "type", value_enum, default_value = "openvpn")]
    kind: TunnelType,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Dump the WireGuard structure of the document and exit
    #[arg(long)]
    diagnose: bool,

    /// Configuration file
    #[arg(short, long, env = "RELAYSYNC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the document path from the configuration
    #[arg(long)]
    document: Option<PathBuf>,

    /// Output format for --diagnose
    #[arg(long, value_enum, default_value = "text")]
    format: output::OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TunnelType {
    Openvpn,
    Wireguard,
    All,
}

impl From<TunnelType> for Scope {
    fn from(kind: TunnelType) -> Self {
        match kind {
            TunnelType::Openvpn => Scope::OpenVpn,
            TunnelType::Wireguard => Scope::WireGuard,
            TunnelType::All => Scope::All,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let mut config = SyncConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(document) = cli.document {
        config.document.path = document;
    }

    if cli.diagnose {
        return diagnose(&config, cli.format);
    }

    tracing::info!("relaysync v{}", env!("CARGO_PKG_VERSION"));

    let directory = NordVpnDirectory::new(&config.api).context("building HTTP client")?;
    let services = PluginCtl::new(config.service.program.as_str());
    let orchestrator = Orchestrator::new(&config, directory, services);

    let status = orchestrator.run(cli.kind.into()).await?;
    if let RunStatus::Applied(summary) | RunStatus::NothingToDo(summary) = &status {
        for anomaly in summary.openvpn.anomalies.iter().chain(&summary.wireguard.anomalies) {
            tracing::debug!(?anomaly, "entry updated without restart key");
        }
    }

    Ok(status.exit_code() as u8)
}

fn diagnose(config: &SyncConfig, format: output::OutputFormat) -> anyhow::Result<u8> {
    let path = &config.document.path;
    if !path.exists() {
        tracing::error!(path = %path.display(), "config file not found");
        return Ok(1);
    }

    let document = Document::load(path).with_context(|| format!("reading {}", path.display()))?;
    format.print(&inspect_wireguard(document.root()))?;
    Ok(0)
}
