//! Service control
//!
//! Restarts are fire-and-forget: the exit status is logged, never returned.

use async_trait::async_trait;

/// Host service control
#[async_trait]
pub trait ServiceControl: Send + Sync {
    /// Restart `service`, or one `instance` of it
    async fn restart(&self, service: &str, instance: Option<&str>);
}

/// OPNsense `pluginctl`
pub struct PluginCtl {
    program: String,
}

impl PluginCtl {
    /// Service control through `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PluginCtl {
    fn default() -> Self {
        Self::new("pluginctl")
    }
}

#[async_trait]
impl ServiceControl for PluginCtl {
    async fn restart(&self, service: &str, instance: Option<&str>) {
        tracing::info!(service, ?instance, "restarting");

        let mut command = tokio::process::Command::new(&self.program);
        command.args(["-s", service, "restart"]);
        if let Some(instance) = instance {
            command.arg(instance);
        }

        match command.status().await {
            Ok(status) => tracing::debug!(service, %status, "{} exited", self.program),
            Err(e) => tracing::debug!(service, error = %e, "{} could not be run", self.program),
        }
    }
}
