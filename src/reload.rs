//! Reload Notifier
//!
//! Applies credential changes to the running VPN service. Policy: try the
//! hot reload hook when one is configured; if it is absent or fails for any
//! reason, run the restart command. Neither failure reaches the chat.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::BotConfig;

/// Timeout for the hot reload POST
pub const HOT_RELOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Which path applied the change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadResult {
    pub used_hot_reload: bool,
}

/// Hot reload hook with restart fallback
#[derive(Debug, Clone)]
pub struct ReloadNotifier {
    client: reqwest::Client,
    endpoint: Option<String>,
    restart_command: Vec<String>,
}

impl ReloadNotifier {
    pub fn new(endpoint: Option<String>, restart_command: Vec<String>) -> Self {
        // Reload hooks are local; skip system proxies
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            restart_command,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.reload_endpoint.clone(), config.restart_command.clone())
    }

    /// Apply the change, reporting whether hot reload succeeded
    pub async fn notify(&self) -> ReloadResult {
        if let Some(url) = &self.endpoint {
            match self.hot_reload(url).await {
                Ok(()) => {
                    info!("Hot reload accepted by {}", url);
                    return ReloadResult { used_hot_reload: true };
                }
                Err(e) => warn!("Hot reload via {} unavailable: {}", url, e),
            }
        }

        self.restart().await;
        ReloadResult { used_hot_reload: false }
    }

    async fn hot_reload(&self, url: &str) -> reqwest::Result<()> {
        self.client
            .post(url)
            .timeout(HOT_RELOAD_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn restart(&self) {
        let Some((program, args)) = self.restart_command.split_first() else {
            warn!("No restart command configured, credentials change not applied");
            return;
        };

        debug!("Running restart command: {:?}", self.restart_command);
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(s) if s.success() => info!("Restarted service via {}", program),
            Ok(s) => warn!("Restart command {} exited with {}", program, s),
            Err(e) => warn!("Failed to run restart command {}: {}", program, e),
        }
    }
}
