//! External command runner
//!
//! Runs a black-box tool with captured output and a hard timeout. The child
//! is killed when the timeout fires.

use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use crate::error::{BotError, BotResult};

/// Captured output of a successful run
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program args...`, failing on spawn error, non-zero exit or timeout
pub async fn run(program: &str, args: &[String], timeout: Duration) -> BotResult<CommandOutput> {
    let start = Instant::now();
    debug!("Running {} {:?} (timeout {:?})", program, args, timeout);

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| BotError::Command {
            message: format!("Failed to start {}", program),
            stderr: e.to_string(),
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(BotError::Command {
                message: format!("{} timed out after {:?}", program, timeout),
                stderr: String::new(),
            })
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    debug!("{} finished in {:?} with {}", program, start.elapsed(), output.status);

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        return Err(BotError::Command {
            message: format!("Command failed with exit code {}", code),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(CommandOutput { stdout, stderr })
}
