// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw JSON input for the extraction adapter.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::ExtractArgs;
use crate::error::MeterError;

/// Read the document named by `args`: a shell command's stdout, a file, or stdin.
pub async fn read_input(args: &ExtractArgs, timeout: Duration) -> Result<String, MeterError> {
    if let Some(ref cmd) = args.cmd {
        return run_command(cmd, timeout).await;
    }
    if let Some(ref path) = args.file {
        return tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MeterError::input(format!("failed to read {}: {e}", path.display())));
    }

    let mut buf = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .map_err(|e| MeterError::input(format!("failed to read stdin: {e}")))?;
    Ok(buf)
}

async fn run_command(cmd: &str, timeout: Duration) -> Result<String, MeterError> {
    debug!(cmd, "running usage command");
    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(MeterError::input(format!("failed to run command: {e}"))),
        Err(_) => {
            return Err(MeterError::input(format!("command timed out after {}s", timeout.as_secs())))
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MeterError::input(format!(
            "command exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    String::from_utf8(output.stdout)
        .map_err(|_| MeterError::input("command output is not valid UTF-8"))
}

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;
