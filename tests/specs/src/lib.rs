// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Runs the real `modelmeter` binary against a throwaway home directory and
//! in-process HTTP stubs.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::process::Command;

/// Variables the binary reads; cleared so the host environment cannot leak in.
const SCRUBBED_ENV: &[&str] = &[
    "MODELMETER_LOG_LEVEL",
    "MODELMETER_LOG_FORMAT",
    "MODELMETER_TIMEOUT_SECS",
    "MODELMETER_CONFIG",
    "CLAUDE_TOKEN_URL",
    "CLAUDE_USAGE_URL",
    "CLAUDE_WEB_URL",
    "CLAUDE_COOKIE",
    "CODEX_TOKEN_URL",
    "CODEX_USAGE_URL",
    "CODEX_HOME",
];

/// Resolve the path to the compiled `modelmeter` binary.
pub fn modelmeter_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("modelmeter")
}

/// Serve `router` on an ephemeral port, returning its base URL.
pub async fn serve(router: axum::Router) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    Ok(format!("http://{addr}"))
}

/// One binary invocation with an isolated `$HOME`.
pub struct Invocation {
    home: tempfile::TempDir,
    env: Vec<(String, String)>,
    stdin: Option<String>,
}

impl Invocation {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self { home: tempfile::tempdir()?, env: vec![], stdin: None })
    }

    pub fn home(&self) -> &Path {
        self.home.path()
    }

    /// Write a file relative to the fake home directory.
    pub fn write(&self, relative: &str, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.home.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_owned(), value.to_owned()));
        self
    }

    pub fn stdin(mut self, input: &str) -> Self {
        self.stdin = Some(input.to_owned());
        self
    }

    /// Run to completion, bounded by `timeout`.
    pub async fn run(&self, args: &[&str], timeout: Duration) -> anyhow::Result<Output> {
        use tokio::io::AsyncWriteExt;

        let mut cmd = Command::new(modelmeter_binary());
        cmd.args(args)
            .env("HOME", self.home.path())
            .stdin(if self.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in SCRUBBED_ENV {
            cmd.env_remove(key);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;
        if let (Some(input), Some(mut pipe)) = (&self.stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
        }
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => anyhow::bail!("modelmeter did not exit within {timeout:?}"),
        }
    }
}

/// Parse stdout as the single JSON result document.
pub fn stdout_json(output: &Output) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::from_slice(&output.stdout)?)
}
