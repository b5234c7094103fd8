// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Usage-quota telemetry for AI coding assistants.
#[derive(Debug, Parser)]
#[command(name = "modelmeter", version, about)]
pub struct Config {
    /// Log format (json or text).
    #[arg(long, env = "MODELMETER_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "MODELMETER_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Upper bound in seconds for each HTTP request and subprocess.
    #[arg(long, env = "MODELMETER_TIMEOUT_SECS", default_value_t = 15)]
    pub timeout_secs: u64,

    /// Path to the JSON config file (default ~/.modelmeter/config.json).
    #[arg(long = "config", env = "MODELMETER_CONFIG")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Report Claude session and weekly usage.
    Claude(ClaudeArgs),
    /// Report Codex session and weekly usage.
    Codex(CodexArgs),
    /// Extract usage from arbitrary JSON (command output, file, or stdin).
    Extract(ExtractArgs),
}

#[derive(Debug, clap::Args)]
pub struct ClaudeArgs {
    /// Token endpoint tried before the defaults.
    #[arg(long, env = "CLAUDE_TOKEN_URL")]
    pub token_url: Option<String>,

    /// Usage endpoint tried before the defaults.
    #[arg(long, env = "CLAUDE_USAGE_URL")]
    pub usage_url: Option<String>,

    /// Base URL for the session-cookie fallback.
    #[arg(long, env = "CLAUDE_WEB_URL", default_value = "https://claude.ai")]
    pub web_url: String,

    /// Browser cookie header carrying `sessionKey`.
    #[arg(long, env = "CLAUDE_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,

    /// Credentials file tried before the standard locations (repeatable).
    #[arg(long = "credentials-file")]
    pub credentials_files: Vec<PathBuf>,

    /// Never query the OS keychain.
    #[arg(long)]
    pub no_keychain: bool,
}

#[derive(Debug, clap::Args)]
pub struct CodexArgs {
    /// Token endpoint tried before the default.
    #[arg(long, env = "CODEX_TOKEN_URL")]
    pub token_url: Option<String>,

    /// Usage endpoint tried before the default.
    #[arg(long, env = "CODEX_USAGE_URL")]
    pub usage_url: Option<String>,

    /// Codex state directory (default ~/.codex).
    #[arg(long, env = "CODEX_HOME")]
    pub codex_home: Option<PathBuf>,

    /// Credentials file tried before `auth.json` (repeatable).
    #[arg(long = "credentials-file")]
    pub credentials_files: Vec<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct ExtractArgs {
    /// Shell command whose stdout is the JSON to read.
    #[arg(long, conflicts_with = "file")]
    pub cmd: Option<String>,

    /// File containing the JSON to read.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_secs == 0 {
            anyhow::bail!("--timeout-secs must be greater than zero");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other} (expected json or text)"),
        }

        let overrides: Vec<(&str, Option<&str>)> = match &self.command {
            Command::Claude(args) => vec![
                ("--token-url", args.token_url.as_deref()),
                ("--usage-url", args.usage_url.as_deref()),
                ("--web-url", Some(args.web_url.as_str())),
            ],
            Command::Codex(args) => vec![
                ("--token-url", args.token_url.as_deref()),
                ("--usage-url", args.usage_url.as_deref()),
            ],
            Command::Extract(_) => vec![],
        };
        for (flag, url) in overrides {
            let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
                continue;
            };
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{flag} must be an http(s) URL, got: {url}");
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The config file to read, defaulting under `home`.
    pub fn config_path(&self, home: &Path) -> PathBuf {
        self.config_file.clone().unwrap_or_else(|| home.join(".modelmeter").join("config.json"))
    }
}

/// Contents of `~/.modelmeter/config.json`. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    /// Cookie header for the Claude web session fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_cookie_header: Option<String>,
}

/// Load the config file. A missing file yields the defaults.
pub fn load_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(e) => return Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    };
    serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("invalid config file {}: {e}", path.display()))
}

/// Everything a provider run needs, resolved once at start-up.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub credential_paths: Vec<PathBuf>,
    pub token_url: Option<String>,
    pub usage_url: Option<String>,
    pub web_url: String,
    pub cookie_header: Option<String>,
    pub use_keychain: bool,
}

impl ProviderSettings {
    pub fn claude(args: &ClaudeArgs, file: &FileConfig, home: &Path) -> Self {
        let mut credential_paths = args.credentials_files.clone();
        credential_paths.push(home.join(".claude").join(".credentials.json"));
        credential_paths.push(home.join(".config").join("claude").join(".credentials.json"));

        let cookie_header = non_blank(args.cookie.as_deref())
            .or_else(|| non_blank(file.claude_cookie_header.as_deref()));

        Self {
            credential_paths,
            token_url: non_blank(args.token_url.as_deref()),
            usage_url: non_blank(args.usage_url.as_deref()),
            web_url: args.web_url.trim().to_owned(),
            cookie_header,
            use_keychain: !args.no_keychain,
        }
    }

    pub fn codex(args: &CodexArgs, home: &Path) -> Self {
        let codex_home = args.codex_home.clone().unwrap_or_else(|| home.join(".codex"));
        let mut credential_paths = args.credentials_files.clone();
        credential_paths.push(codex_home.join("auth.json"));

        Self {
            credential_paths,
            token_url: non_blank(args.token_url.as_deref()),
            usage_url: non_blank(args.usage_url.as_deref()),
            web_url: String::new(),
            cookie_header: None,
            use_keychain: false,
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
