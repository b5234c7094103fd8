// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level usage runner, shared by `main` and integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{self, Command, Config, ExtractArgs, FileConfig, ProviderSettings};
use crate::credential::refresh::TokenRefresher;
use crate::credential::store::{KeychainStore, Resolver, SecureStore};
use crate::credential::now_ms;
use crate::error::MeterError;
use crate::provider::{EndpointList, Profile, StalePolicy, CLAUDE, CODEX};
use crate::source;
use crate::usage::extract;
use crate::usage::fetch::UsageFetcher;
use crate::usage::normalize::Normalizer;
use crate::usage::web::{SessionIdentity, WebFallback};
use crate::usage::CanonicalUsage;

const USER_AGENT: &str = concat!("modelmeter/", env!("CARGO_PKG_VERSION"));

/// Logs go to stderr; stdout carries only the result document.
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init(),
    };
    drop(result);
}

pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).user_agent(USER_AGENT).build()?)
}

/// Run the selected subcommand, reading `$HOME` for default locations.
pub async fn run(config: &Config) -> anyhow::Result<CanonicalUsage> {
    if let Command::Extract(args) = &config.command {
        return extract_usage(args, config.timeout()).await;
    }
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("HOME is not set"))?;
    run_in(config, &home).await
}

/// Like [`run`], with default locations rooted at `home`.
pub async fn run_in(config: &Config, home: &Path) -> anyhow::Result<CanonicalUsage> {
    let timeout = config.timeout();
    match &config.command {
        Command::Claude(args) => {
            let file_config = load_file_config_or_default(&config.config_path(home));
            let settings = ProviderSettings::claude(args, &file_config, home);
            let store = keychain(&settings, timeout);
            let http = http_client(timeout)?;
            Ok(usage_for(&CLAUDE, &settings, &http, store).await?)
        }
        Command::Codex(args) => {
            let settings = ProviderSettings::codex(args, home);
            let http = http_client(timeout)?;
            Ok(usage_for(&CODEX, &settings, &http, None).await?)
        }
        Command::Extract(args) => extract_usage(args, timeout).await,
    }
}

async fn extract_usage(args: &ExtractArgs, timeout: Duration) -> anyhow::Result<CanonicalUsage> {
    let raw = source::read_input(args, timeout).await?;
    Ok(extract::extract_str(&raw)?)
}

/// The config file only feeds the cookie fallback, so a broken one is not fatal.
fn load_file_config_or_default(path: &Path) -> FileConfig {
    config::load_file_config(path).unwrap_or_else(|e| {
        warn!("ignoring config file: {e:#}");
        FileConfig::default()
    })
}

/// The `security` utility only exists on macOS.
fn keychain(settings: &ProviderSettings, timeout: Duration) -> Option<Arc<dyn SecureStore>> {
    if settings.use_keychain && cfg!(target_os = "macos") {
        Some(Arc::new(KeychainStore::new(timeout)))
    } else {
        None
    }
}

/// Resolve, refresh if stale, fetch, and normalize one provider's usage.
pub async fn usage_for(
    profile: &'static Profile,
    settings: &ProviderSettings,
    http: &reqwest::Client,
    store: Option<Arc<dyn SecureStore>>,
) -> Result<CanonicalUsage, MeterError> {
    let mut resolver = Resolver::new(profile, settings.credential_paths.clone());
    if let Some(store) = store {
        resolver = resolver.with_store(store);
    }
    let token_urls = EndpointList::new(profile.token_endpoints, settings.token_url.as_deref());
    let usage_urls = EndpointList::new(profile.usage_endpoints, settings.usage_url.as_deref());

    let mut credential = resolver.resolve().await?;
    info!(provider = profile.display_name, source = %credential.handle, "credential resolved");

    let refresher = TokenRefresher::new(http, profile, &token_urls, &resolver);
    let mut token = credential.record.oauth().access_token;
    if profile.freshness.needs_refresh(&credential.record.oauth(), now_ms()) {
        info!(provider = profile.display_name, "access token is stale, refreshing");
        match refresher.refresh(&mut credential).await {
            Some(fresh) => token = fresh,
            None => match profile.stale {
                StalePolicy::Fail => {
                    return Err(MeterError::Expired { provider: profile.display_name });
                }
                StalePolicy::UseExisting => {
                    warn!(provider = profile.display_name, "refresh failed, using existing token");
                }
            },
        }
    }

    let fetcher = UsageFetcher::new(http, profile, &usage_urls);
    let response = match fetcher.fetch_usage(&token, &mut credential, &refresher).await {
        Ok(response) => response,
        Err(err @ MeterError::UpstreamError { .. }) => {
            let cookie = settings.cookie_header.as_deref().filter(|_| profile.web_fallback);
            let Some(cookie) = cookie else {
                return Err(err);
            };
            info!("bearer usage endpoints exhausted, trying web session");
            let identity = SessionIdentity::from_cookie_header(cookie)?;
            WebFallback::new(http, &settings.web_url).fetch_usage(&identity).await?
        }
        Err(err) => return Err(err),
    };

    Normalizer::new(profile.scale).normalize(&response)
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
