// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-provider constants: where credentials live, which endpoints to try,
//! and how each provider's payloads are scaled.

use std::time::Duration;

use crate::credential::freshness::Freshness;
use crate::credential::CredentialLayout;
use crate::usage::normalize::PercentScale;

/// How a token refresh request body is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    Form,
}

/// What to do when the freshness policy fires and refresh fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalePolicy {
    /// The token is treated as expired.
    Fail,
    /// Keep using the current token; the age policy is advisory.
    UseExisting,
}

#[derive(Debug)]
pub struct Profile {
    pub display_name: &'static str,
    pub login_hint: &'static str,
    pub layout: CredentialLayout,
    /// Secure store service name, if the provider keeps credentials there.
    pub keychain_service: Option<&'static str>,
    pub token_endpoints: &'static [&'static str],
    pub usage_endpoints: &'static [&'static str],
    pub client_id: &'static str,
    pub scope: Option<&'static str>,
    pub encoding: BodyEncoding,
    pub freshness: Freshness,
    pub scale: PercentScale,
    pub stale: StalePolicy,
    /// Static headers sent with every usage request.
    pub usage_headers: &'static [(&'static str, &'static str)],
    /// Whether the session-cookie web path can be used after the bearer chain.
    pub web_fallback: bool,
}

pub static CLAUDE: Profile = Profile {
    display_name: "Claude",
    login_hint: "run `claude` to log in",
    layout: CredentialLayout::ClaudeOauth,
    keychain_service: Some("Claude Code-credentials"),
    token_endpoints: &[
        "https://platform.claude.com/v1/oauth/token",
        "https://claude.ai/api/oauth/token",
    ],
    usage_endpoints: &["https://api.anthropic.com/api/oauth/usage", "https://claude.ai/api/oauth/usage"],
    client_id: "9d1c250a-e61b-44d9-88ed-5944d1962f5e",
    scope: Some("user:profile user:inference user:sessions:claude_code user:mcp_servers"),
    encoding: BodyEncoding::Json,
    freshness: Freshness::ExpiryBuffer(Duration::from_secs(5 * 60)),
    scale: PercentScale::Heuristic,
    stale: StalePolicy::Fail,
    usage_headers: &[("anthropic-beta", "oauth-2025-04-20")],
    web_fallback: true,
};

pub static CODEX: Profile = Profile {
    display_name: "Codex",
    login_hint: "run `codex` to log in",
    layout: CredentialLayout::CodexTokens,
    keychain_service: None,
    token_endpoints: &["https://auth.openai.com/oauth/token"],
    usage_endpoints: &["https://chatgpt.com/backend-api/wham/usage"],
    client_id: "app_EMoamEEZ73f0CkXaXp7hrann",
    scope: None,
    encoding: BodyEncoding::Form,
    freshness: Freshness::MaxAge(Duration::from_secs(8 * 24 * 60 * 60)),
    scale: PercentScale::AsReported,
    stale: StalePolicy::UseExisting,
    usage_headers: &[],
    web_fallback: false,
};

/// Ordered candidate URLs. An override goes in front of the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointList(Vec<String>);

impl EndpointList {
    pub fn new<S: AsRef<str>>(defaults: &[S], override_url: Option<&str>) -> Self {
        let mut urls: Vec<String> = Vec::with_capacity(defaults.len() + 1);
        let candidates = override_url.into_iter().chain(defaults.iter().map(AsRef::as_ref));
        for url in candidates.map(str::trim).filter(|u| !u.is_empty()) {
            if !urls.iter().any(|u| u == url) {
                urls.push(url.to_owned());
            }
        }
        Self(urls)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
