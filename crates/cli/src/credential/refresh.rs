// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh-token exchange against an ordered list of token endpoints.

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::store::Resolver;
use super::{now_ms, Grant, ResolvedCredential};
use crate::provider::{BodyEncoding, EndpointList, Profile};

/// OAuth token response from the provider.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default)]
    expires_in: Option<f64>,
}

pub struct TokenRefresher<'a> {
    http: &'a reqwest::Client,
    profile: &'static Profile,
    endpoints: &'a EndpointList,
    resolver: &'a Resolver,
}

impl<'a> TokenRefresher<'a> {
    pub fn new(
        http: &'a reqwest::Client,
        profile: &'static Profile,
        endpoints: &'a EndpointList,
        resolver: &'a Resolver,
    ) -> Self {
        Self { http, profile, endpoints, resolver }
    }

    /// Exchange the record's refresh token for a new access token.
    ///
    /// The first endpoint that answers 2xx with a non-empty `access_token`
    /// wins. The grant is folded into the record and written back to its
    /// backend before returning. `None` when there is no refresh token or
    /// every endpoint failed.
    pub async fn refresh(&self, credential: &mut ResolvedCredential) -> Option<String> {
        let Some(refresh_token) = credential.record.oauth().refresh_token else {
            debug!("no refresh token available");
            return None;
        };

        for url in self.endpoints.iter() {
            let grant = match self.exchange(url, &refresh_token).await {
                Ok(grant) => grant,
                Err(e) => {
                    warn!(url, "token refresh failed: {e}");
                    continue;
                }
            };

            info!(url, rotated = grant.refresh_token.is_some(), "token refreshed");
            credential.record.apply_grant(&grant, now_ms());

            // Write-back is best effort: the new token is valid for this run
            // whether or not it reached the backend.
            if let Err(e) = self.resolver.persist(credential).await {
                warn!(backend = %credential.handle, "failed to persist refreshed credentials: {e:#}");
            }
            return Some(grant.access_token);
        }

        None
    }

    async fn exchange(&self, url: &str, refresh_token: &str) -> Result<Grant, RefreshError> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.profile.client_id),
            ("refresh_token", refresh_token),
        ];
        if let Some(scope) = self.profile.scope {
            params.push(("scope", scope));
        }

        let request = self.http.post(url).header("Accept", "application/json");
        let request = match self.profile.encoding {
            BodyEncoding::Json => {
                let body: serde_json::Map<String, serde_json::Value> =
                    params.iter().map(|(k, v)| ((*k).to_owned(), (*v).into())).collect();
                request.json(&body)
            }
            BodyEncoding::Form => request.form(&params),
        };

        let resp = request.send().await.map_err(|e| RefreshError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| RefreshError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RefreshError::Rejected { status: status.as_u16(), body });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| RefreshError::Malformed(e.to_string()))?;
        let access_token = token
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| RefreshError::Malformed("missing access_token".into()))?;

        Ok(Grant {
            access_token,
            refresh_token: token.refresh_token.filter(|t| !t.is_empty()),
            id_token: token.id_token,
            expires_in: token.expires_in,
        })
    }
}

/// Why a single token endpoint was not accepted.
enum RefreshError {
    Transport(String),
    Rejected { status: u16, body: String },
    Malformed(String),
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Rejected { status, body } => write!(f, "HTTP {status}: {}", truncate(body, 200)),
            Self::Malformed(msg) => write!(f, "bad response: {msg}"),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
