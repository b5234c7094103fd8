// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-cookie usage path, used after the bearer chain is exhausted.

use serde_json::Value;
use tracing::{debug, info};

use super::UsageResponse;
use crate::error::MeterError;

/// The `sessionKey` cookie and the header it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub session_key: String,
    pub cookie_header: String,
}

const COOKIE_PREFIX: &str = "cookie:";

impl SessionIdentity {
    /// Parse a browser cookie header, with or without a leading `Cookie:`.
    pub fn from_cookie_header(raw: &str) -> Result<Self, MeterError> {
        let mut header = raw.trim();
        if header.get(..COOKIE_PREFIX.len()).is_some_and(|p| p.eq_ignore_ascii_case(COOKIE_PREFIX)) {
            header = header[COOKIE_PREFIX.len()..].trim();
        }

        let session_key = header
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .find(|(name, _)| name.trim() == "sessionKey")
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
            .ok_or(MeterError::MissingSessionKey)?;

        Ok(Self { session_key: session_key.to_owned(), cookie_header: header.to_owned() })
    }
}

pub struct WebFallback<'a> {
    http: &'a reqwest::Client,
    base_url: &'a str,
}

impl<'a> WebFallback<'a> {
    pub fn new(http: &'a reqwest::Client, base_url: &'a str) -> Self {
        Self { http, base_url: base_url.trim_end_matches('/') }
    }

    /// Discover the account's organization, then fetch its usage.
    pub async fn fetch_usage(&self, identity: &SessionIdentity) -> Result<UsageResponse, MeterError> {
        let orgs_url = format!("{}/api/organizations", self.base_url);
        let orgs = self.get(&orgs_url, identity).await?;
        let org_id = select_organization(&orgs.body).ok_or_else(|| {
            MeterError::missing_fields("no organization with a UUID in organizations response")
        })?;
        info!(org = %org_id, "using web session usage");

        let usage_url = format!("{}/api/organizations/{org_id}/usage", self.base_url);
        self.get(&usage_url, identity).await
    }

    async fn get(&self, url: &str, identity: &SessionIdentity) -> Result<UsageResponse, MeterError> {
        let upstream = |status: Option<u16>| MeterError::UpstreamError { status, url: url.to_owned() };

        let resp = self
            .http
            .get(url)
            .header(reqwest::header::COOKIE, identity.cookie_header.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                debug!(url, "web request failed: {e}");
                upstream(None)
            })?;

        let status = resp.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "web request rejected");
            return Err(upstream(Some(status.as_u16())));
        }
        UsageResponse::read(resp).await.map_err(|e| {
            debug!(url, "web response unreadable: {e:#}");
            upstream(Some(status.as_u16()))
        })
    }
}

/// The first organization whose `uuid` (or `id`) is a hyphenated UUID.
pub fn select_organization(body: &Value) -> Option<String> {
    body.as_array()?.iter().find_map(|org| {
        ["uuid", "id"]
            .iter()
            .filter_map(|key| org.get(*key).and_then(Value::as_str))
            .find(|id| is_hyphenated_uuid(id))
            .map(str::to_owned)
    })
}

fn is_hyphenated_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::try_parse(s).is_ok()
}

#[cfg(test)]
#[path = "web_tests.rs"]
mod tests;
