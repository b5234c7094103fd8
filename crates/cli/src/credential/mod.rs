// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential records as stored by the provider CLIs.
//!
//! A record is kept as the raw JSON document so that write-back preserves
//! every field the provider tool put there. The [`CredentialLayout`] says
//! where the OAuth fields live inside it.

pub mod freshness;
pub mod refresh;
pub mod store;

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Where the OAuth fields live inside a credential document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialLayout {
    /// `{"claudeAiOauth": {"accessToken", "refreshToken", "expiresAt"}}`, or
    /// the same keys at the root.
    ClaudeOauth,
    /// `{"tokens": {"access_token", ...}, "last_refresh": "<rfc3339>"}`.
    CodexTokens,
}

/// The backend that supplied a record. Write-back always targets the same one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendHandle {
    File(PathBuf),
    SecureStore { service: String },
}

impl std::fmt::Display for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::SecureStore { service } => write!(f, "keychain:{service}"),
        }
    }
}

/// OAuth fields read out of a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OAuthState {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Milliseconds since epoch. `None` when absent or malformed.
    pub expires_at_ms: Option<i64>,
    /// Milliseconds since epoch of the last successful refresh.
    pub refreshed_at_ms: Option<i64>,
}

/// A successful token endpoint answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// Lifetime in seconds.
    pub expires_in: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRecord {
    document: Value,
    layout: CredentialLayout,
}

impl CredentialRecord {
    /// Parse a record, requiring a JSON object with a non-empty access token.
    pub fn parse(raw: &str, layout: CredentialLayout) -> anyhow::Result<Self> {
        let document: Value =
            serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("invalid JSON: {e}"))?;
        Self::from_document(document, layout)
    }

    pub fn from_document(document: Value, layout: CredentialLayout) -> anyhow::Result<Self> {
        if !document.is_object() {
            anyhow::bail!("credential document is not a JSON object");
        }
        let record = Self { document, layout };
        if record.oauth().access_token.is_empty() {
            anyhow::bail!("missing or empty access token");
        }
        Ok(record)
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn layout(&self) -> CredentialLayout {
        self.layout
    }

    pub fn oauth(&self) -> OAuthState {
        match self.layout {
            CredentialLayout::ClaudeOauth => {
                let obj = claude_section(&self.document);
                OAuthState {
                    access_token: non_blank(obj.get("accessToken")).unwrap_or_default(),
                    refresh_token: non_blank(obj.get("refreshToken")),
                    expires_at_ms: obj.get("expiresAt").and_then(epoch_ms),
                    refreshed_at_ms: None,
                }
            }
            CredentialLayout::CodexTokens => {
                let tokens = self.document.get("tokens").unwrap_or(&Value::Null);
                OAuthState {
                    access_token: non_blank(tokens.get("access_token")).unwrap_or_default(),
                    refresh_token: non_blank(tokens.get("refresh_token")),
                    expires_at_ms: None,
                    refreshed_at_ms: self
                        .document
                        .get("last_refresh")
                        .and_then(Value::as_str)
                        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
                        .map(|dt| dt.timestamp_millis()),
                }
            }
        }
    }

    /// Provider headers derived from the record (e.g. the ChatGPT account id).
    pub fn extra_headers(&self) -> Vec<(String, String)> {
        match self.layout {
            CredentialLayout::ClaudeOauth => vec![],
            CredentialLayout::CodexTokens => self
                .document
                .get("tokens")
                .and_then(|t| non_blank(t.get("account_id")))
                .map(|id| vec![("ChatGPT-Account-Id".to_owned(), id)])
                .unwrap_or_default(),
        }
    }

    /// Fold a token grant into the document.
    pub fn apply_grant(&mut self, grant: &Grant, now_ms: i64) {
        match self.layout {
            CredentialLayout::ClaudeOauth => {
                let Some(obj) = claude_section_mut(&mut self.document) else {
                    return;
                };
                obj.insert("accessToken".into(), Value::String(grant.access_token.clone()));
                if let Some(ref rt) = grant.refresh_token {
                    obj.insert("refreshToken".into(), Value::String(rt.clone()));
                }
                if let Some(lifetime_ms) = grant.expires_in.and_then(lifetime_ms) {
                    obj.insert("expiresAt".into(), Value::from(now_ms.saturating_add(lifetime_ms)));
                }
            }
            CredentialLayout::CodexTokens => {
                let Some(root) = self.document.as_object_mut() else {
                    return;
                };
                let tokens = root
                    .entry("tokens")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Some(tokens) = tokens.as_object_mut() {
                    tokens.insert("access_token".into(), Value::String(grant.access_token.clone()));
                    if let Some(ref rt) = grant.refresh_token {
                        tokens.insert("refresh_token".into(), Value::String(rt.clone()));
                    }
                    if let Some(ref id) = grant.id_token {
                        tokens.insert("id_token".into(), Value::String(id.clone()));
                    }
                }
                let stamp = DateTime::<Utc>::from_timestamp_millis(now_ms)
                    .unwrap_or_else(Utc::now)
                    .to_rfc3339_opts(SecondsFormat::Micros, true);
                root.insert("last_refresh".into(), Value::String(stamp));
            }
        }
    }

    /// Serialize for write-back in the format the provider tool writes.
    pub fn to_json(&self) -> anyhow::Result<String> {
        let json = match self.layout {
            CredentialLayout::ClaudeOauth => serde_json::to_string(&self.document)?,
            CredentialLayout::CodexTokens => serde_json::to_string_pretty(&self.document)?,
        };
        Ok(json)
    }
}

/// A resolved record together with the backend it came from.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub record: CredentialRecord,
    pub handle: BackendHandle,
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn claude_section(document: &Value) -> &Value {
    match document.get("claudeAiOauth") {
        Some(nested) if nested.is_object() => nested,
        _ => document,
    }
}

fn claude_section_mut(document: &mut Value) -> Option<&mut Map<String, Value>> {
    let nested = document.get("claudeAiOauth").is_some_and(Value::is_object);
    if nested {
        document.get_mut("claudeAiOauth").and_then(Value::as_object_mut)
    } else {
        document.as_object_mut()
    }
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

/// A token lifetime in milliseconds. Non-finite, non-positive, or
/// out-of-range lifetimes are ignored and the previous expiry is kept.
fn lifetime_ms(secs: f64) -> Option<i64> {
    let ms = secs * 1000.0;
    (ms.is_finite() && ms > 0.0 && ms < i64::MAX as f64).then_some(ms as i64)
}

fn epoch_ms(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
