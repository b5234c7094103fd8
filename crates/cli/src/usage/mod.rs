// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Usage payloads and the canonical record every provider is reduced to.

pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod web;

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// The output contract. Percentages are on a 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalUsage {
    pub session_percent: f64,
    pub weekly_percent: f64,
    pub session_reset_at: Option<String>,
    pub weekly_reset_at: Option<String>,
    pub updated_at: String,
}

impl CanonicalUsage {
    /// Build a record stamped with the current time. Percentages are clamped to `[0, 100]`.
    pub fn new(
        session_percent: f64,
        weekly_percent: f64,
        session_reset_at: Option<String>,
        weekly_reset_at: Option<String>,
    ) -> Self {
        Self {
            session_percent: session_percent.clamp(0.0, 100.0),
            weekly_percent: weekly_percent.clamp(0.0, 100.0),
            session_reset_at,
            weekly_reset_at,
            updated_at: iso8601(Utc::now()),
        }
    }
}

/// A usage endpoint answer: parsed body plus lower-cased response headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageResponse {
    pub body: Value,
    pub headers: HashMap<String, String>,
}

impl UsageResponse {
    pub fn from_body(body: Value) -> Self {
        Self { body, headers: HashMap::new() }
    }

    /// Read a reqwest response. An empty body counts as `{}`.
    pub async fn read(resp: reqwest::Response) -> anyhow::Result<Self> {
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_ascii_lowercase(), v.to_str().ok()?.to_owned())))
            .collect();
        let text = resp.text().await?;
        let body = if text.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("invalid JSON body: {e}"))?
        };
        Ok(Self { body, headers })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn at(&self, path: &str) -> Option<&Value> {
        value_at(&self.body, path)
    }
}

/// Walk a dotted key path through nested objects.
pub fn value_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, key| node.as_object()?.get(key))
}

/// Interpret a reset value: a non-blank string is kept, a number is epoch seconds.
pub fn reset_time(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Value::Number(n) => {
            let secs = n.as_f64().filter(|f| f.is_finite())?;
            let millis = (secs * 1000.0).round() as i64;
            DateTime::<Utc>::from_timestamp_millis(millis).map(iso8601)
        }
        _ => None,
    }
}

fn iso8601(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
