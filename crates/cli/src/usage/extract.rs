// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema-agnostic extraction from arbitrary JSON.
//!
//! Unlike [`super::normalize`], values are taken as reported: a source that
//! emits 0-1 fractions must scale them itself.

use serde_json::Value;

use super::{reset_time, value_at, CanonicalUsage};
use crate::error::MeterError;

const SESSION_PATHS: &[&str] = &[
    "sessionPercent",
    "session_percent",
    "five_hour.utilization",
    "fiveHour.utilization",
    "rate_limit.primary_window.used_percent",
    "rateLimit.primaryWindow.used_percent",
    "primary_window.used_percent",
];

const WEEKLY_PATHS: &[&str] = &[
    "weeklyPercent",
    "weekly_percent",
    "seven_day.utilization",
    "sevenDay.utilization",
    "rate_limit.secondary_window.used_percent",
    "rateLimit.secondaryWindow.used_percent",
    "secondary_window.used_percent",
];

const SESSION_RESET_PATHS: &[&str] = &[
    "sessionResetAt",
    "five_hour.resets_at",
    "fiveHour.resets_at",
    "primary_window.reset_at",
    "rate_limit.primary_window.reset_at",
    "rateLimit.primaryWindow.reset_at",
];

const WEEKLY_RESET_PATHS: &[&str] = &[
    "weeklyResetAt",
    "seven_day.resets_at",
    "sevenDay.resets_at",
    "secondary_window.reset_at",
    "rate_limit.secondary_window.reset_at",
    "rateLimit.secondaryWindow.reset_at",
];

pub fn extract(doc: &Value) -> Result<CanonicalUsage, MeterError> {
    let from_paths = (first_number(doc, SESSION_PATHS), first_number(doc, WEEKLY_PATHS));
    let (session, weekly) = match from_paths {
        (Some(session), Some(weekly)) => (session, weekly),
        partial => match progress_lines(doc) {
            Some(pair) => pair,
            None => {
                let missing = match partial {
                    (None, None) => "session and weekly percent",
                    (None, _) => "session percent",
                    _ => "weekly percent",
                };
                return Err(MeterError::missing_fields(missing));
            }
        },
    };
    Ok(CanonicalUsage::new(
        session,
        weekly,
        first_reset(doc, SESSION_RESET_PATHS),
        first_reset(doc, WEEKLY_RESET_PATHS),
    ))
}

/// Parse raw text then extract.
pub fn extract_str(raw: &str) -> Result<CanonicalUsage, MeterError> {
    if raw.trim().is_empty() {
        return Err(MeterError::input("empty input"));
    }
    let doc: Value = serde_json::from_str(raw)
        .map_err(|e| MeterError::input(format!("invalid JSON: {e}")))?;
    extract(&doc)
}

fn first_number(doc: &Value, paths: &[&str]) -> Option<f64> {
    paths.iter().find_map(|p| value_at(doc, p).and_then(read_number))
}

fn first_reset(doc: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|p| reset_time(value_at(doc, p)))
}

/// Session and weekly from a `lines` array of progress entries.
///
/// Entries labelled `session` / `weekly` win; otherwise the first and second
/// percent-unit progress entries are used.
fn progress_lines(doc: &Value) -> Option<(f64, f64)> {
    let progress: Vec<&Value> = doc
        .get("lines")?
        .as_array()?
        .iter()
        .filter(|line| line.get("type").and_then(Value::as_str) == Some("progress"))
        .filter(|line| match line.get("unit") {
            None | Some(Value::Null) => true,
            Some(unit) => unit.as_str() == Some("percent"),
        })
        .collect();

    let labelled = |name: &str| {
        progress.iter().find(|line| {
            line.get("label")
                .and_then(Value::as_str)
                .is_some_and(|label| label.eq_ignore_ascii_case(name))
        })
    };
    let value = |line: Option<&&Value>| line.and_then(|l| l.get("value")).and_then(read_number);

    let session = value(labelled("session")).or_else(|| value(progress.first()))?;
    let weekly = value(labelled("weekly")).or_else(|| value(progress.get(1)))?;
    Some((session, weekly))
}

/// Numbers and numeric strings, finite only.
fn read_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
