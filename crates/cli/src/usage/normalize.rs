// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reduce provider usage payloads to [`CanonicalUsage`].
//!
//! Each known payload shape has a pure matcher. Matchers are tried in order
//! and the first one that yields both percentages wins.

use serde_json::Value;
use tracing::debug;

use super::{reset_time, value_at, CanonicalUsage, UsageResponse};
use crate::error::MeterError;

/// How a provider reports utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PercentScale {
    /// Values up to and including 1.0 are fractions and get multiplied by 100.
    ///
    /// A provider reporting exactly 1% on a 0-100 scale is indistinguishable
    /// from a full window reported as a fraction; 1.0 is read as 100%.
    Heuristic,
    /// Values are already 0-100.
    AsReported,
}

impl PercentScale {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Heuristic if value <= 1.0 => value * 100.0,
            _ => value,
        }
    }
}

type Matcher = fn(&UsageResponse, PercentScale) -> Option<CanonicalUsage>;

const MATCHERS: &[(&str, Matcher)] = &[
    ("canonical", canonical),
    ("five_hour", rolling_windows),
    ("codex_headers", codex_headers),
    ("rate_limit", rate_limit_windows),
];

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    scale: PercentScale,
}

impl Normalizer {
    pub fn new(scale: PercentScale) -> Self {
        Self { scale }
    }

    /// The first matching shape, if any.
    pub fn recognize(&self, resp: &UsageResponse) -> Option<CanonicalUsage> {
        MATCHERS.iter().find_map(|(name, matcher)| {
            let usage = matcher(resp, self.scale)?;
            debug!(shape = name, "recognized usage payload");
            Some(usage)
        })
    }

    pub fn normalize(&self, resp: &UsageResponse) -> Result<CanonicalUsage, MeterError> {
        self.recognize(resp)
            .ok_or_else(|| MeterError::missing_fields("no known usage shape in response"))
    }
}

/// Already canonical. Never rescaled.
fn canonical(resp: &UsageResponse, _: PercentScale) -> Option<CanonicalUsage> {
    let session = number(resp.at("sessionPercent"))?;
    let weekly = number(resp.at("weeklyPercent"))?;
    Some(CanonicalUsage::new(
        session,
        weekly,
        reset_time(resp.at("sessionResetAt")),
        reset_time(resp.at("weeklyResetAt")),
    ))
}

/// `five_hour` / `seven_day` utilization windows.
fn rolling_windows(resp: &UsageResponse, scale: PercentScale) -> Option<CanonicalUsage> {
    let session = number(resp.at("five_hour.utilization"))?;
    let weekly = number(resp.at("seven_day.utilization"))?;
    Some(CanonicalUsage::new(
        scale.apply(session),
        scale.apply(weekly),
        reset_time(resp.at("five_hour.resets_at")),
        reset_time(resp.at("seven_day.resets_at")),
    ))
}

/// `x-codex-*-used-percent` headers, each falling back to its body window.
fn codex_headers(resp: &UsageResponse, scale: PercentScale) -> Option<CanonicalUsage> {
    let primary = header_number(resp, "x-codex-primary-used-percent");
    let secondary = header_number(resp, "x-codex-secondary-used-percent");
    if primary.is_none() && secondary.is_none() {
        return None;
    }
    let session = primary.or_else(|| number(resp.at("rate_limit.primary_window.used_percent")))?;
    let weekly =
        secondary.or_else(|| number(resp.at("rate_limit.secondary_window.used_percent")))?;
    Some(CanonicalUsage::new(
        scale.apply(session),
        scale.apply(weekly),
        window_reset(resp.at("rate_limit.primary_window")),
        window_reset(resp.at("rate_limit.secondary_window")),
    ))
}

/// `rate_limit.primary_window` / `secondary_window` in the body.
fn rate_limit_windows(resp: &UsageResponse, scale: PercentScale) -> Option<CanonicalUsage> {
    let session = number(resp.at("rate_limit.primary_window.used_percent"))?;
    let weekly = number(resp.at("rate_limit.secondary_window.used_percent"))?;
    Some(CanonicalUsage::new(
        scale.apply(session),
        scale.apply(weekly),
        window_reset(resp.at("rate_limit.primary_window")),
        window_reset(resp.at("rate_limit.secondary_window")),
    ))
}

fn window_reset(window: Option<&Value>) -> Option<String> {
    let window = window?;
    reset_time(value_at(window, "reset_at")).or_else(|| reset_time(value_at(window, "resets_at")))
}

fn number(value: Option<&Value>) -> Option<f64> {
    value?.as_f64().filter(|f| f.is_finite())
}

fn header_number(resp: &UsageResponse, name: &str) -> Option<f64> {
    resp.header(name)?.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
