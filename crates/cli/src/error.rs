// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Terminal failures of a usage run. Each maps to a stable code and exit status.
#[derive(Debug, Clone, PartialEq)]
pub enum MeterError {
    /// No backend produced a usable credential record.
    NotFound { provider: &'static str, hint: &'static str },
    /// The token is stale and could not be refreshed.
    Expired { provider: &'static str },
    /// Every usage candidate was exhausted. `status` is `None` for transport errors.
    UpstreamError { status: Option<u16>, url: String },
    /// A payload did not carry both usage percentages.
    MissingFields { detail: String },
    /// The configured cookie header has no `sessionKey`.
    MissingSessionKey,
    /// The extraction input could not be read or parsed.
    Input { detail: String },
}

impl MeterError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Expired { .. } => "EXPIRED",
            Self::UpstreamError { .. } => "UPSTREAM_ERROR",
            Self::MissingFields { .. } => "MISSING_FIELDS",
            Self::MissingSessionKey => "MISSING_SESSION_KEY",
            Self::Input { .. } => "INPUT",
        }
    }

    /// Process exit status. 1 is reserved for untyped failures, 2 for CLI usage.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 3,
            Self::Expired { .. } => 4,
            Self::UpstreamError { .. } => 5,
            Self::MissingFields { .. } => 6,
            Self::MissingSessionKey => 7,
            Self::Input { .. } => 8,
        }
    }

    pub fn missing_fields(detail: impl Into<String>) -> Self {
        Self::MissingFields { detail: detail.into() }
    }

    pub fn input(detail: impl Into<String>) -> Self {
        Self::Input { detail: detail.into() }
    }
}

impl fmt::Display for MeterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { provider, hint } => {
                write!(f, "{provider} credentials not found: {hint}")
            }
            Self::Expired { provider } => {
                write!(f, "{provider} token expired and could not be refreshed")
            }
            Self::UpstreamError { status: Some(status), url } => {
                write!(f, "usage request failed: HTTP {status} from {url}")
            }
            Self::UpstreamError { status: None, url } if url.is_empty() => {
                f.write_str("usage request failed: no endpoints configured")
            }
            Self::UpstreamError { status: None, url } => {
                write!(f, "usage request failed: no response from {url}")
            }
            Self::MissingFields { detail } => write!(f, "missing usage fields: {detail}"),
            Self::MissingSessionKey => f.write_str("cookie header has no sessionKey"),
            Self::Input { detail } => write!(f, "invalid input: {detail}"),
        }
    }
}

impl std::error::Error for MeterError {}

/// Exit status for an error returned from a run.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<MeterError>().map(MeterError::exit_code).unwrap_or(1)
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
