// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::OAuthState;

/// When an access token must be refreshed before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Refresh once `now + buffer` reaches `expires_at`.
    ExpiryBuffer(Duration),
    /// Refresh once the last refresh is older than the given age.
    MaxAge(Duration),
}

impl Freshness {
    /// A missing or malformed timestamp always counts as stale.
    pub fn needs_refresh(&self, state: &OAuthState, now_ms: i64) -> bool {
        match *self {
            Self::ExpiryBuffer(buffer) => match state.expires_at_ms {
                Some(expires_at) => now_ms.saturating_add(millis(buffer)) >= expires_at,
                None => true,
            },
            Self::MaxAge(age) => match state.refreshed_at_ms {
                Some(refreshed_at) => now_ms.saturating_sub(refreshed_at) > millis(age),
                None => true,
            },
        }
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[path = "freshness_tests.rs"]
mod tests;
