// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-authenticated usage retrieval over an ordered endpoint list.

use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::normalize::Normalizer;
use super::UsageResponse;
use crate::credential::refresh::TokenRefresher;
use crate::credential::ResolvedCredential;
use crate::error::MeterError;
use crate::provider::{EndpointList, Profile};

/// Outcome of one pass over the endpoint list that accepted nothing.
#[derive(Debug, Clone, Default)]
struct PassFailure {
    /// Status of the last candidate; `None` when it produced no response.
    status: Option<u16>,
    url: String,
    /// Some candidate answered 401 or 403.
    auth_rejected: bool,
}

impl PassFailure {
    fn into_error(self) -> MeterError {
        MeterError::UpstreamError { status: self.status, url: self.url }
    }
}

pub struct UsageFetcher<'a> {
    http: &'a reqwest::Client,
    profile: &'static Profile,
    endpoints: &'a EndpointList,
    normalizer: Normalizer,
}

impl<'a> UsageFetcher<'a> {
    pub fn new(
        http: &'a reqwest::Client,
        profile: &'static Profile,
        endpoints: &'a EndpointList,
    ) -> Self {
        Self { http, profile, endpoints, normalizer: Normalizer::new(profile.scale) }
    }

    /// Fetch a usage payload the provider's normalizer recognizes.
    ///
    /// When a full pass is rejected with 401/403, the token is refreshed once
    /// and the whole list is tried again with the new token. A second
    /// rejection is final.
    pub async fn fetch_usage(
        &self,
        token: &str,
        credential: &mut ResolvedCredential,
        refresher: &TokenRefresher<'_>,
    ) -> Result<UsageResponse, MeterError> {
        let failure = match self.pass(token, credential).await {
            Ok(resp) => return Ok(resp),
            Err(failure) => failure,
        };
        if !failure.auth_rejected {
            return Err(failure.into_error());
        }

        info!("usage endpoints rejected the token, refreshing");
        let Some(fresh) = refresher.refresh(credential).await else {
            warn!("refresh after authorization failure did not yield a token");
            return Err(failure.into_error());
        };
        self.pass(&fresh, credential).await.map_err(PassFailure::into_error)
    }

    async fn pass(
        &self,
        token: &str,
        credential: &ResolvedCredential,
    ) -> Result<UsageResponse, PassFailure> {
        let extra = credential.record.extra_headers();
        let mut failure = PassFailure::default();

        for url in self.endpoints.iter() {
            failure.url = url.to_owned();

            let mut req = self
                .http
                .get(url)
                .bearer_auth(token)
                .header(reqwest::header::ACCEPT, "application/json");
            for (name, value) in self.profile.usage_headers {
                req = req.header(*name, *value);
            }
            for (name, value) in &extra {
                req = req.header(name.as_str(), value.as_str());
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(url, "usage request failed: {e}");
                    failure.status = None;
                    continue;
                }
            };

            let status = resp.status();
            failure.status = Some(status.as_u16());
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                warn!(url, status = status.as_u16(), "usage endpoint rejected token");
                failure.auth_rejected = true;
                continue;
            }
            if !status.is_success() {
                warn!(url, status = status.as_u16(), "usage endpoint failed");
                continue;
            }

            let usage = match UsageResponse::read(resp).await {
                Ok(usage) => usage,
                Err(e) => {
                    warn!(url, "unreadable usage response: {e:#}");
                    continue;
                }
            };
            if self.normalizer.recognize(&usage).is_none() {
                warn!(url, "usage response has no known shape");
                continue;
            }

            debug!(url, "usage response accepted");
            return Ok(usage);
        }

        Err(failure)
    }
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
