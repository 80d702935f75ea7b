//! Request admission control
//!
//! Every request except `GET /health` passes through [`enforce`] before it
//! reaches a route. The check is a fixed-window counter kept in the shared
//! [`CounterStore`]:
//!
//! 1. The client is resolved to a [`ClientIdentity`]
//! 2. One atomic increment is applied to the identity's window
//! 3. The returned count is compared with the [`Quota`]
//!
//! No counter state is kept here; several server processes pointed at the
//! same store enforce one combined limit.
//!
//! # Store Outages
//!
//! When the store cannot be reached (or does not answer within its
//! timeout) the configured [`FailurePolicy`] decides: `Open` admits the
//! request without a limit, `Closed` rejects it with 503.

use crate::accounts::SESSION_HEADER;
use crate::config::{FailurePolicy, KeyGranularity};
use crate::error::{ApiError, StoreError};
use crate::metrics::{AdmissionOutcome, Metrics};
use crate::store::{AccountStore, CounterStore};
use crate::transport::http::AppState;
use crate::types::{ClientIdentity, Decision, Quota};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Result of an admission check
#[derive(Debug)]
pub enum Admission {
    /// Let the request through; `remaining` is unknown when the store was
    /// down and the policy is fail-open
    Allow { remaining: Option<u64> },
    /// Reject with 429
    Deny { retry_after: Duration },
    /// Reject with 503; the store is down and the policy is fail-closed
    Unavailable(StoreError),
}

/// Fixed-window admission controller over a shared counter store
pub struct AdmissionController {
    store: Arc<dyn CounterStore>,
    quota: Quota,
    policy: FailurePolicy,
    key_prefix: String,
    metrics: Arc<Metrics>,
    degraded: AtomicBool,
}

impl AdmissionController {
    pub fn new(
        store: Arc<dyn CounterStore>,
        quota: Quota,
        policy: FailurePolicy,
        key_prefix: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            quota,
            policy,
            key_prefix: key_prefix.into(),
            metrics,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Count one request for `identity` and decide whether it is admitted
    ///
    /// The increment is applied before the decision and stands even if the
    /// request later fails.
    pub async fn admit(&self, identity: &ClientIdentity, now: SystemTime) -> Admission {
        let key = identity.store_key(&self.key_prefix);

        match self.store.increment(&key, self.quota.period(), now).await {
            Ok(state) => {
                if self.degraded.swap(false, Ordering::Relaxed) {
                    tracing::info!("Counter store reachable again");
                }

                match self.quota.decide(state) {
                    Decision::Allow { remaining } => {
                        self.metrics.record_admission(AdmissionOutcome::Allowed);
                        Admission::Allow {
                            remaining: Some(remaining),
                        }
                    }
                    Decision::Deny { retry_after } => {
                        self.metrics.record_admission(AdmissionOutcome::Denied);
                        tracing::debug!(
                            client = %identity,
                            count = state.count,
                            ?retry_after,
                            "Rate limit exceeded"
                        );
                        Admission::Deny { retry_after }
                    }
                }
            }
            Err(e) => {
                // Warn once per outage, not once per request
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    tracing::warn!(policy = ?self.policy, "Counter store unavailable: {}", e);
                } else {
                    tracing::debug!("Counter store still unavailable: {}", e);
                }

                match self.policy {
                    FailurePolicy::Open => {
                        self.metrics.record_admission(AdmissionOutcome::FailOpen);
                        Admission::Allow { remaining: None }
                    }
                    FailurePolicy::Closed => {
                        self.metrics.record_admission(AdmissionOutcome::FailClosed);
                        Admission::Unavailable(e)
                    }
                }
            }
        }
    }
}

/// Maps a request to the identity its window is keyed by
pub struct IdentityResolver {
    granularity: KeyGranularity,
    trust_forwarded_for: bool,
    accounts: Arc<dyn AccountStore>,
}

impl IdentityResolver {
    pub fn new(
        granularity: KeyGranularity,
        trust_forwarded_for: bool,
        accounts: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            granularity,
            trust_forwarded_for,
            accounts,
        }
    }

    /// Resolve the identity of a request from its headers and socket peer
    ///
    /// In session mode a request with a live `X-Session-Id` is counted
    /// against its account; anything else falls back to the address.
    pub async fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientIdentity {
        if self.granularity == KeyGranularity::Session {
            if let Some(login) = self.session_account(headers).await {
                return ClientIdentity::Account(login);
            }
        }

        match self.client_ip(headers, peer) {
            Some(ip) => ClientIdentity::from_ip(ip),
            None => ClientIdentity::Unknown,
        }
    }

    async fn session_account(&self, headers: &HeaderMap) -> Option<String> {
        let session_id = headers.get(SESSION_HEADER)?.to_str().ok()?;

        match self.accounts.session_login(session_id).await {
            Ok(login) => login,
            Err(e) => {
                tracing::debug!("Session lookup failed, keying by address: {}", e);
                None
            }
        }
    }

    fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
        if self.trust_forwarded_for {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|first| first.trim().parse::<IpAddr>().ok());

            if forwarded.is_some() {
                return forwarded;
            }
        }

        peer.map(|addr| addr.ip())
    }
}

/// Admission middleware
///
/// Installed with `axum::middleware::from_fn_with_state` in front of every
/// admitted route.
pub async fn enforce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let identity = state.identities.resolve(request.headers(), peer).await;
    let admission = state.admission.admit(&identity, SystemTime::now()).await;

    match admission {
        Admission::Allow { remaining } => {
            let mut response = next.run(request).await;

            if let Some(remaining) = remaining {
                let headers = response.headers_mut();
                headers.insert(
                    LIMIT_HEADER,
                    HeaderValue::from(state.admission.quota().limit()),
                );
                headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            }

            response
        }
        Admission::Deny { retry_after } => {
            let retry_after_secs = Decision::Deny { retry_after }.retry_after_secs();
            let mut response = ApiError::RateLimited { retry_after_secs }.into_response();

            let headers = response.headers_mut();
            headers.insert(
                LIMIT_HEADER,
                HeaderValue::from(state.admission.quota().limit()),
            );
            headers.insert(REMAINING_HEADER, HeaderValue::from(0u64));

            response
        }
        Admission::Unavailable(e) => ApiError::StoreUnavailable(e).into_response(),
    }
}
