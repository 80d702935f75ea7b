//! Accounts and sessions
//!
//! # API Endpoints
//!
//! ## POST /register
//!
//! ```json
//! { "type": "reg", "login": "alice", "password": "secret" }
//! ```
//!
//! Creates the account and logs it in. `409 Conflict` if the login exists.
//!
//! ## POST /login
//!
//! ```json
//! { "type": "login", "login": "alice", "password": "secret" }
//! ```
//!
//! Issues a new session and drops the login's previous one. `401` on bad
//! credentials.
//!
//! Both return `{ "session_id": "<uuid>" }`. Clients send the id back in the
//! `X-Session-Id` header.

use crate::error::{ApiError, StoreError};
use crate::store::AccountStore;
use crate::transport::http::AppState;
use crate::types::{CredentialsRequest, SessionResponse};
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub const SESSION_HEADER: &str = "x-session-id";

const SALT_LEN: usize = 16;

/// Salted SHA-256 of `password`, stored as `hex(salt)$hex(digest)`
pub fn hash_password(password: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    format!(
        "{}${}",
        hex::encode(salt),
        hex::encode(digest(&salt, password))
    )
}

/// Check `password` against a hash produced by [`hash_password`]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };

    digest(&salt, password).as_slice().ct_eq(expected.as_slice()).into()
}

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

/// Registration, login and session lookup over an [`AccountStore`]
#[derive(Clone)]
pub struct Accounts {
    store: Arc<dyn AccountStore>,
    session_ttl: Duration,
}

impl Accounts {
    pub fn new(store: Arc<dyn AccountStore>, session_ttl: Duration) -> Self {
        Self { store, session_ttl }
    }

    /// Create an account and open its first session
    pub async fn register(&self, login: &str, password: &str) -> Result<String, ApiError> {
        validate_credentials(login, password)?;

        let created = self
            .store
            .create_account(login, &hash_password(password))
            .await?;
        if !created {
            return Err(ApiError::Conflict(format!(
                "login {login} is already registered"
            )));
        }

        tracing::info!(login, "Account registered");
        self.open_session(login).await
    }

    /// Check credentials and open a new session, replacing the previous one
    pub async fn login(&self, login: &str, password: &str) -> Result<String, ApiError> {
        let valid = match self.store.password_hash(login).await? {
            Some(stored) => verify_password(password, &stored),
            None => false,
        };
        if !valid {
            return Err(ApiError::Unauthorized(
                "invalid login or password".to_string(),
            ));
        }

        self.open_session(login).await
    }

    /// Login owning the session named in the `X-Session-Id` header
    ///
    /// # Errors
    ///
    /// [`ApiError::Unauthorized`] if the header is missing or the session is
    /// unknown or expired.
    pub async fn require_session(&self, headers: &HeaderMap) -> Result<String, ApiError> {
        let session_id = headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing X-Session-Id header".to_string()))?;

        self.session_login(session_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("session expired or unknown".to_string()))
    }

    pub async fn session_login(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        self.store.session_login(session_id).await
    }

    async fn open_session(&self, login: &str) -> Result<String, ApiError> {
        let session_id = Uuid::new_v4().to_string();
        self.store
            .replace_session(login, &session_id, self.session_ttl)
            .await?;
        tracing::debug!(login, "Session opened");
        Ok(session_id)
    }
}

fn validate_credentials(login: &str, password: &str) -> Result<(), ApiError> {
    if login.trim().is_empty() {
        return Err(ApiError::BadRequest("login must not be empty".to_string()));
    }
    if password.is_empty() {
        return Err(ApiError::BadRequest(
            "password must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn credentials(
    body: Result<Json<CredentialsRequest>, JsonRejection>,
    expected_kind: &str,
) -> Result<CredentialsRequest, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if request.kind != expected_kind {
        return Err(ApiError::BadRequest(format!(
            "invalid request type {:?}, expected {:?}",
            request.kind, expected_kind
        )));
    }
    Ok(request)
}

/// `POST /register`
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ApiError> {
    let request = credentials(body, "reg")?;
    let session_id = state
        .accounts
        .register(&request.login, &request.password)
        .await?;

    state.metrics.record_registration();
    Ok(Json(SessionResponse { session_id }))
}

/// `POST /login`
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ApiError> {
    let request = credentials(body, "login")?;

    match state.accounts.login(&request.login, &request.password).await {
        Ok(session_id) => {
            state.metrics.record_login(true);
            Ok(Json(SessionResponse { session_id }))
        }
        Err(e) => {
            if let ApiError::Unauthorized(_) = e {
                state.metrics.record_login(false);
            }
            Err(e)
        }
    }
}
