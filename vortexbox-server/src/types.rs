//! Common types used across the server
//!
//! This module defines the client identity used as the rate limit key and
//! the JSON shapes exchanged with VortexBox clients.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

pub use vortexbox_limiter::{Decision, Quota, WindowState};

/// Who a request is counted against
///
/// Two distinct legitimate clients never map to the same identity within
/// the configured granularity: addresses are compared in canonical form and
/// account logins live in their own key namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientIdentity {
    /// The client's network address
    Ip(IpAddr),
    /// A logged-in account, when limits are keyed by session
    Account(String),
    /// No address was available (only in embedded/test setups)
    Unknown,
}

impl ClientIdentity {
    /// Identity for a socket peer address
    ///
    /// IPv4-mapped IPv6 addresses are folded into plain IPv4 so a dual-stack
    /// listener does not give one client two windows.
    pub fn from_ip(ip: IpAddr) -> Self {
        ClientIdentity::Ip(ip.to_canonical())
    }

    /// Store key for this identity's rate window
    ///
    /// # Example
    ///
    /// ```
    /// use vortexbox_server::types::ClientIdentity;
    ///
    /// let id = ClientIdentity::Account("alice".to_string());
    /// assert_eq!(id.store_key("vortexbox"), "vortexbox:rl:user:alice");
    /// ```
    pub fn store_key(&self, prefix: &str) -> String {
        format!("{prefix}:rl:{self}")
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientIdentity::Ip(ip) => write!(f, "ip:{ip}"),
            ClientIdentity::Account(login) => write!(f, "user:{login}"),
            ClientIdentity::Unknown => write!(f, "unknown"),
        }
    }
}

/// A stored upload
///
/// The content itself lives on disk next to a JSON copy of this record.
///
/// ```json
/// {
///   "id": "6f1c1f4e-8a55-4a3b-9d1e-3b2a0f0d6c11",
///   "filename": "device-config.json",
///   "size": 2048,
///   "uploaded_at": 1760000000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadArtifact {
    /// Server-assigned identifier
    pub id: Uuid,
    /// Sanitized client filename
    pub filename: String,
    /// Content length in bytes
    pub size: u64,
    /// Unix timestamp (seconds) of the upload
    pub uploaded_at: u64,
}

/// Body of `POST /register` and `POST /login`
///
/// `type` must be `"reg"` for registration and `"login"` for login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub login: String,
    pub password: String,
}

/// Successful registration or login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
}
