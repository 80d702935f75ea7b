//! # VortexBox Server
//!
//! Companion server for VortexBox devices: accepts and serves configuration
//! and file payloads over HTTP(S) and protects itself with a rate limiter
//! whose state is shared between server processes through Redis.
//!
//! ## Quick Start
//!
//! ```bash
//! # Plaintext, Redis on localhost
//! vortexbox-server 0.0.0.0 8080
//!
//! # TLS terminated by the server
//! vortexbox-server 0.0.0.0 8443 --ssl-public-key cert.pem --ssl-private-key key.pem
//!
//! # No Redis: process-local limits, accounts and sessions
//! vortexbox-server 127.0.0.1 8080 --store memory
//!
//! # List all environment variables
//! vortexbox-server --list-env-vars
//! ```
//!
//! ## How Admission Works
//!
//! Every request except `GET /health` is counted against its client's
//! fixed window before it reaches a handler:
//! - The first request of a window creates a counter that expires after
//!   one period
//! - Each request increments it; above the limit the answer is
//!   `429 Too Many Requests` with a `Retry-After` header
//! - The increment and the expiry are one atomic store operation, so any
//!   number of server processes share one limit without coordinating
//!
//! If the store is down the server either keeps admitting (fail-open, the
//! default) or answers `503` (fail-closed).
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────┐      ┌──────────────┐
//!        │ HttpTransport│      │ TlsTransport │
//!        └──────┬───────┘      └──────┬───────┘
//!               └──────────┬──────────┘
//!                    ┌─────▼─────┐
//!                    │ admission │──────────┐
//!                    └─────┬─────┘          │
//!          ┌───────────────┼──────────┐     │
//!     ┌────▼───┐     ┌─────▼────┐     │ ┌───▼──────────┐
//!     │ upload │     │ accounts │     │ │ CounterStore │
//!     └────────┘     └─────┬────┘     │ │ Redis/actor  │
//!                    ┌─────▼────────┐ │ └──────────────┘
//!                    │ AccountStore │◄┘
//!                    └──────────────┘
//! ```

pub mod accounts;
pub mod actor;
pub mod admission;
pub mod config;
pub mod error;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod transport;
pub mod types;
pub mod upload;

#[cfg(test)]
mod actor_tests;

pub use server::Server;
