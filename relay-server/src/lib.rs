//! # sealed-relay-server
//!
//! Authenticated encrypted relay over WebSocket.
//!
//! This crate implements a relay server that:
//! - Authenticates peers against a persisted credential store
//! - Issues session tokens bound to the connection that authenticated
//! - Fetches an external datum and protects it under a server-wide AES-256-GCM key
//! - Transcodes protected values into RSA-OAEP envelopes for a peer's public key
//! - Never puts plaintext on the wire
//!
//! ## Architecture
//!
//! ```text
//! Peer A ──┐                         ┌── Peer B
//!          │   WebSocket (JSON)      │
//!          ├────────────────────────►│
//!      ┌───┴─────────────────────────┴───┐
//!      │          sealed-relay           │
//!      │  Dispatcher ─► SessionTable     │
//!      │      │                          │
//!      │      ├─► CredentialStore (JSON) │
//!      │      ├─► DataSource (HTTP)      │
//!      │      └─► ProtectionUnit / RSA   │
//!      └─────────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! Every frame is a JSON object with a `type`:
//! - AuthRequest → AuthResponse (session token)
//! - RequestEncryptedValue → EncryptedValueResponse
//! - DecryptionRequest → DecryptionResponse
//! - PublicKeyRegistration → Status
//!
//! Failures come back as `Error` with a fixed code and message.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleanup;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod limits;
pub mod protocol;
pub mod server;
pub mod session;
pub mod source;
