//! # sealed-relay-types
//!
//! Wire format types for the sealed-relay protocol.
//!
//! Every frame on the wire is a JSON object with a mandatory `type` field.
//! This crate provides:
//! - [`Envelope`] - First-pass parse of an inbound frame (`type`, `token`)
//! - [`ClientMessage`] / [`MessageKind`] - Closed set of inbound requests
//! - [`ServerMessage`] - Responses sent back on the same connection
//! - [`ErrorCode`] - Failure taxonomy with fixed, non-leaking peer text

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod messages;

pub use envelope::Envelope;
pub use error::{ErrorCode, WireError};
pub use messages::{
    AuthRequest, AuthResponse, ClientMessage, DecryptionRequest, DecryptionResponse,
    EncryptedValueResponse, ErrorResponse, MessageKind, PublicKeyRegistration,
    RequestEncryptedValue, ServerMessage, Status,
};
