//! lc_proto: wire types, canonical encoding and signed envelopes for Lattice Contact
//!
//! Signed payloads travel as canonical binary (bincode) with a detached
//! ML-DSA-87 signature. Non-sensitive queries and directory records are JSON.
//!
//! # Modules
//! - `codec`     - canonical binary encoding shared by signers and verifiers
//! - `envelope`  - `SignedRequest<T>`, verification and the freshness window
//! - `handshake` - contact handshake payload and its self-certifying checks
//! - `api`       - request payloads, directory record, route names
//! - `channel`   - push-channel frames, contact hub messages, channel token

pub mod api;
pub mod channel;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod handshake;

pub use envelope::{is_fresh, now_unix, verify_envelope, EnvelopeError, SignedRequest, Timestamped};
pub use error::ProtoError;
pub use handshake::HandshakePayload;
