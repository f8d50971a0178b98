//! lc_crypto: Lattice Contact cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; every primitive comes from an audited Rust crate.
//! - Secret material is zeroized on drop.
//! - Public APIs hand out raw encodings wrapped in newtypes, never library
//!   internals, so storage and wire layers stay primitive-agnostic.
//!
//! # Module layout
//! - `identity`   - ML-DSA-87 signing identity, public-key newtype, account id
//! - `kem`        - ML-KEM-1024 per-relationship key pairs
//! - `hash`       - SHAKE-128/256 helpers and BLAKE3 digests
//! - `admission`  - registration proof-of-work search and verification
//! - `aead`       - XChaCha20-Poly1305 encrypt/decrypt helpers (local vault)
//! - `kdf`        - Argon2id vault key derivation
//! - `error`      - unified error type

pub mod admission;
pub mod aead;
pub mod error;
pub mod hash;
pub mod identity;
pub mod kdf;
pub mod kem;

pub use admission::{AdmissionEvent, AdmissionOutcome, AdmissionProof, AdmissionSearch, CancelFlag};
pub use error::CryptoError;
pub use identity::{account_id_for, SignaturePublicKey, SigningIdentity};
pub use kem::RelationshipKeyPair;
