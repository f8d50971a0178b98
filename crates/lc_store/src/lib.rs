//! lc_store: local persistence for Lattice Contact
//!
//! # Contract
//! Services depend only on `RecordStore<R>`: save / get / update / get_all /
//! delete keyed by a natural identifier (account id, contact id). Two
//! implementations ship here:
//! - `MemoryStore`: ordered map under a lock, for tests and ephemeral clients.
//! - `SqliteStore`: SQLite via sqlx with application-level encryption.
//!
//! # Encryption strategy
//! SQLite does NOT encrypt. Secret key material (the ML-DSA private key and
//! each relationship's ML-KEM secret) is stored as XChaCha20-Poly1305
//! ciphertext under the vault key. The vault key is derived from a
//! passphrase with Argon2id and a per-database salt kept in the `meta` table.
//! Profile fields and public keys are stored in plaintext.

pub mod db;
pub mod error;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod record;
pub mod vault;

pub use db::SqliteStore;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::{AccountRecord, ContactRecord, ContactStatus, SeenHandshake};
pub use record::{Record, RecordStore};
pub use vault::Vault;
