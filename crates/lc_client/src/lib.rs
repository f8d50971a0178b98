//! lc_client: client core for Lattice Contact
//!
//! Everything that needs the active identity receives an explicit
//! `SessionCache` handle; there is no global session.
//!
//! # Modules
//! - `session`       - single-slot cache of the active identity
//! - `api`           - signed and unsigned HTTP requests over a pluggable transport
//! - `account`       - account creation (admission + registration), load, profile updates
//! - `contacts`      - contact relationship state machine and its per-status view
//! - `channel`       - push channel: token minting, reconnects, inbound dispatch
//! - `collaborators` - captcha, notification and passphrase seams
//! - `config`        - endpoints, database path, timeouts

pub mod account;
pub mod api;
pub mod channel;
pub mod collaborators;
pub mod config;
pub mod contacts;
pub mod error;
pub mod session;

pub use account::{AccountService, NewAccount, RegistrationOutcome};
pub use api::{ApiClient, HttpTransport, ReqwestTransport};
pub use channel::{
    ChannelEvent, ChannelState, ContactDispatcher, DispatchOutcome, PushChannel, PushTransport,
    ReconnectPolicy, TokenProvider, WebSocketTransport,
};
pub use config::ClientConfig;
pub use contacts::{ContactEntry, ContactExchange, InboundDisposition};
pub use error::{ChannelError, ClientError};
pub use session::{SessionCache, SessionSnapshot, Signer};
