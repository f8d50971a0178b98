//! Registration admission puzzle.
//!
//! Before the server accepts a new account, the client must find a nonce
//! such that
//!
//! ```text
//! hash = lowercase(base64(SHAKE128(public_key_b64 || nonce)))
//! ```
//!
//! starts with the literal text `"000"`. The check is on characters of the
//! encoded hash, not on leading zero bits, so the expected cost is 64^3
//! attempts. The proof depends only on the public key and the nonce, so any
//! receiver can recompute it.
//!
//! The search is CPU-bound and synchronous. Callers run it on a blocking
//! worker and observe progress through a callback; cancellation is
//! cooperative and checked before every attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;

use crate::hash::shake128_str;

pub const ADMISSION_PREFIX: &str = "000";
/// Attempts between two progress reports.
pub const PROGRESS_EVERY: u64 = 100;
pub const MAX_ATTEMPTS: u64 = 10_000_000;

/// A solved puzzle: the nonce and the encoded hash it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionProof {
    pub nonce: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionEvent {
    Progress { attempts: u64, nonce: String, hash: String },
    Solved { attempts: u64 },
    Exhausted { attempts: u64 },
    Cancelled { attempts: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Solved(AdmissionProof),
    Exhausted,
    Cancelled,
}

/// Cooperative cancellation handle shared between the caller and the worker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Compute the puzzle hash for a nonce.
pub fn puzzle_hash(public_key_b64: &str, nonce: &str) -> String {
    let mut input = String::with_capacity(public_key_b64.len() + nonce.len());
    input.push_str(public_key_b64);
    input.push_str(nonce);
    STANDARD.encode(shake128_str(&input)).to_lowercase()
}

/// Verify a proof against the production difficulty.
pub fn verify_admission(public_key_b64: &str, proof: &AdmissionProof) -> bool {
    AdmissionSearch::default().verify(public_key_b64, proof)
}

#[derive(Debug, Clone)]
pub struct AdmissionSearch {
    prefix: String,
    max_attempts: u64,
    progress_every: u64,
}

impl Default for AdmissionSearch {
    fn default() -> Self {
        Self {
            prefix: ADMISSION_PREFIX.to_string(),
            max_attempts: MAX_ATTEMPTS,
            progress_every: PROGRESS_EVERY,
        }
    }
}

impl AdmissionSearch {
    /// Override the required text prefix. Only lowers the cost in tests.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn run(
        &self,
        public_key_b64: &str,
        cancel: &CancelFlag,
        observer: &mut dyn FnMut(AdmissionEvent),
    ) -> AdmissionOutcome {
        let mut rng = rand::rngs::OsRng;
        let every = self.progress_every.max(1);

        for attempt in 0..self.max_attempts {
            if cancel.is_cancelled() {
                observer(AdmissionEvent::Cancelled { attempts: attempt });
                return AdmissionOutcome::Cancelled;
            }

            let nonce = format!("{:X}", rng.next_u32());
            let hash = puzzle_hash(public_key_b64, &nonce);

            if attempt % every == 0 {
                observer(AdmissionEvent::Progress {
                    attempts: attempt,
                    nonce: nonce.clone(),
                    hash: hash.clone(),
                });
            }

            if hash.starts_with(&self.prefix) {
                observer(AdmissionEvent::Solved { attempts: attempt + 1 });
                return AdmissionOutcome::Solved(AdmissionProof { nonce, hash });
            }
        }

        observer(AdmissionEvent::Exhausted { attempts: self.max_attempts });
        AdmissionOutcome::Exhausted
    }

    pub fn verify(&self, public_key_b64: &str, proof: &AdmissionProof) -> bool {
        proof.hash.starts_with(&self.prefix) && puzzle_hash(public_key_b64, &proof.nonce) == proof.hash
    }
}
