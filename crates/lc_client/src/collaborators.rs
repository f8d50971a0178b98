//! Seams to services this crate does not own.

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::ClientError;

#[async_trait]
pub trait CaptchaProvider: Send + Sync {
    async fn captcha_token(&self) -> Result<String, ClientError>;
}

/// User-facing notification display.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Supplies the database passphrase.
pub trait PassphraseProvider: Send + Sync {
    fn passphrase(&self) -> Result<Zeroizing<Vec<u8>>, ClientError>;
}

/// Fixed captcha token, for headless clients and tests.
pub struct StaticCaptcha(pub String);

#[async_trait]
impl CaptchaProvider for StaticCaptcha {
    async fn captcha_token(&self) -> Result<String, ClientError> {
        Ok(self.0.clone())
    }
}

/// Writes notifications to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        tracing::info!(%body, "[notify] {title}");
    }
}

/// Reads the passphrase from an environment variable.
pub struct EnvPassphrase {
    pub var: String,
}

impl EnvPassphrase {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl PassphraseProvider for EnvPassphrase {
    fn passphrase(&self) -> Result<Zeroizing<Vec<u8>>, ClientError> {
        std::env::var(&self.var)
            .map(|s| Zeroizing::new(s.into_bytes()))
            .map_err(|_| ClientError::Collaborator(format!("{} is not set", self.var)))
    }
}
