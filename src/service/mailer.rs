//! Outbound email seam.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::ReviewError;

/// Sends templated emails.
#[async_trait]
pub trait Mailer: Send + Sync + fmt::Debug {
    /// Renders `template` in `language` with `params` and sends it to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Delivery`] if the message is not accepted.
    async fn send(
        &self,
        template: &str,
        to: &str,
        language: &str,
        params: &serde_json::Value,
    ) -> Result<(), ReviewError>;
}

/// Mailer that writes each message to the log instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        template: &str,
        to: &str,
        language: &str,
        params: &serde_json::Value,
    ) -> Result<(), ReviewError> {
        tracing::info!(template, to, language, params = %params, "email sent");
        Ok(())
    }
}

/// One message captured by [`RecordingMailer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    /// Template name.
    pub template: String,
    /// Recipient address.
    pub to: String,
    /// Language code.
    pub language: String,
    /// Template parameters.
    pub params: serde_json::Value,
}

/// Mailer that keeps every message in memory, optionally failing.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    fail: bool,
}

impl RecordingMailer {
    /// Creates a mailer that accepts every message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mailer that rejects every message.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Messages accepted so far.
    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        template: &str,
        to: &str,
        language: &str,
        params: &serde_json::Value,
    ) -> Result<(), ReviewError> {
        if self.fail {
            return Err(ReviewError::Delivery(format!("mail to {to} rejected")));
        }
        self.sent.lock().await.push(SentMail {
            template: template.to_string(),
            to: to.to_string(),
            language: language.to_string(),
            params: params.clone(),
        });
        Ok(())
    }
}
