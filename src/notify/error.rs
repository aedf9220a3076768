//! Errors from webhook delivery.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook answered {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("webhook request timed out: {0}")]
    Timeout(String),
    #[error("could not reach webhook: {0}")]
    Network(String),
    #[error("invalid webhook configuration: {0}")]
    Config(String),
    #[error("webhook request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NotifyError::Timeout(err.to_string())
        } else if err.is_connect() {
            NotifyError::Network(err.to_string())
        } else if err.is_builder() {
            NotifyError::Config(err.to_string())
        } else {
            NotifyError::Other(err.to_string())
        }
    }
}
