//! Webhook client that reports hotkey triggers.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client as HttpClient, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::NotifyError;

/// JSON body posted to the webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub event: String,
    pub hotkey: String,
    /// RFC 3339 wall-clock time of the trigger, for the receiver's benefit only
    pub triggered_at: String,
}

impl Notification {
    pub fn hotkey_triggered(hotkey: impl Into<String>) -> Self {
        Self {
            event: "hotkey_triggered".to_string(),
            hotkey: hotkey.into(),
            triggered_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Posts notifications to one webhook URL
#[derive(Debug, Clone)]
pub struct Notifier {
    http: HttpClient,
    url: Url,
}

impl Notifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let url = Url::parse(url).map_err(|err| NotifyError::Config(format!("{url}: {err}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("quack-daemon/", env!("CARGO_PKG_VERSION"))),
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self { http, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Send one notification; non-2xx answers are errors
    pub async fn send(&self, notification: &Notification) -> Result<StatusCode, NotifyError> {
        let response = self
            .http
            .post(self.url.clone())
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        debug!(%status, url = %self.url, "webhook responded");
        if status.is_success() {
            Ok(status)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Http { status, body })
        }
    }
}
