//! HTTP relay transport: hands each notification to an external gateway that owns the
//! actual email / WhatsApp providers.

use std::time::Duration;

use async_trait::async_trait;
use casetrack_core::config::RelayConfig;
use casetrack_core::notifications::{DeliveryError, DeliveryTransport};
use casetrack_core::Notification;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    notification_id: &'a str,
    complaint_id: &'a str,
    channel: &'a str,
    destination: &'a str,
    body: &'a str,
}

pub struct HttpRelayTransport {
    client: Client,
    url: String,
    token: Option<SecretString>,
}

impl HttpRelayTransport {
    pub fn new(url: String, token: Option<SecretString>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url, token })
    }

    /// `None` when no relay URL is configured.
    pub fn from_config(config: &RelayConfig) -> Result<Option<Self>, reqwest::Error> {
        let Some(url) = config.url.clone() else {
            return Ok(None);
        };
        Self::new(url, config.token.clone(), Duration::from_secs(config.timeout_secs)).map(Some)
    }
}

#[async_trait]
impl DeliveryTransport for HttpRelayTransport {
    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let message = RelayMessage {
            notification_id: &notification.id.0,
            complaint_id: &notification.complaint_id.0,
            channel: notification.channel.as_str(),
            destination: &notification.destination,
            body: &notification.body,
        };

        let mut request = self.client.post(&self.url).json(&message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|error| {
            if error.is_builder() {
                DeliveryError::Permanent(format!("relay request could not be built: {error}"))
            } else {
                DeliveryError::Transient(format!("relay unreachable: {error}"))
            }
        })?;
        classify_status(response.status())
    }
}

/// 5xx, 408 and 429 are worth retrying; any other non-success status means the relay
/// rejected the message itself.
pub fn classify_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        return Ok(());
    }
    let retryable = status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS;
    if retryable {
        Err(DeliveryError::Transient(format!("relay returned {status}")))
    } else {
        Err(DeliveryError::Permanent(format!("relay rejected message with {status}")))
    }
}
