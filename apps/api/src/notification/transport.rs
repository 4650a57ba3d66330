//! Email transport collaborator.
//!
//! SMTP delivery lives in `smtp`. `HttpEmailTransport` is the alternative for
//! deployments behind a JSON mail relay authenticated with a pre-shared key.
//! A single attempt per message; callers decide whether to try again.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// A fully composed email, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub from_name: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("recipient or message rejected: {0}")]
    Rejected(String),

    #[error("email transport rejected credentials: {0}")]
    Unauthorized(String),

    #[error("email transport unreachable: {0}")]
    Network(String),

    #[error("email transport did not answer within {0}ms")]
    Timeout(u64),
}

impl TransportError {
    pub fn reason(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "timeout",
            _ => "transport",
        }
    }
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError>;
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    from_name: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[derive(Clone)]
pub struct HttpEmailTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpEmailTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&RelayRequest {
                from: &message.from,
                from_name: &message.from_name,
                to: &message.to,
                subject: &message.subject,
                text: &message.body,
            })
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(to = %message.to, "email accepted by relay ({})", status);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = format!("status {}: {}", status.as_u16(), body.trim());
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Unauthorized(detail),
            s if s.is_client_error() => TransportError::Rejected(detail),
            _ => TransportError::Network(detail),
        })
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            from: "hiring@example.com".to_string(),
            from_name: "Acme".to_string(),
            to: "jane@example.com".to_string(),
            subject: "hello".to_string(),
            body: "body".to_string(),
        }
    }

    async fn transport_against(
        status: usize,
        body: &str,
    ) -> (mockito::ServerGuard, mockito::Mock, HttpEmailTransport) {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/send")
            .with_status(status)
            .with_body(body)
            .create_async()
            .await;
        let transport =
            HttpEmailTransport::new(format!("{}/send", server.url()), "key", Duration::from_secs(5))
                .unwrap();
        (server, mock, transport)
    }

    #[tokio::test]
    async fn test_send_posts_relay_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/send")
            .match_header("authorization", "Bearer key")
            .match_body(Matcher::Json(json!({
                "from": "hiring@example.com",
                "from_name": "Acme",
                "to": "jane@example.com",
                "subject": "hello",
                "text": "body"
            })))
            .with_status(202)
            .create_async()
            .await;

        let transport =
            HttpEmailTransport::new(format!("{}/send", server.url()), "key", Duration::from_secs(5))
                .unwrap();
        transport.send(&message()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_failure_is_unauthorized() {
        let (_server, _mock, transport) = transport_against(401, "bad key").await;
        let err = transport.send(&message()).await.unwrap_err();
        assert!(matches!(err, TransportError::Unauthorized(_)));
        assert_eq!(err.reason(), "transport");
    }

    #[tokio::test]
    async fn test_bad_recipient_is_rejected() {
        let (_server, _mock, transport) = transport_against(422, "invalid recipient").await;
        let err = transport.send(&message()).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Rejected("status 422: invalid recipient".to_string())
        );
    }

    #[tokio::test]
    async fn test_relay_outage_is_network_error() {
        let (_server, _mock, transport) = transport_against(502, "").await;
        let err = transport.send(&message()).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
    }
}
