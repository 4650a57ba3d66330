//! SMTP delivery: authenticated submission as the sender's mailbox with an
//! app passkey. Port 465 uses implicit TLS, every other port STARTTLS.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::notification::transport::{EmailMessage, EmailTransport, TransportError};

const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Clone)]
pub struct SmtpEmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    timeout: Duration,
}

impl SmtpEmailTransport {
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        passkey: &str,
        timeout: Duration,
    ) -> Result<Self, lettre::transport::smtp::Error> {
        let builder = if port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
        };
        let mailer = builder
            .port(port)
            .credentials(Credentials::new(username.to_string(), passkey.to_string()))
            .timeout(Some(timeout))
            .build();
        Ok(Self { mailer, timeout })
    }
}

/// Builds the wire message. Bad addresses are the caller's fault, not the server's.
fn build_message(message: &EmailMessage) -> Result<Message, TransportError> {
    let from: Address = message
        .from
        .parse()
        .map_err(|e| TransportError::Rejected(format!("sender {:?}: {e}", message.from)))?;
    let to: Address = message
        .to
        .parse()
        .map_err(|e| TransportError::Rejected(format!("recipient {:?}: {e}", message.to)))?;

    Message::builder()
        .from(Mailbox::new(Some(message.from_name.clone()), from))
        .to(Mailbox::new(None, to))
        .subject(message.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(message.body.clone())
        .map_err(|e| TransportError::Rejected(e.to_string()))
}

/// Maps an SMTP failure onto the transport error kinds. `code` is the
/// three-digit reply code when the server answered at all.
fn classify(code: Option<u16>, timed_out: bool, detail: String, timeout: Duration) -> TransportError {
    if timed_out {
        return TransportError::Timeout(timeout.as_millis() as u64);
    }
    match code {
        // 530 auth required, 534/535 credentials refused
        Some(530 | 534 | 535) => TransportError::Unauthorized(detail),
        Some(550..=559) => TransportError::Rejected(detail),
        _ => TransportError::Network(detail),
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError> {
        let email = build_message(message)?;
        match self.mailer.send(email).await {
            Ok(response) => {
                debug!(to = %message.to, "email accepted by smtp server ({})", response.code());
                Ok(())
            }
            Err(e) => {
                let code = e.status().and_then(|code| code.to_string().parse().ok());
                Err(classify(code, e.is_timeout(), e.to_string(), self.timeout))
            }
        }
    }
}
