//! Notification Dispatcher: composes the candidate email for a verdict and
//! hands it to the email transport.
//!
//! Composition is pure (`compose_*`); delivery is one transport attempt bounded
//! by a timeout. House style: all lowercase, no personal signature.

pub mod smtp;
pub mod transport;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::candidate::CandidateContact;
use crate::models::role::Role;
use crate::models::verdict::{Decision, Verdict};
use crate::notification::transport::{EmailMessage, EmailTransport, TransportError};
use crate::scheduling::MeetingReference;

const SIGNATURE: &str = "best,\nthe ai recruiting team";
/// Candidates are asked to join this many minutes before the start time.
const JOIN_EARLY_MINUTES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Selection,
    Rejection,
    InterviewConfirmation,
}

impl TemplateKind {
    pub fn for_decision(decision: Decision) -> Self {
        match decision {
            Decision::Selected => TemplateKind::Selection,
            Decision::Rejected => TemplateKind::Rejection,
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TemplateKind::Selection => "selection",
            TemplateKind::Rejection => "rejection",
            TemplateKind::InterviewConfirmation => "interview_confirmation",
        })
    }
}

/// Proof that a message was accepted by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub kind: TemplateKind,
    pub recipient: String,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
}

pub type NotificationResult = Result<NotificationReceipt, TransportError>;

/// Who the emails come from.
#[derive(Debug, Clone)]
pub struct SenderIdentity {
    pub address: String,
    pub company_name: String,
}

// ────────────────────────────────────────────
// Composition
// ────────────────────────────────────────────

fn envelope(sender: &SenderIdentity, to: &CandidateContact, subject: String, body: String) -> EmailMessage {
    EmailMessage {
        from: sender.address.clone(),
        from_name: sender.company_name.clone(),
        to: to.email.clone(),
        subject,
        body,
    }
}

pub fn compose_selection(sender: &SenderIdentity, candidate: &CandidateContact, role: &Role) -> EmailMessage {
    let role_title = role.title.to_lowercase();
    let company = sender.company_name.to_lowercase();
    let body = format!(
        "hi {name},\n\n\
         congratulations! after reviewing your resume, we'd love to move you forward for the \
         {role_title} position at {company}.\n\n\
         next steps: a technical interview with our engineering team. you'll receive a separate \
         email with the interview details and a meeting link shortly.\n\n\
         {SIGNATURE}",
        name = candidate.greeting_name(),
    );
    envelope(
        sender,
        candidate,
        format!("your application for {role_title} at {company}"),
        body,
    )
}

pub fn compose_rejection(
    sender: &SenderIdentity,
    candidate: &CandidateContact,
    verdict: &Verdict,
    role: &Role,
) -> EmailMessage {
    let role_title = role.title.to_lowercase();
    let company = sender.company_name.to_lowercase();

    let mut body = format!(
        "hi {name},\n\n\
         thanks for applying for the {role_title} position at {company}. we won't be moving \
         forward with your application this time.",
        name = candidate.greeting_name(),
    );

    let rationale = verdict.rationale.trim();
    if !rationale.is_empty() {
        body.push_str("\n\nhere's what we saw: ");
        body.push_str(&rationale.to_lowercase());
    }

    let missing = &verdict.attributes.missing_skills;
    if !missing.is_empty() {
        body.push_str("\n\nif you want to strengthen a future application, these are worth investing in:\n");
        let suggestions: Vec<String> = missing
            .iter()
            .map(|skill| format!("- {}", skill.to_lowercase()))
            .collect();
        body.push_str(&suggestions.join("\n"));
    }

    body.push_str("\n\nkeep building, and please do apply again once you've had a chance to upskill.\n\n");
    body.push_str(SIGNATURE);

    envelope(
        sender,
        candidate,
        format!("your application for {role_title} at {company}"),
        body,
    )
}

pub fn compose_interview_confirmation(
    sender: &SenderIdentity,
    candidate: &CandidateContact,
    role: &Role,
    meeting: &MeetingReference,
    utc_offset: FixedOffset,
) -> EmailMessage {
    let role_title = role.title.to_lowercase();
    let local = meeting.start_time.with_timezone(&utc_offset);
    let when = local.format("%A, %B %-d, %Y at %H:%M (UTC%:z)").to_string().to_lowercase();
    let body = format!(
        "hi {name},\n\n\
         your technical interview for the {role_title} position is booked.\n\n\
         when: {when}\n\
         join link: {link}\n\n\
         please join {JOIN_EARLY_MINUTES} minutes early so we can start on time. the interview is \
         about an hour and covers your experience and a technical discussion.\n\n\
         {SIGNATURE}",
        name = candidate.greeting_name(),
        link = meeting.join_url,
    );
    envelope(sender, candidate, format!("interview details: {role_title}"), body)
}

// ────────────────────────────────────────────
// Dispatch
// ────────────────────────────────────────────

pub struct NotificationDispatcher {
    transport: Arc<dyn EmailTransport>,
    sender: SenderIdentity,
    timeout: Duration,
    utc_offset: FixedOffset,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn EmailTransport>,
        sender: SenderIdentity,
        timeout: Duration,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            transport,
            sender,
            timeout,
            utc_offset,
        }
    }

    /// Sends the selection or rejection email for `verdict`. One attempt.
    pub async fn notify(
        &self,
        candidate: &CandidateContact,
        verdict: &Verdict,
        role: &Role,
    ) -> NotificationResult {
        let kind = TemplateKind::for_decision(verdict.decision);
        let message = match kind {
            TemplateKind::Selection => compose_selection(&self.sender, candidate, role),
            _ => compose_rejection(&self.sender, candidate, verdict, role),
        };
        self.deliver(kind, message).await
    }

    /// Sends the meeting details once an interview is booked.
    pub async fn confirm_interview(
        &self,
        candidate: &CandidateContact,
        role: &Role,
        meeting: &MeetingReference,
    ) -> NotificationResult {
        let message =
            compose_interview_confirmation(&self.sender, candidate, role, meeting, self.utc_offset);
        self.deliver(TemplateKind::InterviewConfirmation, message).await
    }

    async fn deliver(&self, kind: TemplateKind, message: EmailMessage) -> NotificationResult {
        match tokio::time::timeout(self.timeout, self.transport.send(&message)).await {
            Ok(Ok(())) => {
                debug!(to = %message.to, %kind, "email sent");
                Ok(NotificationReceipt {
                    kind,
                    recipient: message.to,
                    subject: message.subject,
                    sent_at: Utc::now(),
                })
            }
            Ok(Err(e)) => {
                warn!(to = %message.to, %kind, "email delivery failed: {e}");
                Err(e)
            }
            Err(_) => {
                warn!(to = %message.to, %kind, "email delivery timed out");
                Err(TransportError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }
}
