//! Application record and its stage machine.
//!
//! `transition` is the whole state machine: a pure function from the current
//! stage and an event to the next stage. `Application::apply` adds the checks
//! that need the record itself (a positive verdict before `Scheduled`) and keeps
//! the timestamped history.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::extraction::{DocumentFormat, ExtractionError};
use crate::models::candidate::CandidateContact;
use crate::models::role::Role;
use crate::models::verdict::Verdict;
use crate::notification::NotificationReceipt;
use crate::scheduling::{MeetingReference, PreferredWindow};

/// Pipeline step a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Assessment,
    Notification,
    Scheduling,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extraction => "extraction",
            Stage::Assessment => "assessment",
            Stage::Notification => "notification",
            Stage::Scheduling => "scheduling",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub stage: Stage,
    /// Stable reason code, e.g. `timeout` or `invalid-reference`.
    pub reason: String,
    pub detail: String,
}

impl Failure {
    pub fn new(stage: Stage, reason: &str, detail: impl fmt::Display) -> Self {
        Self {
            stage,
            reason: reason.to_string(),
            detail: detail.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApplicationStage {
    Received,
    TextReady,
    Analyzed,
    Notified,
    Scheduled,
    Failed(Failure),
}

impl ApplicationStage {
    pub fn label(&self) -> &'static str {
        match self {
            ApplicationStage::Received => "received",
            ApplicationStage::TextReady => "text_ready",
            ApplicationStage::Analyzed => "analyzed",
            ApplicationStage::Notified => "notified",
            ApplicationStage::Scheduled => "scheduled",
            ApplicationStage::Failed(_) => "failed",
        }
    }

    /// The step that runs next from this stage, if any.
    pub fn pending_step(&self) -> Option<Stage> {
        match self {
            ApplicationStage::Received => Some(Stage::Extraction),
            ApplicationStage::TextReady => Some(Stage::Assessment),
            ApplicationStage::Analyzed => Some(Stage::Notification),
            ApplicationStage::Notified => Some(Stage::Scheduling),
            ApplicationStage::Scheduled | ApplicationStage::Failed(_) => None,
        }
    }
}

impl fmt::Display for ApplicationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationStage::Failed(failure) => {
                write!(f, "failed({}, {})", failure.stage, failure.reason)
            }
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    TextExtracted,
    Assessed,
    Notified,
    Scheduled,
    Failed(Failure),
    /// Operator re-drive of a failed application.
    Redriven,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition from {from} on {event}")]
pub struct InvalidTransition {
    pub from: String,
    pub event: String,
}

impl InvalidTransition {
    fn new(from: &ApplicationStage, event: &StageEvent) -> Self {
        Self {
            from: from.to_string(),
            event: format!("{event:?}"),
        }
    }
}

/// Stage preceding the one that failed; where a re-drive resumes.
fn resume_point(stage: Stage) -> ApplicationStage {
    match stage {
        Stage::Extraction => ApplicationStage::Received,
        Stage::Assessment => ApplicationStage::TextReady,
        Stage::Notification => ApplicationStage::Analyzed,
        Stage::Scheduling => ApplicationStage::Notified,
    }
}

pub fn transition(
    current: &ApplicationStage,
    event: StageEvent,
) -> Result<ApplicationStage, InvalidTransition> {
    use ApplicationStage as S;

    let next = match (current, &event) {
        (S::Received, StageEvent::TextExtracted) => S::TextReady,
        (S::TextReady, StageEvent::Assessed) => S::Analyzed,
        (S::Analyzed, StageEvent::Notified) => S::Notified,
        (S::Notified, StageEvent::Scheduled) => S::Scheduled,
        (S::Failed(failure), StageEvent::Redriven) => resume_point(failure.stage),
        (stage, StageEvent::Failed(failure)) if stage.pending_step() == Some(failure.stage) => {
            S::Failed(failure.clone())
        }
        _ => return Err(InvalidTransition::new(current, &event)),
    };
    Ok(next)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub stage: String,
    pub at: DateTime<Utc>,
}

/// The uploaded resume as received.
#[derive(Debug, Clone)]
pub struct ResumeDocument {
    pub bytes: Bytes,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl ResumeDocument {
    pub fn new(bytes: impl Into<Bytes>, filename: Option<String>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename,
            content_type,
        }
    }

    pub fn plain_text(text: &str) -> Self {
        Self::new(
            Bytes::copy_from_slice(text.as_bytes()),
            Some("resume.txt".to_string()),
            Some("text/plain".to_string()),
        )
    }

    pub fn format(&self) -> Result<DocumentFormat, ExtractionError> {
        DocumentFormat::detect(self.filename.as_deref(), self.content_type.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct Application {
    pub id: Uuid,
    pub candidate: CandidateContact,
    pub role: Arc<Role>,
    pub document: ResumeDocument,
    pub window: PreferredWindow,
    pub resume_text: Option<String>,
    pub verdict: Option<Verdict>,
    /// Inference retries spent obtaining the verdict.
    pub assessment_retries: u32,
    pub notification: Option<NotificationReceipt>,
    pub meeting: Option<MeetingReference>,
    /// Outcome of the interview details email sent after booking.
    pub confirmation: Option<Result<NotificationReceipt, String>>,
    pub stage: ApplicationStage,
    pub history: Vec<StageTransition>,
    pub created_at: DateTime<Utc>,
}

impl Application {
    pub fn new(
        candidate: CandidateContact,
        role: Arc<Role>,
        document: ResumeDocument,
        window: PreferredWindow,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            candidate,
            role,
            document,
            window,
            resume_text: None,
            verdict: None,
            assessment_retries: 0,
            notification: None,
            meeting: None,
            confirmation: None,
            stage: ApplicationStage::Received,
            history: vec![StageTransition {
                stage: ApplicationStage::Received.label().to_string(),
                at: now,
            }],
            created_at: now,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.verdict.as_ref().is_some_and(Verdict::is_selected)
    }

    /// No further stage will run. A rejection ends at `Notified`.
    pub fn is_terminal(&self) -> bool {
        match self.stage {
            ApplicationStage::Scheduled | ApplicationStage::Failed(_) => true,
            ApplicationStage::Notified => !self.is_selected(),
            _ => false,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.stage {
            ApplicationStage::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn apply(&mut self, event: StageEvent) -> Result<&ApplicationStage, InvalidTransition> {
        if event == StageEvent::Scheduled && !self.is_selected() {
            return Err(InvalidTransition::new(&self.stage, &event));
        }
        self.stage = transition(&self.stage, event)?;
        self.history.push(StageTransition {
            stage: self.stage.to_string(),
            at: Utc::now(),
        });
        Ok(&self.stage)
    }
}
