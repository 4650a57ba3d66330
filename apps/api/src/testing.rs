//! Shared fixtures and scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::llm_client::{InferenceClient, InferenceError, InferenceRequest};
use crate::models::candidate::CandidateContact;
use crate::models::role::Role;
use crate::notification::transport::{EmailMessage, EmailTransport, TransportError};
use crate::scheduling::{
    MeetingReference, MeetingRequest, MeetingService, PreferredWindow, ScheduleError, ScheduleResult,
};

pub fn backend_role() -> Role {
    Role {
        id: "backend_engineer".to_string(),
        title: "Backend Engineer".to_string(),
        requirements: vec!["REST APIs".to_string(), "Docker".to_string()],
    }
}

/// The evening before the fixture window.
pub fn before_window() -> DateTime<Utc> {
    "2026-10-13T15:00:00Z".parse().unwrap()
}

pub fn candidate() -> CandidateContact {
    CandidateContact::new(Some("Jane Doe".to_string()), "jane@example.com")
}

/// Wednesday 2026-10-14, starts between 11:00 and 16:00 IST.
pub fn window() -> PreferredWindow {
    let start: DateTime<Utc> = "2026-10-14T05:30:00Z".parse().unwrap();
    let end: DateTime<Utc> = "2026-10-14T10:30:00Z".parse().unwrap();
    PreferredWindow::new(start, end, 60).unwrap()
}

// ────────────────────────────────────────────
// Inference
// ────────────────────────────────────────────

/// Replays a fixed script of inference results, one per call.
pub struct ScriptedInference {
    script: Mutex<VecDeque<Result<String, InferenceError>>>,
    hang_remaining: AtomicU32,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedInference {
    pub fn new(script: Vec<Result<String, InferenceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            hang_remaining: AtomicU32::new(0),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// The first `n` calls never resolve.
    pub fn hang_first(self, n: u32) -> Self {
        self.hang_remaining.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        let hang = self
            .hang_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hang {
            std::future::pending::<()>().await;
        }

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(InferenceError::Permanent("script exhausted".to_string())))
    }
}

// ────────────────────────────────────────────
// Email
// ────────────────────────────────────────────

/// Records accepted messages. `failing` and `failing_after` make sends error.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<EmailMessage>>,
    failure: Option<TransportError>,
    fail_after: Option<usize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: TransportError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Accepts the first `n` messages, then fails with `error`.
    pub fn failing_after(n: usize, error: TransportError) -> Self {
        Self {
            failure: Some(error),
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError> {
        let mut sent = self.sent.lock().unwrap();
        if let Some(error) = &self.failure {
            if self.fail_after.map_or(true, |n| sent.len() >= n) {
                return Err(error.clone());
            }
        }
        sent.push(message.clone());
        Ok(())
    }
}

// ────────────────────────────────────────────
// Scheduling
// ────────────────────────────────────────────

enum MeetingBehaviour {
    Succeed,
    Link(String),
    FailOnce(ScheduleError),
    Hang,
}

/// Meeting service that books at the requested start time.
pub struct FakeMeetingService {
    behaviour: MeetingBehaviour,
    requests: Mutex<Vec<MeetingRequest>>,
}

impl FakeMeetingService {
    fn with(behaviour: MeetingBehaviour) -> Self {
        Self {
            behaviour,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::with(MeetingBehaviour::Succeed)
    }

    pub fn returning_link(link: &str) -> Self {
        Self::with(MeetingBehaviour::Link(link.to_string()))
    }

    /// Fails the first request, books every later one.
    pub fn failing_once(error: ScheduleError) -> Self {
        Self::with(MeetingBehaviour::FailOnce(error))
    }

    pub fn hanging() -> Self {
        Self::with(MeetingBehaviour::Hang)
    }

    pub fn requests(&self) -> Vec<MeetingRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MeetingService for FakeMeetingService {
    async fn create_meeting(&self, request: &MeetingRequest) -> ScheduleResult {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };

        let join_url = match &self.behaviour {
            MeetingBehaviour::Succeed => format!("https://zoom.us/j/{}", 1000 + count),
            MeetingBehaviour::Link(link) => link.clone(),
            MeetingBehaviour::FailOnce(error) if count == 1 => return Err(error.clone()),
            MeetingBehaviour::FailOnce(_) => format!("https://zoom.us/j/{}", 1000 + count),
            MeetingBehaviour::Hang => std::future::pending().await,
        };

        Ok(MeetingReference {
            meeting_id: Some((1000 + count).to_string()),
            join_url,
            start_time: request.start_time,
        })
    }
}
