//! Decision Orchestrator: drives one Application through the stages.
//!
//! Every stage runs at most once per `advance`. Failures become
//! `Failed(stage, reason)` and are never retried here; a re-drive resumes from
//! the stage before the failure so side effects that already happened (an
//! email that went out) are not repeated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::assessment::AssessmentEngine;
use crate::extraction;
use crate::models::candidate::CandidateContact;
use crate::models::verdict::Decision;
use crate::notification::{NotificationDispatcher, NotificationReceipt};
use crate::pipeline::application::{
    Application, ApplicationStage, Failure, InvalidTransition, ResumeDocument, Stage, StageEvent,
};
use crate::roles::{RoleRegistry, UnknownRole};
use crate::scheduling::{InterviewHours, InterviewScheduler, MeetingReference, PreferredWindow};

/// Result of a single `advance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub stage: ApplicationStage,
    pub terminal: bool,
}

/// Where an application ended up after `run` or `redrive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub application_id: Uuid,
    pub stage: ApplicationStage,
    pub decision: Option<Decision>,
    /// Present whenever the decision email went out, including when a later
    /// stage failed.
    pub notified: Option<NotificationReceipt>,
    pub meeting: Option<MeetingReference>,
    pub confirmation: Option<Result<NotificationReceipt, String>>,
}

impl PipelineOutcome {
    fn of(app: &Application) -> Self {
        Self {
            application_id: app.id,
            stage: app.stage.clone(),
            decision: app.verdict.as_ref().map(|v| v.decision),
            notified: app.notification.clone(),
            meeting: app.meeting.clone(),
            confirmation: app.confirmation.clone(),
        }
    }

    /// The candidate was told the outcome but a later stage failed.
    pub fn is_partial_failure(&self) -> bool {
        matches!(self.stage, ApplicationStage::Failed(_)) && self.notified.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedriveError {
    #[error("only failed applications can be re-driven (current stage: {0})")]
    NotFailed(String),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

pub struct Orchestrator {
    registry: Arc<RoleRegistry>,
    engine: AssessmentEngine,
    dispatcher: NotificationDispatcher,
    scheduler: InterviewScheduler,
    hours: InterviewHours,
    clock: fn() -> DateTime<Utc>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<RoleRegistry>,
        engine: AssessmentEngine,
        dispatcher: NotificationDispatcher,
        scheduler: InterviewScheduler,
        hours: InterviewHours,
    ) -> Self {
        Self {
            registry,
            engine,
            dispatcher,
            scheduler,
            hours,
            clock: Utc::now,
        }
    }

    /// Replaces the wall clock used for interview windows.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    /// Default interview window for an application opened now.
    pub fn next_window(&self) -> PreferredWindow {
        PreferredWindow::next_business_day((self.clock)(), &self.hours)
    }

    /// Creates an application in `Received`. Every call yields a new,
    /// independent application even for a repeated candidate/role pair.
    pub fn open(
        &self,
        candidate: CandidateContact,
        role_id: &str,
        document: ResumeDocument,
        window: PreferredWindow,
    ) -> Result<Application, UnknownRole> {
        let role = self.registry.get(role_id)?;
        let app = Application::new(candidate, role, document, window);
        info!(
            application = %app.id,
            role = %app.role.id,
            candidate = %app.candidate.email,
            "application received"
        );
        Ok(app)
    }

    /// Runs exactly the next stage. A terminal application is left untouched.
    pub async fn advance(&self, app: &mut Application) -> StepOutcome {
        if !app.is_terminal() {
            if let Some(event) = self.run_step(app).await {
                if let Err(e) = app.apply(event) {
                    error!(application = %app.id, "{e}");
                }
                self.log_stage(app);
            }
        }
        StepOutcome {
            stage: app.stage.clone(),
            terminal: app.is_terminal(),
        }
    }

    /// Advances until the application is terminal.
    pub async fn run(&self, app: &mut Application) -> PipelineOutcome {
        self.run_observed(app, |_| {}).await
    }

    /// `run`, calling `observe` after every stage change.
    pub async fn run_observed<F>(&self, app: &mut Application, observe: F) -> PipelineOutcome
    where
        F: Fn(&Application) + Send + Sync,
    {
        while !app.is_terminal() {
            let before = app.stage.clone();
            self.advance(app).await;
            observe(app);
            if app.stage == before {
                break;
            }
        }
        let outcome = PipelineOutcome::of(app);
        if outcome.is_partial_failure() {
            warn!(
                application = %app.id,
                "candidate was notified but the pipeline failed afterwards: {}",
                app.stage
            );
        }
        outcome
    }

    /// Resumes a failed application from the stage preceding the failure.
    pub async fn redrive(&self, app: &mut Application) -> Result<PipelineOutcome, RedriveError> {
        self.redrive_observed(app, |_| {}).await
    }

    pub async fn redrive_observed<F>(
        &self,
        app: &mut Application,
        observe: F,
    ) -> Result<PipelineOutcome, RedriveError>
    where
        F: Fn(&Application) + Send + Sync,
    {
        if !matches!(app.stage, ApplicationStage::Failed(_)) {
            return Err(RedriveError::NotFailed(app.stage.to_string()));
        }
        let failed = app.stage.clone();
        app.apply(StageEvent::Redriven)?;
        info!(application = %app.id, "re-driving from {} (was {})", app.stage, failed);
        observe(app);
        Ok(self.run_observed(app, observe).await)
    }

    async fn run_step(&self, app: &mut Application) -> Option<StageEvent> {
        let event = match app.stage.pending_step()? {
            Stage::Extraction => self.extract(app),
            Stage::Assessment => self.assess(app).await,
            Stage::Notification => self.notify(app).await,
            Stage::Scheduling => self.schedule(app).await,
        };
        Some(event)
    }

    fn extract(&self, app: &mut Application) -> StageEvent {
        let text = app
            .document
            .format()
            .and_then(|format| extraction::extract(&app.document.bytes, format));
        match text {
            Ok(text) => {
                app.resume_text = Some(text);
                StageEvent::TextExtracted
            }
            Err(e) => StageEvent::Failed(Failure::new(Stage::Extraction, e.reason(), &e)),
        }
    }

    async fn assess(&self, app: &mut Application) -> StageEvent {
        let Some(text) = app.resume_text.as_deref() else {
            return StageEvent::Failed(Failure::new(
                Stage::Assessment,
                "empty",
                "no extracted text to assess",
            ));
        };
        match self.engine.assess(text, &app.role).await {
            Ok(assessment) => {
                info!(
                    application = %app.id,
                    decision = %assessment.verdict.decision,
                    retries = assessment.retries,
                    "assessment complete"
                );
                app.assessment_retries = assessment.retries;
                app.verdict = Some(assessment.verdict);
                StageEvent::Assessed
            }
            Err(e) => StageEvent::Failed(Failure::new(Stage::Assessment, e.reason(), &e)),
        }
    }

    async fn notify(&self, app: &mut Application) -> StageEvent {
        let Some(verdict) = app.verdict.as_ref() else {
            return StageEvent::Failed(Failure::new(
                Stage::Notification,
                "unparseable-response",
                "no verdict recorded",
            ));
        };
        match self.dispatcher.notify(&app.candidate, verdict, &app.role).await {
            Ok(receipt) => {
                app.notification = Some(receipt);
                StageEvent::Notified
            }
            Err(e) => StageEvent::Failed(Failure::new(Stage::Notification, e.reason(), &e)),
        }
    }

    async fn schedule(&self, app: &mut Application) -> StageEvent {
        let now = (self.clock)();
        if app.window.has_elapsed(now) {
            let window = PreferredWindow::next_business_day(now, &self.hours);
            info!(
                application = %app.id,
                "interview window ended at {}, moving to {}",
                app.window.end,
                window.start
            );
            app.window = window;
        }

        let meeting = match self.scheduler.schedule(&app.candidate, &app.role, &app.window, now).await {
            Ok(meeting) => meeting,
            Err(e) => return StageEvent::Failed(Failure::new(Stage::Scheduling, e.reason(), &e)),
        };

        // The meeting exists either way; a failed confirmation is recorded, not fatal.
        let confirmation = self
            .dispatcher
            .confirm_interview(&app.candidate, &app.role, &meeting)
            .await
            .map_err(|e| {
                warn!(application = %app.id, "interview confirmation email failed: {e}");
                e.to_string()
            });
        app.confirmation = Some(confirmation);
        app.meeting = Some(meeting);
        StageEvent::Scheduled
    }

    fn log_stage(&self, app: &Application) {
        match &app.stage {
            ApplicationStage::Failed(failure) => error!(
                application = %app.id,
                stage = %failure.stage,
                reason = %failure.reason,
                "application failed: {}",
                failure.detail
            ),
            stage => info!(application = %app.id, "application is now {stage}"),
        }
    }
}
