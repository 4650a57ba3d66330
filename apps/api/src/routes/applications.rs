use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::candidate::CandidateContact;
use crate::models::role::Role;
use crate::models::verdict::Verdict;
use crate::notification::NotificationReceipt;
use crate::pipeline::application::StageTransition;
use crate::pipeline::{Application, ApplicationStage, PipelineOutcome, ResumeDocument, StepOutcome};
use crate::scheduling::{MeetingReference, PreferredWindow};
use crate::state::AppState;

#[derive(Serialize)]
pub struct ApplicationView {
    pub id: Uuid,
    pub candidate: CandidateContact,
    pub role_id: String,
    pub role_title: String,
    pub stage: ApplicationStage,
    pub terminal: bool,
    /// A run holds the application; `stage` is its latest published step.
    pub in_flight: bool,
    pub verdict: Option<Verdict>,
    pub assessment_retries: u32,
    pub notification: Option<NotificationReceipt>,
    pub meeting: Option<MeetingReference>,
    pub confirmation: Option<NotificationReceipt>,
    pub confirmation_error: Option<String>,
    pub window: PreferredWindow,
    pub history: Vec<StageTransition>,
    pub created_at: DateTime<Utc>,
}

impl ApplicationView {
    fn of(app: &Application, in_flight: bool) -> Self {
        let (confirmation, confirmation_error) = match &app.confirmation {
            Some(Ok(receipt)) => (Some(receipt.clone()), None),
            Some(Err(e)) => (None, Some(e.clone())),
            None => (None, None),
        };
        Self {
            id: app.id,
            candidate: app.candidate.clone(),
            role_id: app.role.id.clone(),
            role_title: app.role.title.clone(),
            stage: app.stage.clone(),
            terminal: app.is_terminal(),
            in_flight,
            verdict: app.verdict.clone(),
            assessment_retries: app.assessment_retries,
            notification: app.notification.clone(),
            meeting: app.meeting.clone(),
            confirmation,
            confirmation_error,
            window: app.window,
            history: app.history.clone(),
            created_at: app.created_at,
        }
    }
}

#[derive(Default)]
struct UploadForm {
    document: Option<ResumeDocument>,
    candidate_name: Option<String>,
    candidate_email: Option<String>,
    role: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("could not read upload: {e}")))?;
                form.document = Some(ResumeDocument::new(bytes, filename, content_type));
            }
            "candidate_name" | "candidate_email" | "role" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("could not read field '{name}': {e}")))?;
                let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                match name.as_str() {
                    "candidate_name" => form.candidate_name = value,
                    "candidate_email" => form.candidate_email = value,
                    _ => form.role = value,
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

/// GET /api/v1/roles
pub async fn handle_list_roles(State(state): State<AppState>) -> Json<Vec<Role>> {
    let roles = state
        .orchestrator
        .registry()
        .list()
        .iter()
        .map(|role| role.as_ref().clone())
        .collect();
    Json(roles)
}

/// POST /api/v1/applications
/// Multipart form: `file`, `candidate_email`, `role`, optional `candidate_name`.
pub async fn handle_create_application(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApplicationView>), AppError> {
    let form = read_upload(multipart).await?;

    let document = form
        .document
        .ok_or_else(|| AppError::Validation("missing 'file' field".to_string()))?;
    let email = form
        .candidate_email
        .ok_or_else(|| AppError::Validation("missing 'candidate_email' field".to_string()))?;
    if !looks_like_email(&email) {
        return Err(AppError::Validation(format!("'{email}' is not an email address")));
    }
    let role_id = form
        .role
        .ok_or_else(|| AppError::Validation("missing 'role' field".to_string()))?;

    let window = state.orchestrator.next_window();
    let app = state.orchestrator.open(
        CandidateContact::new(form.candidate_name, email),
        &role_id,
        document,
        window,
    )?;

    let view = ApplicationView::of(&app, false);
    state.store.insert(app);
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/applications/:id
pub async fn handle_get_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApplicationView>, AppError> {
    let stored = state.store.get(id)?;
    Ok(Json(ApplicationView::of(&stored.application, stored.in_flight)))
}

/// POST /api/v1/applications/:id/advance
pub async fn handle_advance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StepOutcome>, AppError> {
    let mut app = state.store.check_out(id)?;
    let orchestrator = state.orchestrator.clone();
    let store = state.store.clone();
    // Spawned so a dropped request still checks the application back in.
    let step = tokio::spawn(async move {
        let step = orchestrator.advance(&mut app).await;
        store.check_in(app);
        step
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))?;
    Ok(Json(step))
}

/// POST /api/v1/applications/:id/run
pub async fn handle_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineOutcome>, AppError> {
    let mut app = state.store.check_out(id)?;
    let orchestrator = state.orchestrator.clone();
    let store = state.store.clone();
    let outcome = tokio::spawn(async move {
        let outcome = orchestrator
            .run_observed(&mut app, |step| store.publish(step))
            .await;
        store.check_in(app);
        outcome
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))?;
    info!(application = %id, "run finished at {}", outcome.stage);
    Ok(Json(outcome))
}

/// POST /api/v1/applications/:id/redrive
pub async fn handle_redrive(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineOutcome>, AppError> {
    let mut app = state.store.check_out(id)?;
    let orchestrator = state.orchestrator.clone();
    let store = state.store.clone();
    let outcome = tokio::spawn(async move {
        let outcome = orchestrator
            .redrive_observed(&mut app, |step| store.publish(step))
            .await;
        store.check_in(app);
        outcome
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))??;
    Ok(Json(outcome))
}
