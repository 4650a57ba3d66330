mod assessment;
mod config;
mod errors;
mod extraction;
mod llm_client;
mod models;
mod notification;
mod pipeline;
mod roles;
mod routes;
mod scheduling;
mod state;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::assessment::parser::TolerantVerdictParser;
use crate::assessment::{AssessmentEngine, RetryPolicy};
use crate::config::{Config, EmailDelivery};
use crate::llm_client::LlmClient;
use crate::notification::smtp::SmtpEmailTransport;
use crate::notification::transport::{EmailTransport, HttpEmailTransport};
use crate::notification::{NotificationDispatcher, SenderIdentity};
use crate::pipeline::{ApplicationStore, Orchestrator};
use crate::roles::RoleRegistry;
use crate::routes::build_router;
use crate::scheduling::zoom::{ZoomCredentials, ZoomMeetingService};
use crate::scheduling::{InterviewHours, InterviewScheduler};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting recruiter v{}", env!("CARGO_PKG_VERSION"));

    // Role catalog
    let registry = Arc::new(
        RoleRegistry::load(config.roles_path.as_deref()).context("failed to load role catalog")?,
    );

    // Assessment engine
    let llm = LlmClient::new(
        config.inference.base_url.clone(),
        config.inference.api_key.clone(),
        config.inference.model.clone(),
        config.inference.timeout,
    )
    .context("failed to build inference client")?;
    info!("LLM client initialized (model: {})", llm.model());
    let engine = AssessmentEngine::new(
        Arc::new(llm),
        Arc::new(TolerantVerdictParser),
        RetryPolicy {
            max_retries: config.inference.max_retries,
            initial_backoff: config.inference.initial_backoff,
            attempt_timeout: config.inference.timeout,
        },
    );

    // Interview hours, shared by the orchestrator's windows and the confirmation email
    let interview = config.interview;
    let interview_hours = InterviewHours::new(
        interview.utc_offset_minutes,
        interview.preferred_hour,
        interview.day_end_hour,
        interview.duration_minutes,
    )
    .context("invalid interview hours")?;

    // Notification dispatcher
    let transport: Arc<dyn EmailTransport> = match &config.email.delivery {
        EmailDelivery::Smtp { host, port, passkey } => Arc::new(
            SmtpEmailTransport::new(
                host,
                *port,
                &config.email.sender,
                passkey,
                config.email.timeout,
            )
            .context("failed to build SMTP transport")?,
        ),
        EmailDelivery::Relay { url, api_key } => Arc::new(
            HttpEmailTransport::new(url.clone(), api_key.clone(), config.email.timeout)
                .context("failed to build email relay transport")?,
        ),
    };
    let dispatcher = NotificationDispatcher::new(
        transport,
        SenderIdentity {
            address: config.email.sender.clone(),
            company_name: config.email.company_name.clone(),
        },
        config.email.timeout,
        interview_hours.utc_offset,
    );
    info!(
        "Email transport initialized ({}, sender: {})",
        config.email.delivery.kind(),
        config.email.sender
    );

    // Interview scheduler
    let zoom = ZoomMeetingService::new(
        ZoomCredentials {
            account_id: config.scheduling.zoom_account_id.clone(),
            client_id: config.scheduling.zoom_client_id.clone(),
            client_secret: config.scheduling.zoom_client_secret.clone(),
        },
        config.scheduling.timeout,
    )
    .context("failed to build scheduling client")?;
    let scheduler = InterviewScheduler::new(
        Arc::new(zoom),
        config.scheduling.organizer.clone(),
        config.scheduling.timeout,
    );

    // Build app state
    let state = AppState {
        orchestrator: Arc::new(Orchestrator::new(
            registry,
            engine,
            dispatcher,
            scheduler,
            interview_hours,
        )),
        store: Arc::new(ApplicationStore::with_capacity(config.store_capacity)),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the upload UI has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
