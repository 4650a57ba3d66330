//! Application processing pipeline: extraction, assessment, notification and
//! scheduling for one application at a time.

pub mod application;
pub mod orchestrator;
pub mod store;

pub use application::{Application, ApplicationStage, Failure, ResumeDocument, Stage};
pub use orchestrator::{Orchestrator, PipelineOutcome, RedriveError, StepOutcome};
pub use store::{ApplicationStore, StoreError};
