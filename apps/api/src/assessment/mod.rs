//! Assessment Engine: asks the language model to judge a resume against a role
//! and turns the answer into a `Verdict`.
//!
//! Transient inference failures (timeouts, 5xx, rate limiting) are retried with
//! exponential backoff up to `RetryPolicy::max_retries`; permanent failures and
//! parse failures surface immediately.

pub mod parser;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::assessment::parser::{AssessmentParseError, VerdictParser};
use crate::llm_client::{InferenceClient, InferenceError, InferenceRequest};
use crate::models::role::Role;
use crate::models::verdict::Verdict;

/// Bounded retry policy for the inference call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub initial_backoff: Duration,
    /// Upper bound on a single inference attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, retry: u32) -> Duration {
        self.initial_backoff.saturating_mul(1u32 << retry.min(16))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssessmentError {
    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Parse(#[from] AssessmentParseError),
}

impl AssessmentError {
    pub fn reason(&self) -> &'static str {
        match self {
            AssessmentError::Inference(InferenceError::Transient(_)) => "inference-unavailable",
            AssessmentError::Inference(InferenceError::Permanent(_)) => "inference-rejected",
            AssessmentError::Parse(_) => "unparseable-response",
        }
    }
}

/// A verdict plus how many retries it took to obtain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub verdict: Verdict,
    pub retries: u32,
}

pub struct AssessmentEngine {
    client: Arc<dyn InferenceClient>,
    parser: Arc<dyn VerdictParser>,
    policy: RetryPolicy,
}

impl AssessmentEngine {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        parser: Arc<dyn VerdictParser>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            parser,
            policy,
        }
    }

    /// Assesses `resume_text` against `role`.
    pub async fn assess(&self, resume_text: &str, role: &Role) -> Result<Assessment, AssessmentError> {
        let request = InferenceRequest {
            system: prompts::system_prompt(),
            prompt: prompts::build_prompt(resume_text, role),
        };

        let (raw, retries) = self.complete_with_retry(&request).await?;
        debug!(role = %role.id, retries, "raw assessment received ({} chars)", raw.len());

        let verdict = self.parser.parse(&raw)?;
        Ok(Assessment { verdict, retries })
    }

    async fn complete_with_retry(
        &self,
        request: &InferenceRequest,
    ) -> Result<(String, u32), InferenceError> {
        let mut retries = 0;
        loop {
            let attempt =
                match tokio::time::timeout(self.policy.attempt_timeout, self.client.complete(request))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(InferenceError::Transient(format!(
                        "no response within {}ms",
                        self.policy.attempt_timeout.as_millis()
                    ))),
                };

            match attempt {
                Ok(raw) => return Ok((raw, retries)),
                Err(e) if e.is_transient() && retries < self.policy.max_retries => {
                    let delay = self.policy.backoff_for(retries);
                    retries += 1;
                    warn!(
                        "LLM call attempt {} failed ({}), retrying after {}ms...",
                        retries,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
