use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_INFERENCE_BASE_URL: &str = "https://router.huggingface.co/v1";
const DEFAULT_INFERENCE_MODEL: &str = "openai/gpt-oss-120b:nscale";
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const REDACTED: &str = "<redacted>";

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a number does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub inference: InferenceConfig,
    pub email: EmailConfig,
    pub scheduling: SchedulingConfig,
    pub interview: InterviewConfig,
    /// Role catalog override; the built-in catalog is used when unset.
    pub roles_path: Option<PathBuf>,
    /// Upper bound on applications kept in memory.
    pub store_capacity: usize,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub delivery: EmailDelivery,
    pub sender: String,
    pub company_name: String,
    pub timeout: Duration,
}

/// How outgoing mail leaves the process.
#[derive(Clone)]
pub enum EmailDelivery {
    /// Authenticated SMTP submission as `EmailConfig::sender`.
    Smtp {
        host: String,
        port: u16,
        passkey: String,
    },
    /// JSON mail relay with a bearer key.
    Relay { url: String, api_key: String },
}

impl EmailDelivery {
    pub fn kind(&self) -> &'static str {
        match self {
            EmailDelivery::Smtp { .. } => "smtp",
            EmailDelivery::Relay { .. } => "relay",
        }
    }

    fn from_env() -> Result<Self> {
        match env_or("EMAIL_TRANSPORT", "smtp").trim().to_lowercase().as_str() {
            "smtp" => Ok(EmailDelivery::Smtp {
                host: env_or("SMTP_HOST", DEFAULT_SMTP_HOST),
                port: parse_env("SMTP_PORT", 587).context("SMTP_PORT must be a valid port number")?,
                passkey: require_env("EMAIL_PASSKEY")?,
            }),
            "relay" => Ok(EmailDelivery::Relay {
                url: require_env("EMAIL_RELAY_URL")?,
                api_key: require_env("EMAIL_API_KEY")?,
            }),
            other => anyhow::bail!("EMAIL_TRANSPORT must be 'smtp' or 'relay', got '{other}'"),
        }
    }
}

#[derive(Clone)]
pub struct SchedulingConfig {
    pub zoom_account_id: String,
    pub zoom_client_id: String,
    pub zoom_client_secret: String,
    /// Zoom user the meetings are created under.
    pub organizer: String,
    pub timeout: Duration,
}

/// Interviewers' working day, in their local offset.
#[derive(Debug, Clone, Copy)]
pub struct InterviewConfig {
    pub utc_offset_minutes: i32,
    pub preferred_hour: u32,
    pub day_end_hour: u32,
    pub duration_minutes: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            inference: InferenceConfig {
                base_url: env_or("INFERENCE_BASE_URL", DEFAULT_INFERENCE_BASE_URL),
                api_key: require_env("INFERENCE_API_KEY")?,
                model: env_or("INFERENCE_MODEL", DEFAULT_INFERENCE_MODEL),
                timeout: Duration::from_secs(parse_env("INFERENCE_TIMEOUT_SECS", 60)?),
                max_retries: parse_env("INFERENCE_MAX_RETRIES", 2)?,
                initial_backoff: Duration::from_millis(parse_env("INFERENCE_BACKOFF_MS", 500)?),
            },
            email: EmailConfig {
                delivery: EmailDelivery::from_env()?,
                sender: require_env("EMAIL_SENDER")?,
                company_name: env_or("COMPANY_NAME", "AI Recruiting"),
                timeout: Duration::from_secs(parse_env("EMAIL_TIMEOUT_SECS", 30)?),
            },
            scheduling: SchedulingConfig {
                zoom_account_id: require_env("ZOOM_ACCOUNT_ID")?,
                zoom_client_id: require_env("ZOOM_CLIENT_ID")?,
                zoom_client_secret: require_env("ZOOM_CLIENT_SECRET")?,
                organizer: env_or("ZOOM_ORGANIZER", "me"),
                timeout: Duration::from_secs(parse_env("SCHEDULING_TIMEOUT_SECS", 30)?),
            },
            interview: InterviewConfig {
                utc_offset_minutes: parse_env("INTERVIEW_UTC_OFFSET_MINUTES", 330)?,
                preferred_hour: parse_env("INTERVIEW_PREFERRED_HOUR", 11)?,
                day_end_hour: parse_env("INTERVIEW_DAY_END_HOUR", 17)?,
                duration_minutes: parse_env("INTERVIEW_DURATION_MINUTES", 60)?,
            },
            roles_path: std::env::var("ROLES_PATH").ok().map(PathBuf::from),
            store_capacity: parse_env("STORE_CAPACITY", crate::pipeline::store::DEFAULT_CAPACITY)?,
            port: parse_env("PORT", 8080).context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

// Secrets never reach logs through `{:?}`.

impl fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &REDACTED)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff", &self.initial_backoff)
            .finish()
    }
}

impl fmt::Debug for EmailDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailDelivery::Smtp { host, port, .. } => f
                .debug_struct("Smtp")
                .field("host", host)
                .field("port", port)
                .field("passkey", &REDACTED)
                .finish(),
            EmailDelivery::Relay { url, .. } => f
                .debug_struct("Relay")
                .field("url", url)
                .field("api_key", &REDACTED)
                .finish(),
        }
    }
}

impl fmt::Debug for SchedulingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulingConfig")
            .field("zoom_account_id", &self.zoom_account_id)
            .field("zoom_client_id", &self.zoom_client_id)
            .field("zoom_client_secret", &REDACTED)
            .field("organizer", &self.organizer)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
