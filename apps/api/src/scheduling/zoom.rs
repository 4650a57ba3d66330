//! Zoom implementation of `MeetingService`.
//!
//! Uses server-to-server OAuth (`grant_type=account_credentials`). The access
//! token is cached until a minute before it expires; the cache mutex is only
//! held to read or replace the token, never across a request.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::scheduling::{MeetingReference, MeetingRequest, MeetingService, ScheduleError, ScheduleResult};

const ZOOM_OAUTH_URL: &str = "https://zoom.us/oauth/token";
const ZOOM_API_BASE: &str = "https://api.zoom.us/v2";
/// Zoom meeting type 2 = scheduled meeting.
const SCHEDULED_MEETING: u8 = 2;
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct ZoomCredentials {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Serialize)]
struct CreateMeetingBody<'a> {
    topic: &'a str,
    #[serde(rename = "type")]
    meeting_type: u8,
    start_time: String,
    duration: u32,
    timezone: &'a str,
    agenda: &'a str,
    settings: MeetingSettings<'a>,
}

#[derive(Debug, Serialize)]
struct MeetingSettings<'a> {
    join_before_host: bool,
    waiting_room: bool,
    /// Zoom sends the calendar invitation to these addresses.
    meeting_invitees: Vec<Invitee<'a>>,
}

#[derive(Debug, Serialize)]
struct Invitee<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedMeeting {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    join_url: String,
    #[serde(default)]
    start_time: Option<String>,
}

pub struct ZoomMeetingService {
    client: Client,
    credentials: ZoomCredentials,
    oauth_url: String,
    api_base: String,
    token: Mutex<Option<CachedToken>>,
}

impl ZoomMeetingService {
    pub fn new(credentials: ZoomCredentials, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            credentials,
            oauth_url: ZOOM_OAUTH_URL.to_string(),
            api_base: ZOOM_API_BASE.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Points the service at alternative OAuth and API endpoints.
    pub fn with_endpoints(mut self, oauth_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.oauth_url = oauth_url.into();
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard
            .as_ref()
            .filter(|t| Instant::now() < t.expires_at)
            .map(|t| t.value.clone())
    }

    fn store_token(&self, token: Option<CachedToken>) {
        let mut guard = self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = token;
    }

    async fn access_token(&self) -> Result<String, ScheduleError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let response = self
            .client
            .post(&self.oauth_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .query(&[
                ("grant_type", "account_credentials"),
                ("account_id", self.credentials.account_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ScheduleError::Unavailable(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("token request", status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ScheduleError::Unavailable(format!("malformed token response: {e}")))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        self.store_token(Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        }));
        info!("Zoom access token refreshed (valid {}s)", lifetime.as_secs());
        Ok(token.access_token)
    }
}

fn status_error(context: &str, status: StatusCode, body: &str) -> ScheduleError {
    let detail = format!("{context} returned {}: {}", status.as_u16(), body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ScheduleError::Unavailable(detail)
    } else {
        ScheduleError::Rejected(detail)
    }
}

#[async_trait]
impl MeetingService for ZoomMeetingService {
    async fn create_meeting(&self, request: &MeetingRequest) -> ScheduleResult {
        let token = self.access_token().await?;

        let body = CreateMeetingBody {
            topic: &request.topic,
            meeting_type: SCHEDULED_MEETING,
            start_time: request.start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            duration: request.duration_minutes,
            timezone: "UTC",
            agenda: &request.agenda,
            settings: MeetingSettings {
                join_before_host: false,
                waiting_room: true,
                meeting_invitees: vec![Invitee {
                    email: &request.attendee_email,
                }],
            },
        };

        let response = self
            .client
            .post(format!("{}/users/{}/meetings", self.api_base, request.organizer))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ScheduleError::Unavailable(format!("create meeting failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.store_token(None);
            }
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("create meeting", status, &body));
        }

        let created: CreatedMeeting = response
            .json()
            .await
            .map_err(|e| ScheduleError::InvalidReference(format!("malformed meeting response: {e}")))?;

        let start_time = created
            .start_time
            .as_deref()
            .ok_or_else(|| ScheduleError::InvalidReference("missing start_time".to_string()))
            .and_then(|s| {
                DateTime::parse_from_rfc3339(s)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| ScheduleError::InvalidReference(format!("bad start_time {s:?}: {e}")))
            })?;

        debug!(meeting_id = ?created.id, "Zoom meeting created");
        Ok(MeetingReference {
            meeting_id: created.id.map(|id| id.to_string()),
            join_url: created.join_url,
            start_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::testing::window;

    fn request() -> MeetingRequest {
        MeetingRequest {
            organizer: "me".to_string(),
            topic: "Backend Engineer Technical Interview".to_string(),
            agenda: "agenda".to_string(),
            attendee_email: "jane@example.com".to_string(),
            start_time: window().start,
            duration_minutes: 60,
        }
    }

    fn service(server: &mockito::ServerGuard) -> ZoomMeetingService {
        ZoomMeetingService::new(
            ZoomCredentials {
                account_id: "acct".to_string(),
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
        .with_endpoints(format!("{}/oauth/token", server.url()), server.url())
    }

    async fn mock_token(server: &mut mockito::ServerGuard, hits: usize) -> mockito::Mock {
        server
            .mock("POST", "/oauth/token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "account_credentials".into()),
                Matcher::UrlEncoded("account_id".into(), "acct".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token":"tok-1","expires_in":3600}"#)
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_create_meeting_returns_reference_and_caches_token() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = mock_token(&mut server, 1).await;
        let start = window().start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let meeting_mock = server
            .mock("POST", "/users/me/meetings")
            .match_header("authorization", "Bearer tok-1")
            .match_body(Matcher::PartialJson(json!({
                "topic": "Backend Engineer Technical Interview",
                "type": 2,
                "start_time": start,
                "duration": 60,
                "settings": {
                    "meeting_invitees": [{"email": "jane@example.com"}]
                }
            })))
            .with_status(201)
            .with_body(
                json!({
                    "id": 987654321u64,
                    "join_url": "https://zoom.us/j/987654321",
                    "start_time": start
                })
                .to_string(),
            )
            .expect(2)
            .create_async()
            .await;

        let zoom = service(&server);
        let first = zoom.create_meeting(&request()).await.unwrap();
        let second = zoom.create_meeting(&request()).await.unwrap();

        assert_eq!(first.join_url, "https://zoom.us/j/987654321");
        assert_eq!(first.meeting_id.as_deref(), Some("987654321"));
        assert_eq!(first.start_time, window().start);
        assert_eq!(first, second);
        token_mock.assert_async().await;
        meeting_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_credentials_are_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/oauth/token")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"reason":"Invalid client_id or client_secret"}"#)
            .create_async()
            .await;

        let err = service(&server).create_meeting(&request()).await.unwrap_err();
        assert_eq!(err.reason(), "scheduling-rejected");
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server, 1).await;
        let _meeting = server
            .mock("POST", "/users/me/meetings")
            .with_status(503)
            .create_async()
            .await;

        let err = service(&server).create_meeting(&request()).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_start_time_is_invalid_reference() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server, 1).await;
        let _meeting = server
            .mock("POST", "/users/me/meetings")
            .with_status(201)
            .with_body(r#"{"id":1,"join_url":"https://zoom.us/j/1"}"#)
            .create_async()
            .await;

        let err = service(&server).create_meeting(&request()).await.unwrap_err();
        assert_eq!(err.reason(), "invalid-reference");
    }
}
