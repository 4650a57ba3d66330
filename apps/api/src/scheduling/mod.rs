//! Interview Scheduler: books a time-boxed meeting for a selected candidate.
//!
//! Meeting creation is delegated to a `MeetingService`. A reference the service
//! reports as created is only accepted once it is usable: a non-empty absolute
//! http(s) join link and a start time inside the requested window. One attempt
//! per call, no retries.

pub mod zoom;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::candidate::CandidateContact;
use crate::models::role::Role;

/// Bounds for the meeting start time plus the meeting length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid interview window: {0}")]
pub struct InvalidWindow(pub String);

impl PreferredWindow {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<Self, InvalidWindow> {
        if end < start {
            return Err(InvalidWindow(format!("end {end} is before start {start}")));
        }
        if duration_minutes == 0 {
            return Err(InvalidWindow("duration must be at least one minute".to_string()));
        }
        Ok(Self {
            start,
            end,
            duration_minutes,
        })
    }

    /// Next weekday after `now` (in the interviewers' local offset): the meeting
    /// is requested at the preferred hour and must finish by close of day.
    pub fn next_business_day(now: DateTime<Utc>, hours: &InterviewHours) -> Self {
        let local_today = now.with_timezone(&hours.utc_offset).date_naive();
        let day = next_weekday(local_today);
        Self {
            start: hours.to_utc(day, hours.preferred_start),
            end: hours.to_utc(day, hours.latest_start()),
            duration_minutes: hours.duration_minutes,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// No start time inside the window is still in the future.
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }
}

fn next_weekday(date: NaiveDate) -> NaiveDate {
    let mut day = date;
    while let Some(next) = day.succ_opt() {
        day = next;
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            break;
        }
    }
    day
}

/// When interviews happen, in the interviewers' local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterviewHours {
    pub utc_offset: FixedOffset,
    pub preferred_start: NaiveTime,
    pub day_end: NaiveTime,
    pub duration_minutes: u32,
}

impl InterviewHours {
    pub fn new(
        utc_offset_minutes: i32,
        preferred_hour: u32,
        day_end_hour: u32,
        duration_minutes: u32,
    ) -> Result<Self, InvalidWindow> {
        let utc_offset = FixedOffset::east_opt(utc_offset_minutes * 60)
            .ok_or_else(|| InvalidWindow(format!("offset {utc_offset_minutes}min out of range")))?;
        let preferred_start = NaiveTime::from_hms_opt(preferred_hour, 0, 0)
            .ok_or_else(|| InvalidWindow(format!("preferred hour {preferred_hour} out of range")))?;
        let day_end = NaiveTime::from_hms_opt(day_end_hour, 0, 0)
            .ok_or_else(|| InvalidWindow(format!("day end hour {day_end_hour} out of range")))?;
        if day_end < preferred_start {
            return Err(InvalidWindow(format!(
                "day ends ({day_end_hour}:00) before preferred start ({preferred_hour}:00)"
            )));
        }
        if duration_minutes == 0 {
            return Err(InvalidWindow("duration must be at least one minute".to_string()));
        }
        if day_end - preferred_start < chrono::Duration::minutes(duration_minutes.into()) {
            return Err(InvalidWindow(format!(
                "a {duration_minutes}min interview starting at {preferred_hour}:00 ends after {day_end_hour}:00"
            )));
        }
        Ok(Self {
            utc_offset,
            preferred_start,
            day_end,
            duration_minutes,
        })
    }

    /// Latest start that still ends by close of day.
    pub fn latest_start(&self) -> NaiveTime {
        self.day_end - chrono::Duration::minutes(self.duration_minutes.into())
    }

    fn to_utc(&self, day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = day.and_time(time);
        let utc = local - chrono::Duration::seconds(self.utc_offset.local_minus_utc().into());
        Utc.from_utc_datetime(&utc)
    }
}

/// What the scheduling collaborator is asked to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingRequest {
    pub organizer: String,
    pub topic: String,
    pub agenda: String,
    pub attendee_email: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: u32,
}

/// A joinable meeting returned by the scheduling collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingReference {
    pub meeting_id: Option<String>,
    pub join_url: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("scheduling service returned an unusable meeting reference: {0}")]
    InvalidReference(String),

    #[error("scheduling service refused the request: {0}")]
    Rejected(String),

    #[error("scheduling service unavailable: {0}")]
    Unavailable(String),

    #[error("scheduling service did not answer within {0}ms")]
    Timeout(u64),

    #[error("interview window ended at {0}")]
    WindowElapsed(DateTime<Utc>),
}

impl ScheduleError {
    pub fn reason(&self) -> &'static str {
        match self {
            ScheduleError::InvalidReference(_) => "invalid-reference",
            ScheduleError::Rejected(_) => "scheduling-rejected",
            ScheduleError::Unavailable(_) => "scheduling-unavailable",
            ScheduleError::Timeout(_) => "timeout",
            ScheduleError::WindowElapsed(_) => "window-elapsed",
        }
    }
}

pub type ScheduleResult = Result<MeetingReference, ScheduleError>;

/// Meeting-scheduling collaborator. Token acquisition is the implementor's concern.
#[async_trait]
pub trait MeetingService: Send + Sync {
    async fn create_meeting(&self, request: &MeetingRequest) -> ScheduleResult;
}

pub struct InterviewScheduler {
    service: Arc<dyn MeetingService>,
    organizer: String,
    timeout: Duration,
}

impl InterviewScheduler {
    pub fn new(service: Arc<dyn MeetingService>, organizer: impl Into<String>, timeout: Duration) -> Self {
        Self {
            service,
            organizer: organizer.into(),
            timeout,
        }
    }

    /// Single attempt to book an interview. Callers must not call twice for the
    /// same application except through an explicit re-drive. A window that has
    /// already passed at `now` is refused without contacting the service.
    pub async fn schedule(
        &self,
        candidate: &CandidateContact,
        role: &Role,
        window: &PreferredWindow,
        now: DateTime<Utc>,
    ) -> ScheduleResult {
        if window.has_elapsed(now) {
            return Err(ScheduleError::WindowElapsed(window.end));
        }
        let request = MeetingRequest {
            organizer: self.organizer.clone(),
            topic: format!("{} Technical Interview", role.title),
            agenda: format!(
                "Technical interview with {} for the {} position.",
                candidate.email, role.title
            ),
            attendee_email: candidate.email.clone(),
            start_time: window.start,
            duration_minutes: window.duration_minutes,
        };

        let reference = tokio::time::timeout(self.timeout, self.service.create_meeting(&request))
            .await
            .map_err(|_| ScheduleError::Timeout(self.timeout.as_millis() as u64))??;

        if let Err(e) = validate_reference(&reference, window, now) {
            warn!(candidate = %candidate.email, "rejecting meeting reference: {e}");
            return Err(e);
        }

        debug!(candidate = %candidate.email, join_url = %reference.join_url, "interview booked");
        Ok(reference)
    }
}

/// Checks that a reference is something a candidate can actually join.
pub fn validate_reference(
    reference: &MeetingReference,
    window: &PreferredWindow,
    now: DateTime<Utc>,
) -> Result<(), ScheduleError> {
    let link = reference.join_url.trim();
    if link.is_empty() {
        return Err(ScheduleError::InvalidReference("empty join link".to_string()));
    }
    match Url::parse(link) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {}
        _ => {
            return Err(ScheduleError::InvalidReference(format!(
                "join link {link:?} is not an absolute http(s) URL"
            )))
        }
    }
    if !window.contains(reference.start_time) {
        return Err(ScheduleError::InvalidReference(format!(
            "start time {} outside requested window {} - {}",
            reference.start_time, window.start, window.end
        )));
    }
    if reference.start_time < now {
        return Err(ScheduleError::InvalidReference(format!(
            "start time {} is in the past",
            reference.start_time
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;
    use crate::testing::{backend_role, candidate, window, FakeMeetingService};

    fn ist_hours() -> InterviewHours {
        InterviewHours::new(330, 11, 17, 60).unwrap()
    }

    fn before_window() -> DateTime<Utc> {
        utc("2026-10-13T15:00:00Z")
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_next_business_day_is_tomorrow_11_ist() {
        // Tuesday 2026-10-13 15:00 UTC = 20:30 IST
        let window = PreferredWindow::next_business_day(utc("2026-10-13T15:00:00Z"), &ist_hours());
        assert_eq!(window.start, utc("2026-10-14T05:30:00Z"));
        // latest start leaves room for the hour before 17:00 IST
        assert_eq!(window.end, utc("2026-10-14T10:30:00Z"));
        assert_eq!(window.duration_minutes, 60);
        let local = window.start.with_timezone(&ist_hours().utc_offset);
        assert_eq!(local.hour(), 11);
    }

    #[test]
    fn test_next_business_day_skips_weekend() {
        // Friday 2026-10-16 10:00 UTC
        let window = PreferredWindow::next_business_day(utc("2026-10-16T10:00:00Z"), &ist_hours());
        assert_eq!(window.start.with_timezone(&ist_hours().utc_offset).weekday(), Weekday::Mon);
    }

    #[test]
    fn test_next_business_day_uses_local_date() {
        // Sunday 2026-10-11 20:00 UTC is already Monday 01:30 in IST
        let window = PreferredWindow::next_business_day(utc("2026-10-11T20:00:00Z"), &ist_hours());
        assert_eq!(window.start, utc("2026-10-13T05:30:00Z"));
    }

    #[test]
    fn test_interview_hours_validation() {
        assert!(InterviewHours::new(330, 25, 17, 60).is_err());
        assert!(InterviewHours::new(330, 11, 9, 60).is_err());
        assert!(InterviewHours::new(330, 11, 17, 0).is_err());
        assert!(InterviewHours::new(100_000, 11, 17, 60).is_err());
        assert!(InterviewHours::new(330, 16, 17, 90).is_err());
        assert!(InterviewHours::new(330, 16, 17, 60).is_ok());
    }

    #[test]
    fn test_latest_start_ends_by_close_of_day() {
        let hours = ist_hours();
        assert_eq!(hours.latest_start(), NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        let window = PreferredWindow::next_business_day(utc("2026-10-13T15:00:00Z"), &hours);
        let finish = window.end + chrono::Duration::minutes(window.duration_minutes.into());
        assert_eq!(finish.with_timezone(&hours.utc_offset).hour(), 17);
    }

    #[test]
    fn test_window_rejects_inverted_bounds() {
        let start = utc("2026-10-14T05:30:00Z");
        assert!(PreferredWindow::new(start, start - chrono::Duration::hours(1), 60).is_err());
        assert!(PreferredWindow::new(start, start, 0).is_err());
        assert!(PreferredWindow::new(start, start, 30).is_ok());
    }

    #[test]
    fn test_validate_reference_rules() {
        let window = window();
        let good = MeetingReference {
            meeting_id: Some("123".to_string()),
            join_url: "https://zoom.us/j/123".to_string(),
            start_time: window.start,
        };
        assert!(validate_reference(&good, &window, before_window()).is_ok());

        let empty = MeetingReference {
            join_url: "  ".to_string(),
            ..good.clone()
        };
        assert_eq!(
            validate_reference(&empty, &window, before_window()).unwrap_err().reason(),
            "invalid-reference"
        );

        let relative = MeetingReference {
            join_url: "/j/123".to_string(),
            ..good.clone()
        };
        assert!(validate_reference(&relative, &window, before_window()).is_err());

        let late = MeetingReference {
            start_time: window.end + chrono::Duration::minutes(1),
            ..good.clone()
        };
        assert!(validate_reference(&late, &window, before_window()).is_err());

        let past = validate_reference(&good, &window, window.start + chrono::Duration::minutes(5));
        assert_eq!(past.unwrap_err().reason(), "invalid-reference");
    }

    #[tokio::test]
    async fn test_schedule_requests_topic_and_start() {
        let service = Arc::new(FakeMeetingService::succeeding());
        let scheduler = InterviewScheduler::new(service.clone(), "me", Duration::from_secs(5));
        let window = window();

        let reference = scheduler
            .schedule(&candidate(), &backend_role(), &window, before_window())
            .await
            .unwrap();

        assert!(!reference.join_url.is_empty());
        let requests = service.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].topic, "Backend Engineer Technical Interview");
        assert_eq!(requests[0].start_time, window.start);
        assert_eq!(requests[0].attendee_email, candidate().email);
    }

    #[tokio::test]
    async fn test_schedule_empty_link_is_schedule_error() {
        let service = Arc::new(FakeMeetingService::returning_link(""));
        let scheduler = InterviewScheduler::new(service, "me", Duration::from_secs(5));

        let err = scheduler
            .schedule(&candidate(), &backend_role(), &window(), before_window())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "invalid-reference");
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_times_out() {
        let service = Arc::new(FakeMeetingService::hanging());
        let scheduler = InterviewScheduler::new(service, "me", Duration::from_secs(30));

        let err = scheduler
            .schedule(&candidate(), &backend_role(), &window(), before_window())
            .await
            .unwrap_err();
        assert_eq!(err, ScheduleError::Timeout(30_000));
    }

    #[tokio::test]
    async fn test_elapsed_window_is_refused_without_booking() {
        let service = Arc::new(FakeMeetingService::succeeding());
        let scheduler = InterviewScheduler::new(service.clone(), "me", Duration::from_secs(5));
        let window = window();

        let err = scheduler
            .schedule(&candidate(), &backend_role(), &window, utc("2026-10-17T09:00:00Z"))
            .await
            .unwrap_err();
        assert_eq!(err, ScheduleError::WindowElapsed(window.end));
        assert_eq!(err.reason(), "window-elapsed");
        assert!(service.requests().is_empty());
    }
}
