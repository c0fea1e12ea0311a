use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::error::AttendanceError;
use crate::events::{SessionEvent, SessionEvents};
use crate::session::AttendanceEntry;
use crate::store::{RecordOutcome, SessionStore};
use crate::SubmitOutcome;

/// Reference late-scan threshold: a valid token scanned more than this
/// long after issuance is treated as relayed, not witnessed.
pub const DEFAULT_LATE_THRESHOLD_MS: i64 = 5_000;

/// Decides the outcome of one scan submission and applies exactly one side
/// effect: a counted log entry, a misbehaved flag, or nothing.
///
/// The late-scan rule is a heuristic deterrent against proxy marking. A
/// student who scans shortly after the token appears was plausibly looking
/// at the screen; one who scans near the end of the window more likely had
/// the code forwarded to them. It trades the occasional slow scanner for
/// making casual proxying unattractive.
#[derive(Clone)]
pub struct AttendanceValidator {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    events: SessionEvents,
    late_threshold: Duration,
}

impl AttendanceValidator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        events: SessionEvents,
        late_threshold_ms: i64,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            late_threshold: Duration::milliseconds(late_threshold_ms),
        }
    }

    /// Validates `(session, token, user)` against one snapshot of the
    /// session and applies the matching side effect.
    ///
    /// Rejections are not retryable with the same token: `NotFound` means
    /// the session id is unknown, `InvalidOrExpired` covers an ended
    /// session, a superseded token, and a token past its TTL — the caller
    /// must rescan to obtain a fresh token.
    pub async fn submit(
        &self,
        session_id: &str,
        token: &str,
        user_id: &str,
    ) -> Result<SubmitOutcome, AttendanceError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(AttendanceError::NotFound)?;

        let now = self.clock.now();
        if !session.active || token != session.current_token || session.token_expired(now) {
            return Err(AttendanceError::InvalidOrExpired);
        }

        let is_late = session.is_late(now, self.late_threshold);
        let already_present = self
            .store
            .list_attendance(session_id)
            .await?
            .iter()
            .any(|entry| entry.user_id == user_id);

        if is_late && !already_present {
            // Valid token, suspicious timing: flag instead of counting.
            if self.store.flag_misbehaved(session_id, user_id).await? {
                self.events.publish(SessionEvent::MisbehaviorFlagged {
                    session_id: session_id.to_string(),
                    user_id: user_id.to_string(),
                });
                tracing::info!(session_id, user_id, "late scan flagged");
            }
            return Ok(SubmitOutcome::FlaggedLate);
        }

        let entry = AttendanceEntry {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token: token.to_string(),
            created_at: now,
        };

        match self.store.record_attendance(session_id, entry).await? {
            RecordOutcome::Recorded => {
                self.events.publish(SessionEvent::AttendanceAccepted {
                    session_id: session_id.to_string(),
                    user_id: user_id.to_string(),
                });
                Ok(SubmitOutcome::Accepted)
            }
            // A rescan by someone already marked present is simply ignored.
            RecordOutcome::Duplicate => Ok(SubmitOutcome::AlreadyPresent),
            RecordOutcome::SessionMissing => Err(AttendanceError::NotFound),
        }
    }
}
