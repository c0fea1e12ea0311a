use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::AttendanceError;
use crate::events::{SessionEvent, SessionEvents};
use crate::session::Session;
use crate::store::SessionStore;
use crate::token::TokenGenerator;

pub const DEFAULT_TTL_SECONDS: u32 = 5;

/// Inputs for opening a new attendance window. A missing or zero TTL falls
/// back to the configured default; callers parse raw input into this type
/// before it gets anywhere near the session logic.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub subject_name: String,
    pub total_students: u32,
    pub ttl_seconds: Option<u32>,
    pub created_by: Option<String>,
}

/// What a caller needs after creating a session: the id to share and the
/// first token to display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub id: String,
    pub token: String,
}

/// Owns session creation, token rotation, and termination.
///
/// The only writer of session fields apart from the validator's scanned
/// count and misbehaved set. The lifecycle is two states: a session is
/// created active and ending it is terminal; rotation is a self-loop that
/// never touches `active`.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    tokens: TokenGenerator,
    events: SessionEvents,
    default_ttl_seconds: u32,
    token_length: usize,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        tokens: TokenGenerator,
        events: SessionEvents,
        default_ttl_seconds: u32,
        token_length: usize,
    ) -> Self {
        Self {
            store,
            clock,
            tokens,
            events,
            default_ttl_seconds: default_ttl_seconds.max(1),
            token_length,
        }
    }

    fn effective_ttl(&self, requested: Option<u32>, existing: Option<u32>) -> u32 {
        match requested {
            Some(ttl) if ttl > 0 => ttl,
            _ => existing.unwrap_or(self.default_ttl_seconds),
        }
    }

    pub async fn create_session(&self, req: CreateSession) -> Result<NewSession, AttendanceError> {
        let ttl = self.effective_ttl(req.ttl_seconds, None);
        let now = self.clock.now();
        let token = self.tokens.generate(self.token_length);
        let id = uuid::Uuid::new_v4().to_string();

        let session = Session {
            id: id.clone(),
            subject_name: req.subject_name,
            total_students: req.total_students,
            created_by: req.created_by,
            created_at: now,
            active: true,
            ttl_seconds: ttl,
            current_token: token.clone(),
            token_expires_at: now + Duration::seconds(i64::from(ttl)),
            token_issued_at: now,
            scanned_count: 0,
            misbehaved: Vec::new(),
            ended_at: None,
        };

        self.store.create_session(session).await?;
        self.events
            .publish(SessionEvent::SessionCreated { session_id: id.clone() });
        tracing::info!(session_id = %id, ttl_seconds = ttl, "session created");

        Ok(NewSession { id, token })
    }

    /// Issues a fresh token and resets the expiry window. The new TTL
    /// defaults to the session's current one when omitted or zero.
    pub async fn rotate_token(
        &self,
        id: &str,
        ttl_seconds: Option<u32>,
    ) -> Result<String, AttendanceError> {
        let session = self
            .store
            .get_session(id)
            .await?
            .ok_or(AttendanceError::NotFound)?;

        let ttl = self.effective_ttl(ttl_seconds, Some(session.ttl_seconds));
        let now = self.clock.now();
        let token = self.tokens.generate(self.token_length);
        let expires_at = now + Duration::seconds(i64::from(ttl));

        if !self
            .store
            .apply_rotation(id, &token, now, expires_at, ttl)
            .await?
        {
            return Err(AttendanceError::NotFound);
        }

        self.events
            .publish(SessionEvent::TokenRotated { session_id: id.to_string() });
        Ok(token)
    }

    /// Terminal and idempotent: the first call stamps `ended_at`, later
    /// calls change nothing. The stale token is left in place; the
    /// validator rejects on `active` regardless.
    pub async fn end_session(&self, id: &str) -> Result<(), AttendanceError> {
        let now = self.clock.now();
        match self.store.mark_ended(id, now).await? {
            None => Err(AttendanceError::NotFound),
            Some(false) => Ok(()),
            Some(true) => {
                self.events
                    .publish(SessionEvent::SessionEnded { session_id: id.to_string() });
                tracing::info!(session_id = %id, "session ended");
                Ok(())
            }
        }
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, AttendanceError> {
        Ok(self.store.get_session(id).await?)
    }

    pub async fn list_sessions(&self, page_size: usize) -> Result<Vec<Session>, AttendanceError> {
        Ok(self.store.list_recent_sessions(page_size).await?)
    }
}
