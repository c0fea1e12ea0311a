use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::config::AttendanceConfig;
use crate::error::AttendanceError;
use crate::events::SessionEvents;
use crate::manager::SessionManager;
use crate::rotator::RotationHandle;
use crate::session::AttendanceEntry;
use crate::store::{MemoryStore, SessionStore};
use crate::token::TokenGenerator;
use crate::validator::AttendanceValidator;

/// Everything the server shares across requests: the store, the two core
/// components wired to it, the event stream, and the handles of
/// server-side rotation loops keyed by session id.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub manager: SessionManager,
    pub validator: AttendanceValidator,
    pub events: SessionEvents,
    pub rotations: Arc<DashMap<String, RotationHandle>>,
}

impl AppState {
    pub fn new(config: &AttendanceConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Same wiring with an injected clock; integration tests pin time
    /// through this.
    pub fn with_clock(config: &AttendanceConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let events = SessionEvents::new();
        let tokens = TokenGenerator::new();

        let manager = SessionManager::new(
            store.clone(),
            clock.clone(),
            tokens,
            events.clone(),
            config.default_ttl_seconds,
            config.token_length,
        );
        let validator = AttendanceValidator::new(
            store.clone(),
            clock,
            events.clone(),
            config.late_threshold_ms,
        );

        Self {
            store,
            manager,
            validator,
            events,
            rotations: Arc::new(DashMap::new()),
        }
    }

    /// Attendance log for a session, newest first.
    pub async fn list_attendance(
        &self,
        session_id: &str,
    ) -> Result<Vec<AttendanceEntry>, AttendanceError> {
        Ok(self.store.list_attendance(session_id).await?)
    }

    /// Stops and forgets the rotation loop for a session, if one runs here.
    pub fn stop_rotation(&self, session_id: &str) {
        if let Some((_, handle)) = self.rotations.remove(session_id) {
            handle.stop();
        }
    }
}
