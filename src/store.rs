use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::StoreError;
use crate::session::{AttendanceEntry, Session};
use crate::snapshot::StoreSnapshot;

/// Result of trying to record one accepted scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Entry appended and scanned count incremented, as one atomic step.
    Recorded,
    /// The subject already had an entry; nothing was written.
    Duplicate,
    /// The session does not exist.
    SessionMissing,
}

/// Durable keyed storage for sessions and their attendance logs.
///
/// The mutation surface is a closed set of operations rather than a
/// generic read-modify-write, so every implementation can make each one
/// atomic per session. Sessions are never deleted through this trait.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> Result<(), StoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Installs a freshly issued token. Returns false when the session is
    /// unknown. Touches only the token fields and the TTL.
    async fn apply_rotation(
        &self,
        id: &str,
        token: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        ttl_seconds: u32,
    ) -> Result<bool, StoreError>;

    /// Flips `active` to false and stamps `ended_at`, once. Returns
    /// `None` when the session is unknown, `Some(false)` when it had
    /// already ended (the original stamp is kept), `Some(true)` otherwise.
    async fn mark_ended(
        &self,
        id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<bool>, StoreError>;

    /// Appends an entry and increments the scanned count together, unless
    /// the subject already has an entry. The duplicate check, the append,
    /// and the increment happen under one per-session critical section so
    /// the count and the log can never diverge.
    async fn record_attendance(
        &self,
        id: &str,
        entry: AttendanceEntry,
    ) -> Result<RecordOutcome, StoreError>;

    /// Adds a subject to the misbehaved set. Idempotent; returns true only
    /// when the subject was newly added.
    async fn flag_misbehaved(&self, id: &str, user_id: &str) -> Result<bool, StoreError>;

    /// Attendance entries for a session, newest first.
    async fn list_attendance(&self, id: &str) -> Result<Vec<AttendanceEntry>, StoreError>;

    /// Recent sessions, newest `created_at` first, bounded to `limit`.
    async fn list_recent_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError>;
}

struct SessionSlot {
    session: Session,
    log: Vec<AttendanceEntry>,
}

/// In-process store. Each session and its log live in one map slot, and
/// every mutation runs while holding that slot's shard lock, which gives
/// the per-session atomicity the trait demands without a global lock.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slots: Arc<DashMap<String, SessionSlot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Flattens the store into the epoch-millisecond snapshot shape used
    /// for local persistence.
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut sessions = HashMap::new();
        let mut attendance = HashMap::new();

        for slot in self.slots.iter() {
            sessions.insert(slot.key().clone(), (&slot.session).into());
            if !slot.log.is_empty() {
                attendance.insert(
                    slot.key().clone(),
                    slot.log.iter().map(Into::into).collect(),
                );
            }
        }

        StoreSnapshot {
            sessions,
            attendance,
        }
    }

    /// Loads a snapshot, replacing whatever the store currently holds.
    pub fn restore(&self, snapshot: StoreSnapshot) {
        self.slots.clear();
        let StoreSnapshot {
            sessions,
            mut attendance,
        } = snapshot;

        for (id, persisted) in sessions {
            let log = attendance
                .remove(&id)
                .map(|entries| entries.iter().map(Into::into).collect())
                .unwrap_or_default();
            self.slots.insert(
                id,
                SessionSlot {
                    session: (&persisted).into(),
                    log,
                },
            );
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: Session) -> Result<(), StoreError> {
        self.slots.insert(
            session.id.clone(),
            SessionSlot {
                session,
                log: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.slots.get(id).map(|slot| slot.session.clone()))
    }

    async fn apply_rotation(
        &self,
        id: &str,
        token: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        ttl_seconds: u32,
    ) -> Result<bool, StoreError> {
        match self.slots.get_mut(id) {
            Some(mut slot) => {
                let session = &mut slot.session;
                session.current_token = token.to_string();
                session.token_issued_at = issued_at;
                session.token_expires_at = expires_at;
                session.ttl_seconds = ttl_seconds;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_ended(
        &self,
        id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<bool>, StoreError> {
        match self.slots.get_mut(id) {
            Some(mut slot) => {
                if !slot.session.active {
                    return Ok(Some(false));
                }
                slot.session.active = false;
                slot.session.ended_at = Some(ended_at);
                Ok(Some(true))
            }
            None => Ok(None),
        }
    }

    async fn record_attendance(
        &self,
        id: &str,
        entry: AttendanceEntry,
    ) -> Result<RecordOutcome, StoreError> {
        match self.slots.get_mut(id) {
            Some(mut slot) => {
                if slot.log.iter().any(|e| e.user_id == entry.user_id) {
                    return Ok(RecordOutcome::Duplicate);
                }
                slot.log.insert(0, entry);
                slot.session.scanned_count += 1;
                Ok(RecordOutcome::Recorded)
            }
            None => Ok(RecordOutcome::SessionMissing),
        }
    }

    async fn flag_misbehaved(&self, id: &str, user_id: &str) -> Result<bool, StoreError> {
        match self.slots.get_mut(id) {
            Some(mut slot) => {
                if slot.session.misbehaved.iter().any(|u| u == user_id) {
                    return Ok(false);
                }
                slot.session.misbehaved.push(user_id.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_attendance(&self, id: &str) -> Result<Vec<AttendanceEntry>, StoreError> {
        Ok(self
            .slots
            .get(id)
            .map(|slot| slot.log.clone())
            .unwrap_or_default())
    }

    async fn list_recent_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self
            .slots
            .iter()
            .map(|slot| slot.session.clone())
            .collect();

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit);
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(id: &str, created_at: DateTime<Utc>) -> Session {
        Session {
            id: id.to_string(),
            subject_name: "Algorithms".to_string(),
            total_students: 30,
            created_by: None,
            created_at,
            active: true,
            ttl_seconds: 5,
            current_token: "tok".to_string(),
            token_expires_at: created_at + Duration::seconds(5),
            token_issued_at: created_at,
            scanned_count: 0,
            misbehaved: Vec::new(),
            ended_at: None,
        }
    }

    fn entry(user_id: &str, at: DateTime<Utc>) -> AttendanceEntry {
        AttendanceEntry {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token: "tok".to_string(),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn record_attendance_pairs_entry_with_count() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.create_session(session("s1", now)).await.unwrap();

        let outcome = store.record_attendance("s1", entry("R001", now)).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Recorded);

        let s = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(s.scanned_count, 1);
        assert_eq!(store.list_attendance("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_attendance_rejects_duplicate_user() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.create_session(session("s1", now)).await.unwrap();

        store.record_attendance("s1", entry("R001", now)).await.unwrap();
        let outcome = store.record_attendance("s1", entry("R001", now)).await.unwrap();

        assert_eq!(outcome, RecordOutcome::Duplicate);
        let s = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(s.scanned_count, 1);
        assert_eq!(store.list_attendance("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn flag_misbehaved_is_idempotent() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.create_session(session("s1", now)).await.unwrap();

        assert!(store.flag_misbehaved("s1", "R007").await.unwrap());
        assert!(!store.flag_misbehaved("s1", "R007").await.unwrap());

        let s = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(s.misbehaved, vec!["R007".to_string()]);
    }

    #[tokio::test]
    async fn mark_ended_keeps_first_stamp() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.create_session(session("s1", now)).await.unwrap();

        let first = now + Duration::seconds(10);
        let second = now + Duration::seconds(20);

        assert_eq!(store.mark_ended("s1", first).await.unwrap(), Some(true));
        assert_eq!(store.mark_ended("s1", second).await.unwrap(), Some(false));

        let s = store.get_session("s1").await.unwrap().unwrap();
        assert!(!s.active);
        assert_eq!(s.ended_at, Some(first));
    }

    #[tokio::test]
    async fn mark_ended_reports_missing_session() {
        let store = MemoryStore::new();
        assert_eq!(store.mark_ended("nope", Utc::now()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_attendance_is_newest_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.create_session(session("s1", now)).await.unwrap();

        store.record_attendance("s1", entry("R001", now)).await.unwrap();
        store
            .record_attendance("s1", entry("R002", now + Duration::seconds(1)))
            .await
            .unwrap();

        let log = store.list_attendance("s1").await.unwrap();
        assert_eq!(log[0].user_id, "R002");
        assert_eq!(log[1].user_id, "R001");
    }

    #[tokio::test]
    async fn list_recent_sessions_orders_and_bounds() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store.create_session(session("old", now - Duration::minutes(10))).await.unwrap();
        store.create_session(session("mid", now - Duration::minutes(5))).await.unwrap();
        store.create_session(session("new", now)).await.unwrap();

        let listed = store.list_recent_sessions(2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "new");
        assert_eq!(listed[1].id, "mid");
    }
}
