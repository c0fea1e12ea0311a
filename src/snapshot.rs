//! Flat local-persistence shape for disconnected or demo operation.
//!
//! The core only ever works with `DateTime<Utc>`; this module is the one
//! boundary where timestamps become epoch milliseconds, so nothing inside
//! the crate has to branch on timestamp shapes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::session::{AttendanceEntry, Session};
use crate::store::MemoryStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub id: String,
    pub subject_name: String,
    pub total_students: u32,
    pub created_by: Option<String>,
    pub created_at_ms: i64,
    pub active: bool,
    pub ttl_seconds: u32,
    pub current_token: String,
    pub token_expires_at_ms: i64,
    pub token_issued_at_ms: i64,
    pub scanned_count: u64,
    #[serde(default)]
    pub misbehaved: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub created_at_ms: i64,
}

/// Everything the store holds, keyed by session id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub sessions: HashMap<String, PersistedSession>,
    #[serde(default)]
    pub attendance: HashMap<String, Vec<PersistedEntry>>,
}

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

impl From<&Session> for PersistedSession {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            subject_name: session.subject_name.clone(),
            total_students: session.total_students,
            created_by: session.created_by.clone(),
            created_at_ms: session.created_at.timestamp_millis(),
            active: session.active,
            ttl_seconds: session.ttl_seconds,
            current_token: session.current_token.clone(),
            token_expires_at_ms: session.token_expires_at.timestamp_millis(),
            token_issued_at_ms: session.token_issued_at.timestamp_millis(),
            scanned_count: session.scanned_count,
            misbehaved: session.misbehaved.clone(),
            ended_at_ms: session.ended_at.map(|t| t.timestamp_millis()),
        }
    }
}

impl From<&PersistedSession> for Session {
    fn from(persisted: &PersistedSession) -> Self {
        Self {
            id: persisted.id.clone(),
            subject_name: persisted.subject_name.clone(),
            total_students: persisted.total_students,
            created_by: persisted.created_by.clone(),
            created_at: ms_to_datetime(persisted.created_at_ms),
            active: persisted.active,
            ttl_seconds: persisted.ttl_seconds,
            current_token: persisted.current_token.clone(),
            token_expires_at: ms_to_datetime(persisted.token_expires_at_ms),
            token_issued_at: ms_to_datetime(persisted.token_issued_at_ms),
            scanned_count: persisted.scanned_count,
            misbehaved: persisted.misbehaved.clone(),
            ended_at: persisted.ended_at_ms.map(ms_to_datetime),
        }
    }
}

impl From<&AttendanceEntry> for PersistedEntry {
    fn from(entry: &AttendanceEntry) -> Self {
        Self {
            id: entry.id.clone(),
            user_id: entry.user_id.clone(),
            token: entry.token.clone(),
            created_at_ms: entry.created_at.timestamp_millis(),
        }
    }
}

impl From<&PersistedEntry> for AttendanceEntry {
    fn from(persisted: &PersistedEntry) -> Self {
        Self {
            id: persisted.id.clone(),
            user_id: persisted.user_id.clone(),
            token: persisted.token.clone(),
            created_at: ms_to_datetime(persisted.created_at_ms),
        }
    }
}

/// Writes the store's current contents to `path` as JSON.
pub fn save_to_path(store: &MemoryStore, path: &Path) -> Result<(), StoreError> {
    let snapshot = store.snapshot();
    let encoded = serde_json::to_vec_pretty(&snapshot)?;
    fs::write(path, encoded)?;
    Ok(())
}

/// Reloads a previously saved snapshot into `store`, replacing its
/// contents. A missing file is treated as an empty snapshot.
pub fn load_from_path(store: &MemoryStore, path: &Path) -> Result<(), StoreError> {
    if !path.exists() {
        return Ok(());
    }
    let raw = fs::read(path)?;
    let snapshot: StoreSnapshot = serde_json::from_slice(&raw)?;
    store.restore(snapshot);
    Ok(())
}
