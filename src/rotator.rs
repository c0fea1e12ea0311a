use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::AttendanceError;
use crate::manager::SessionManager;

/// Handle for one session's background rotation task.
pub struct RotationHandle {
    task: JoinHandle<()>,
}

impl RotationHandle {
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for RotationHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns the single rotation loop for one session.
///
/// Each pass sleeps for the session's current TTL and then rotates, so a
/// rotate call that changed the TTL takes effect on the following tick. A
/// failed rotation is logged and simply waited out: the session keeps
/// showing the previous token until the next tick succeeds, and the
/// token/expiry pair is never half-updated because rotation is one store
/// operation. The loop exits once the session ends or disappears.
pub fn spawn_rotation(manager: SessionManager, session_id: String) -> RotationHandle {
    let task = tokio::spawn(async move {
        loop {
            let ttl_seconds = match manager.get_session(&session_id).await {
                Ok(Some(session)) if session.active => session.ttl_seconds,
                Ok(_) => break,
                Err(err) => {
                    tracing::warn!(session_id = %session_id, error = %err, "rotation read failed, retrying next tick");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            tokio::time::sleep(Duration::from_secs(u64::from(ttl_seconds))).await;

            match manager.rotate_token(&session_id, None).await {
                Ok(_) => {}
                Err(AttendanceError::NotFound) => break,
                Err(err) => {
                    tracing::warn!(session_id = %session_id, error = %err, "rotation failed, retrying next tick");
                }
            }
        }
        tracing::debug!(session_id = %session_id, "rotation loop stopped");
    });

    RotationHandle { task }
}
