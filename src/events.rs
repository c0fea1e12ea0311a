use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{channel, Receiver, Sender};

/// A session-state change worth telling observers about. Published after
/// the mutation has been applied to the store, so a subscriber re-reading
/// the session sees the new state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    SessionCreated { session_id: String },
    TokenRotated { session_id: String },
    SessionEnded { session_id: String },
    AttendanceAccepted { session_id: String, user_id: String },
    MisbehaviorFlagged { session_id: String, user_id: String },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::SessionCreated { session_id }
            | SessionEvent::TokenRotated { session_id }
            | SessionEvent::SessionEnded { session_id }
            | SessionEvent::AttendanceAccepted { session_id, .. }
            | SessionEvent::MisbehaviorFlagged { session_id, .. } => session_id,
        }
    }
}

#[derive(Clone)]
pub struct SessionEvents {
    sender: Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (sender, _) = channel(1024);
        Self { sender }
    }

    pub fn publish(&self, event: SessionEvent) {
        // A send error just means nobody is listening right now.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
