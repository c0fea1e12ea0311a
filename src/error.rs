use thiserror::Error;

/// Failures originating in the backing store.
///
/// `Unavailable` is the only transient class in the crate; callers retry it
/// at their own natural cadence (next rotation tick, next poll) and never
/// in a tight loop.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Business outcomes of session and attendance operations.
///
/// `NotFound` and `InvalidOrExpired` are deterministic decisions, not
/// transient faults: retrying with the same inputs yields the same answer,
/// so callers must branch on them rather than retry.
#[derive(Debug, Error)]
pub enum AttendanceError {
    /// The referenced session does not exist.
    #[error("not-found")]
    NotFound,

    /// Token mismatch, session ended, or token past its expiry.
    #[error("invalid-or-expired")]
    InvalidOrExpired,

    #[error(transparent)]
    Store(#[from] StoreError),
}
