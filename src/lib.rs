use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod notify;
pub mod rate_limiter;
pub mod rotator;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod token;
pub mod validator;

/// Outcome of one attendance submission whose token passed validation.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SubmitOutcome {
    /// Counted present: a log entry was written and the scanned count incremented.
    Accepted,
    /// The subject already has an entry for this session; nothing changed.
    AlreadyPresent,
    /// Valid token but scanned too long after issuance; flagged, not counted.
    FlaggedLate,
}
