//! Application review states for vetted roles.

use serde::{Deserialize, Serialize};

/// Error returned when a status string is not a known application state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown application state: {0}")]
pub struct ApplicationStateError(pub String);

/// Review lifecycle of a chef, kitchen partner or restaurant application.
///
/// Transitions (`pending -> under_review -> approved | rejected`) happen on
/// the backend by admin action; this crate only ever reads the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationState {
    /// Submitted, not yet picked up.
    #[default]
    Pending,
    /// An admin is reviewing it.
    UnderReview,
    /// Approved; role-specific views unlock.
    Approved,
    /// Declined.
    Rejected,
}

impl ApplicationState {
    /// The snake_case name used by the backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApplicationState {
    type Err = ApplicationStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "under_review" => Ok(Self::UnderReview),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ApplicationStateError(s.to_owned())),
        }
    }
}
