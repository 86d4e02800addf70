//! Backend service collaborators.
//!
//! The marketplace keeps identities, profiles and applications in a hosted
//! backend. The access layer reaches it through two narrow traits:
//!
//! - [`AuthSource`] - who is signed in right now
//! - [`ProfileSource`] - the profile row and role application rows
//!
//! Rows come back loosely typed ([`ProfileRow`], [`ApplicationRow`]); the
//! [`RoleResolver`](crate::resolver::RoleResolver) is the only place that
//! parses them into [`Role`] and application states.
//!
//! # Implementations
//!
//! - [`RestBackend`] - REST endpoints of the hosted backend over `reqwest`
//! - [`MemoryBackend`] - in-process fixture data, used for offline checks

mod memory;
mod rest;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use homeplate_core::{Identity, Role, UserId};

pub use memory::{FixtureUser, MemoryBackend, MemoryFixture};
pub use rest::{RestBackend, RestSession};

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("Unexpected status {status} from {endpoint}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Endpoint path that was called.
        endpoint: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A record came back in a shape we cannot use.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Endpoint URL could not be built from the base URL.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// Backend is unreachable.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Raw `profiles` row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    /// Role column as stored; may be missing or hold an unknown value.
    pub role: Option<String>,
}

/// Raw application row from one of the per-role application tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRow {
    /// Review status column as stored.
    pub status: Option<String>,
    /// Reviewer's note when the application was declined.
    pub rejection_reason: Option<String>,
}

/// Per-role application table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationTable {
    Chefs,
    KitchenPartners,
    Restaurants,
}

impl ApplicationTable {
    /// The table holding applications for `role`, if the role is vetted.
    #[must_use]
    pub const fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Chef => Some(Self::Chefs),
            Role::KitchenPartner => Some(Self::KitchenPartners),
            Role::Restaurant => Some(Self::Restaurants),
            Role::Customer | Role::Admin => None,
        }
    }

    /// Table name on the backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chefs => "chefs",
            Self::KitchenPartners => "kitchen_partners",
            Self::Restaurants => "restaurants",
        }
    }
}

/// Source of the current authenticated session.
pub trait AuthSource: Send + Sync {
    /// Read the current session. `Ok(None)` means nobody is signed in.
    fn fetch_session(&self) -> impl Future<Output = Result<Option<Identity>, BackendError>> + Send;
}

/// Source of profile and application records.
pub trait ProfileSource: Send + Sync {
    /// Read the profile row for `user`.
    fn fetch_profile(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<Option<ProfileRow>, BackendError>> + Send;

    /// Read `user`'s application row from `table`.
    fn fetch_application(
        &self,
        table: ApplicationTable,
        user: UserId,
    ) -> impl Future<Output = Result<Option<ApplicationRow>, BackendError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_table_for_role() {
        assert_eq!(
            ApplicationTable::for_role(Role::Chef),
            Some(ApplicationTable::Chefs)
        );
        assert_eq!(
            ApplicationTable::for_role(Role::KitchenPartner),
            Some(ApplicationTable::KitchenPartners)
        );
        assert_eq!(
            ApplicationTable::for_role(Role::Restaurant),
            Some(ApplicationTable::Restaurants)
        );
        assert_eq!(ApplicationTable::for_role(Role::Customer), None);
        assert_eq!(ApplicationTable::for_role(Role::Admin), None);
    }

    #[test]
    fn test_every_vetted_role_has_a_table() {
        for role in Role::ALL {
            assert_eq!(
                role.requires_application(),
                ApplicationTable::for_role(role).is_some()
            );
        }
    }
}
