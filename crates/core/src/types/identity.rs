//! Authenticated principal.

use serde::{Deserialize, Serialize};

use super::{Email, UserId};

/// Who is signed in, independent of what they are allowed to do.
///
/// Owned by the backend auth service; the access layer reads it and never
/// mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Auth-service user ID.
    pub id: UserId,
    /// Address the account signed up with.
    pub email: Email,
}

impl Identity {
    /// Create an identity from its parts.
    #[must_use]
    pub const fn new(id: UserId, email: Email) -> Self {
        Self { id, email }
    }
}
