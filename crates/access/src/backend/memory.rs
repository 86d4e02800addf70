//! In-process backend backed by fixture data.
//!
//! Used for offline access checks (`hp-access check --fixture`) and tests.
//! Records are stored exactly as the hosted backend would return them, so
//! an unknown role string in a fixture exercises the same parsing path.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::Deserialize;

use homeplate_core::{Identity, UserId};

use super::{ApplicationRow, ApplicationTable, AuthSource, BackendError, ProfileRow, ProfileSource};

/// Fixture file layout.
///
/// ```json
/// {
///   "session": { "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7", "email": "ana@homeplate.app" },
///   "users": [
///     { "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7", "role": "chef",
///       "application": { "status": "under_review" } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryFixture {
    /// Signed-in identity, if any.
    #[serde(default)]
    pub session: Option<Identity>,
    /// Known accounts.
    #[serde(default)]
    pub users: Vec<FixtureUser>,
}

/// One account in a [`MemoryFixture`].
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureUser {
    /// Account ID.
    pub id: UserId,
    /// Raw role column; omit to simulate a profile without a role.
    pub role: Option<String>,
    /// Application row in the table matching `role`.
    #[serde(default)]
    pub application: Option<ApplicationRow>,
}

/// Backend holding profiles, applications and a session in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    session: RwLock<Option<Identity>>,
    profiles: RwLock<HashMap<UserId, ProfileRow>>,
    applications: RwLock<HashMap<(ApplicationTable, UserId), ApplicationRow>>,
    failing_tables: RwLock<HashSet<ApplicationTable>>,
    offline: AtomicBool,
    profile_lookups: AtomicUsize,
    application_lookups: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a backend from a parsed fixture.
    ///
    /// Application rows are filed under the table matching the user's role;
    /// rows for users whose role is missing or not vetted are dropped.
    #[must_use]
    pub fn from_fixture(fixture: MemoryFixture) -> Self {
        let backend = Self::new();
        backend.set_session(fixture.session);
        for user in fixture.users {
            let table = user
                .role
                .as_deref()
                .and_then(|role| role.parse().ok())
                .and_then(ApplicationTable::for_role);
            backend.insert_profile(user.id, ProfileRow { role: user.role });
            if let (Some(table), Some(row)) = (table, user.application) {
                backend.insert_application(table, user.id, row);
            }
        }
        backend
    }

    /// Parse a fixture from JSON.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Parse` if the JSON does not match [`MemoryFixture`].
    pub fn from_json(json: &str) -> Result<Self, BackendError> {
        let fixture: MemoryFixture = serde_json::from_str(json)?;
        Ok(Self::from_fixture(fixture))
    }

    /// Replace the signed-in identity.
    pub fn set_session(&self, identity: Option<Identity>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = identity;
    }

    /// Insert or replace a profile row.
    pub fn insert_profile(&self, user: UserId, row: ProfileRow) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user, row);
    }

    /// Insert or replace an application row.
    pub fn insert_application(&self, table: ApplicationTable, user: UserId, row: ApplicationRow) {
        self.applications
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((table, user), row);
    }

    /// Make every lookup fail with `BackendError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make lookups against one application table fail.
    pub fn fail_table(&self, table: ApplicationTable) {
        self.failing_tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table);
    }

    /// Number of profile lookups served so far.
    #[must_use]
    pub fn profile_lookups(&self) -> usize {
        self.profile_lookups.load(Ordering::SeqCst)
    }

    /// Number of application lookups served so far.
    #[must_use]
    pub fn application_lookups(&self) -> usize {
        self.application_lookups.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable("memory backend is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl AuthSource for MemoryBackend {
    async fn fetch_session(&self) -> Result<Option<Identity>, BackendError> {
        self.check_online()?;
        Ok(self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

impl ProfileSource for MemoryBackend {
    async fn fetch_profile(&self, user: UserId) -> Result<Option<ProfileRow>, BackendError> {
        self.profile_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self
            .profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user)
            .cloned())
    }

    async fn fetch_application(
        &self,
        table: ApplicationTable,
        user: UserId,
    ) -> Result<Option<ApplicationRow>, BackendError> {
        self.application_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if self
            .failing_tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&table)
        {
            return Err(BackendError::Unavailable(format!(
                "{} lookups are failing",
                table.as_str()
            )));
        }
        Ok(self
            .applications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(table, user))
            .cloned())
    }
}
