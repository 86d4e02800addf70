//! Identity to role resolution.
//!
//! [`RoleResolver`] turns an [`Identity`] into a [`Role`] plus, for vetted
//! roles, the state of the user's application. It owns two pieces of state:
//!
//! - a per-identity `moka` cache of successful resolutions
//! - the published [`AccessSnapshot`], the only value readers ever see
//!
//! # Ordering
//!
//! Each identity change takes a [`Ticket`] carrying a generation number.
//! A resolution is published only if its ticket is still the newest, so a
//! slow lookup for a previous user can never overwrite the current user's
//! snapshot, whichever network response lands first.
//!
//! # Fail-closed
//!
//! Profile lookup failures surface as [`Resolution::Failed`] and are never
//! mapped to a role. Application lookup failures resolve to `pending`, so
//! approval-gated views stay closed until a lookup succeeds.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use homeplate_core::{ApplicationState, Identity, Role, UserId};

use crate::backend::{ApplicationRow, ApplicationTable, ProfileRow, ProfileSource};
use crate::config::ResolverSettings;
use crate::error::add_breadcrumb;

/// Why a role could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveFailure {
    /// The profile lookup did not finish in time.
    #[error("role lookup timed out after {0:?}")]
    Timeout(Duration),

    /// The backend returned an error.
    #[error("role lookup failed: {0}")]
    Backend(String),

    /// The identity has no profile record.
    #[error("no profile record for user {0}")]
    ProfileMissing(UserId),

    /// The profile's role column is empty or not a known role.
    #[error("profile for user {user} has unusable role {value:?}")]
    UnknownRole {
        /// Affected user.
        user: UserId,
        /// Raw column value.
        value: Option<String>,
    },
}

/// Review state attached to a vetted role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationStatus {
    /// Current review state.
    pub state: ApplicationState,
    /// Reviewer's note; only kept for rejected applications.
    pub rejection_reason: Option<String>,
    /// `true` when the state was assumed `pending` because the record is
    /// missing or could not be read.
    pub defaulted: bool,
}

impl ApplicationStatus {
    fn fail_closed() -> Self {
        Self {
            state: ApplicationState::Pending,
            rejection_reason: None,
            defaulted: true,
        }
    }
}

/// A successfully resolved role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    /// Whose role this is.
    pub user_id: UserId,
    /// The account's role.
    pub role: Role,
    /// Application review state; `Some` exactly for vetted roles.
    pub application: Option<ApplicationStatus>,
    /// When the lookup completed.
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedRole {
    /// Review state, if the role is vetted.
    #[must_use]
    pub fn application_state(&self) -> Option<ApplicationState> {
        self.application.as_ref().map(|a| a.state)
    }
}

/// Outcome of resolving an optional identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nobody is signed in. Not an error.
    Unresolved,
    /// The role is known.
    Resolved(ResolvedRole),
    /// The role could not be determined; retryable.
    Failed(ResolveFailure),
}

impl Resolution {
    /// The resolved role, if any.
    #[must_use]
    pub const fn role(&self) -> Option<Role> {
        match self {
            Self::Resolved(resolved) => Some(resolved.role),
            Self::Unresolved | Self::Failed(_) => None,
        }
    }

    /// The application state, if the role is resolved and vetted.
    #[must_use]
    pub fn application_state(&self) -> Option<ApplicationState> {
        match self {
            Self::Resolved(resolved) => resolved.application_state(),
            Self::Unresolved | Self::Failed(_) => None,
        }
    }
}

/// What readers see: the current identity and its resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSnapshot {
    /// Bumped on every identity change and refresh.
    pub generation: u64,
    /// Identity this snapshot belongs to.
    pub identity: Option<Identity>,
    /// Resolution for `identity`; `Unresolved` while the first lookup runs.
    pub resolution: Resolution,
    /// A lookup for `identity` is in flight and nothing is known yet.
    pub loading: bool,
}

impl Default for AccessSnapshot {
    fn default() -> Self {
        Self {
            generation: 0,
            identity: None,
            resolution: Resolution::Unresolved,
            loading: false,
        }
    }
}

/// Claim on publishing the resolution for one identity change.
#[derive(Debug, Clone)]
#[must_use = "a ticket does nothing until passed to `RoleResolver::complete`"]
pub struct Ticket {
    generation: u64,
    identity: Option<Identity>,
}

impl Ticket {
    /// Generation this ticket publishes into.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Resolves roles and owns the published access snapshot.
pub struct RoleResolver<B> {
    backend: Arc<B>,
    cache: Cache<UserId, ResolvedRole>,
    settings: ResolverSettings,
    snapshot: watch::Sender<AccessSnapshot>,
}

impl<B> std::fmt::Debug for RoleResolver<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleResolver")
            .field("settings", &self.settings)
            .field("cached", &self.cache.entry_count())
            .field("snapshot", &*self.snapshot.borrow())
            .finish_non_exhaustive()
    }
}

impl<B: ProfileSource> RoleResolver<B> {
    /// Create a resolver over `backend`.
    #[must_use]
    pub fn new(backend: Arc<B>, settings: ResolverSettings) -> Self {
        let cache = Cache::builder()
            .max_capacity(settings.cache_capacity)
            .time_to_live(settings.cache_ttl)
            .build();
        let (snapshot, _) = watch::channel(AccessSnapshot::default());

        Self {
            backend,
            cache,
            settings,
            snapshot,
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> AccessSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified whenever the snapshot is replaced.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AccessSnapshot> {
        self.snapshot.subscribe()
    }

    /// Resolve the role for `identity`, using the cache when possible.
    ///
    /// Does not touch the published snapshot. Calling it twice for the same
    /// identity performs one backend lookup.
    pub async fn resolve_role(&self, identity: Option<&Identity>) -> Resolution {
        match identity {
            Some(identity) => self.resolve_user(identity.id).await,
            None => Resolution::Unresolved,
        }
    }

    /// Resolve the role for a user ID, using the cache when possible.
    ///
    /// Operator tooling uses this to inspect accounts without a session.
    #[instrument(skip(self), fields(user = %user))]
    pub async fn resolve_user(&self, user: UserId) -> Resolution {
        if let Some(cached) = self.cache.get(&user).await {
            debug!("Role cache hit");
            return Resolution::Resolved(cached);
        }

        // Concurrent callers for the same user share one lookup
        match self.cache.try_get_with(user, self.lookup(user)).await {
            Ok(resolved) => {
                self.forget_if_defaulted(&resolved).await;
                Resolution::Resolved(resolved)
            }
            Err(failure) => {
                warn!(error = %failure, "Role resolution failed");
                Resolution::Failed((*failure).clone())
            }
        }
    }

    /// Start handling an identity change.
    ///
    /// Runs synchronously so tickets are issued in the order changes occur.
    /// A different principal clears the cache and publishes a loading
    /// snapshot that carries no role; the same principal (token refresh)
    /// keeps the current resolution visible.
    pub fn begin(&self, identity: Option<Identity>) -> Ticket {
        let mut generation = 0;
        self.snapshot.send_modify(|snap| {
            let same_principal =
                snap.identity.as_ref().map(|i| i.id) == identity.as_ref().map(|i| i.id);
            if !same_principal {
                self.cache.invalidate_all();
                snap.resolution = Resolution::Unresolved;
                snap.loading = identity.is_some();
            }
            snap.generation += 1;
            snap.identity.clone_from(&identity);
            generation = snap.generation;
        });
        debug!(generation, signed_in = identity.is_some(), "Identity change began");

        Ticket {
            generation,
            identity,
        }
    }

    /// Resolve the ticket's identity and publish it if still current.
    pub async fn complete(&self, ticket: Ticket) -> Resolution {
        let resolution = self.resolve_role(ticket.identity.as_ref()).await;
        self.publish(ticket.generation, &resolution);
        resolution
    }

    /// `begin` followed by `complete`.
    pub async fn identity_changed(&self, identity: Option<Identity>) -> Resolution {
        let ticket = self.begin(identity);
        self.complete(ticket).await
    }

    /// Re-read the current identity's role from the backend and publish it.
    ///
    /// The cached entry is dropped before the generation is bumped, so a
    /// token refresh racing this call joins the fresh lookup instead of
    /// republishing the old role.
    ///
    /// Used after the user does something that changes their application
    /// state (e.g., submitting an application) and as the retry action
    /// after a failed resolution.
    pub async fn force_refresh(&self) -> Resolution {
        let current = self.snapshot.borrow().identity.as_ref().map(|i| i.id);
        if let Some(user) = current {
            self.cache.invalidate(&user).await;
        }

        let mut generation = 0;
        let mut identity = None;
        self.snapshot.send_modify(|snap| {
            snap.generation += 1;
            generation = snap.generation;
            identity.clone_from(&snap.identity);
            if matches!(snap.resolution, Resolution::Failed(_)) {
                snap.loading = true;
            }
        });
        debug!(generation, "Forced role refresh");

        let resolution = match identity {
            None => Resolution::Unresolved,
            Some(identity) => self.resolve_user(identity.id).await,
        };

        self.publish(generation, &resolution);
        resolution
    }

    /// Replace the snapshot's resolution if `generation` is still current.
    fn publish(&self, generation: u64, resolution: &Resolution) {
        let applied = self.snapshot.send_if_modified(|snap| {
            if snap.generation != generation {
                return false;
            }
            snap.resolution = resolution.clone();
            snap.loading = false;
            true
        });

        if applied {
            if let Some(role) = resolution.role() {
                add_breadcrumb("access", "Role resolved", Some(&[("role", role.as_str())]));
            }
        } else {
            debug!(generation, "Discarding superseded resolution");
        }
    }

    /// Keep fail-closed answers out of the cache so the next resolution
    /// retries the application lookup.
    async fn forget_if_defaulted(&self, resolved: &ResolvedRole) {
        if resolved.application.as_ref().is_some_and(|a| a.defaulted) {
            self.cache.invalidate(&resolved.user_id).await;
        }
    }

    /// Fetch and parse the profile, then the application if the role is vetted.
    async fn lookup(&self, user: UserId) -> Result<ResolvedRole, ResolveFailure> {
        let timeout = self.settings.lookup_timeout;
        let profile = match tokio::time::timeout(timeout, self.backend.fetch_profile(user)).await
        {
            Err(_) => return Err(ResolveFailure::Timeout(timeout)),
            Ok(Err(e)) => return Err(ResolveFailure::Backend(e.to_string())),
            Ok(Ok(None)) => return Err(ResolveFailure::ProfileMissing(user)),
            Ok(Ok(Some(row))) => row,
        };
        let role = parse_role(user, profile)?;

        let application = match ApplicationTable::for_role(role) {
            Some(table) => Some(self.lookup_application(table, user).await),
            None => None,
        };

        info!(user = %user, role = %role, "Resolved role");
        Ok(ResolvedRole {
            user_id: user,
            role,
            application,
            resolved_at: Utc::now(),
        })
    }

    async fn lookup_application(&self, table: ApplicationTable, user: UserId) -> ApplicationStatus {
        let timeout = self.settings.lookup_timeout;
        match tokio::time::timeout(timeout, self.backend.fetch_application(table, user)).await {
            Ok(Ok(Some(row))) => parse_application(table, user, row),
            // Not applied yet; re-read next time so a fresh submission shows up
            Ok(Ok(None)) => {
                debug!(table = table.as_str(), user = %user, "No application record, assuming pending");
                ApplicationStatus::fail_closed()
            }
            Ok(Err(e)) => {
                warn!(table = table.as_str(), user = %user, error = %e, "Application lookup failed, assuming pending");
                ApplicationStatus::fail_closed()
            }
            Err(_) => {
                warn!(table = table.as_str(), user = %user, "Application lookup timed out, assuming pending");
                ApplicationStatus::fail_closed()
            }
        }
    }
}

fn parse_role(user: UserId, row: ProfileRow) -> Result<Role, ResolveFailure> {
    let Some(raw) = row.role else {
        return Err(ResolveFailure::UnknownRole { user, value: None });
    };
    raw.parse::<Role>()
        .map_err(|_| ResolveFailure::UnknownRole {
            user,
            value: Some(raw),
        })
}

fn parse_application(table: ApplicationTable, user: UserId, row: ApplicationRow) -> ApplicationStatus {
    let Some(state) = row.status.as_deref().and_then(|s| s.parse::<ApplicationState>().ok()) else {
        warn!(
            table = table.as_str(),
            user = %user,
            status = ?row.status,
            "Unrecognized application status, assuming pending"
        );
        return ApplicationStatus::fail_closed();
    };

    ApplicationStatus {
        state,
        rejection_reason: if state == ApplicationState::Rejected {
            row.rejection_reason.filter(|r| !r.trim().is_empty())
        } else {
            None
        },
        defaulted: false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::future::Future;

    use homeplate_core::Email;

    use super::*;
    use crate::backend::{BackendError, MemoryBackend};

    fn identity() -> Identity {
        Identity::new(UserId::random(), Email::parse("cook@homeplate.app").unwrap())
    }

    fn resolver(backend: &Arc<MemoryBackend>) -> RoleResolver<MemoryBackend> {
        RoleResolver::new(Arc::clone(backend), ResolverSettings::default())
    }

    fn with_role(backend: &MemoryBackend, role: &str) -> Identity {
        let identity = identity();
        backend.insert_profile(
            identity.id,
            ProfileRow {
                role: Some(role.to_string()),
            },
        );
        identity
    }

    fn application(status: &str, reason: Option<&str>) -> ApplicationRow {
        ApplicationRow {
            status: Some(status.to_string()),
            rejection_reason: reason.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_no_identity_is_unresolved() {
        let backend = Arc::new(MemoryBackend::new());
        let resolver = resolver(&backend);
        assert_eq!(resolver.resolve_role(None).await, Resolution::Unresolved);
        assert_eq!(backend.profile_lookups(), 0);
    }

    #[tokio::test]
    async fn test_customer_has_no_application() {
        let backend = Arc::new(MemoryBackend::new());
        let customer = with_role(&backend, "customer");
        let resolution = resolver(&backend).resolve_role(Some(&customer)).await;

        assert_eq!(resolution.role(), Some(Role::Customer));
        assert_eq!(resolution.application_state(), None);
        assert_eq!(backend.application_lookups(), 0);
    }

    #[tokio::test]
    async fn test_second_resolution_hits_cache() {
        let backend = Arc::new(MemoryBackend::new());
        let chef = with_role(&backend, "chef");
        backend.insert_application(ApplicationTable::Chefs, chef.id, application("approved", None));
        let resolver = resolver(&backend);

        let first = resolver.resolve_role(Some(&chef)).await;
        let second = resolver.resolve_role(Some(&chef)).await;

        assert_eq!(first, second);
        assert_eq!(backend.profile_lookups(), 1);
        assert_eq!(backend.application_lookups(), 1);
    }

    #[tokio::test]
    async fn test_rejection_reason_only_for_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        let rejected = with_role(&backend, "restaurant");
        backend.insert_application(
            ApplicationTable::Restaurants,
            rejected.id,
            application("rejected", Some("Health permit expired")),
        );
        let reviewing = with_role(&backend, "restaurant");
        backend.insert_application(
            ApplicationTable::Restaurants,
            reviewing.id,
            application("under_review", Some("stale note")),
        );
        let resolver = resolver(&backend);

        let Resolution::Resolved(resolved) = resolver.resolve_role(Some(&rejected)).await else {
            panic!("expected resolved role");
        };
        let status = resolved.application.unwrap();
        assert_eq!(status.state, ApplicationState::Rejected);
        assert_eq!(status.rejection_reason.as_deref(), Some("Health permit expired"));

        let Resolution::Resolved(resolved) = resolver.resolve_role(Some(&reviewing)).await else {
            panic!("expected resolved role");
        };
        let status = resolved.application.unwrap();
        assert_eq!(status.state, ApplicationState::UnderReview);
        assert_eq!(status.rejection_reason, None);
    }

    #[tokio::test]
    async fn test_missing_application_is_pending() {
        let backend = Arc::new(MemoryBackend::new());
        let partner = with_role(&backend, "kitchen_partner");
        let resolution = resolver(&backend).resolve_role(Some(&partner)).await;
        let Resolution::Resolved(resolved) = resolution else {
            panic!("expected resolved role");
        };
        let status = resolved.application.unwrap();
        assert_eq!(status.state, ApplicationState::Pending);
        assert!(status.defaulted);
    }

    #[tokio::test]
    async fn test_failed_application_lookup_fails_closed_and_is_not_cached() {
        let backend = Arc::new(MemoryBackend::new());
        let chef = with_role(&backend, "chef");
        backend.insert_application(ApplicationTable::Chefs, chef.id, application("approved", None));
        backend.fail_table(ApplicationTable::Chefs);
        let resolver = resolver(&backend);

        let resolution = resolver.resolve_role(Some(&chef)).await;
        assert_eq!(resolution.role(), Some(Role::Chef));
        assert_eq!(resolution.application_state(), Some(ApplicationState::Pending));

        resolver.resolve_role(Some(&chef)).await;
        assert_eq!(backend.profile_lookups(), 2);
    }

    #[tokio::test]
    async fn test_unrecognized_status_fails_closed() {
        let backend = Arc::new(MemoryBackend::new());
        let chef = with_role(&backend, "chef");
        backend.insert_application(ApplicationTable::Chefs, chef.id, application("APPROVED!", None));

        let resolution = resolver(&backend).resolve_role(Some(&chef)).await;
        assert_eq!(resolution.application_state(), Some(ApplicationState::Pending));
    }

    #[tokio::test]
    async fn test_profile_failures_are_not_roles() {
        let backend = Arc::new(MemoryBackend::new());
        let resolver = resolver(&backend);

        let stranger = identity();
        assert_eq!(
            resolver.resolve_role(Some(&stranger)).await,
            Resolution::Failed(ResolveFailure::ProfileMissing(stranger.id))
        );

        let odd = with_role(&backend, "superuser");
        assert!(matches!(
            resolver.resolve_role(Some(&odd)).await,
            Resolution::Failed(ResolveFailure::UnknownRole { value: Some(v), .. }) if v == "superuser"
        ));

        let customer = with_role(&backend, "customer");
        backend.set_offline(true);
        assert!(matches!(
            resolver.resolve_role(Some(&customer)).await,
            Resolution::Failed(ResolveFailure::Backend(_))
        ));

        // Failures are not cached: once back online the lookup succeeds
        backend.set_offline(false);
        assert_eq!(
            resolver.resolve_role(Some(&customer)).await.role(),
            Some(Role::Customer)
        );
    }

    struct StalledBackend;

    impl ProfileSource for StalledBackend {
        fn fetch_profile(
            &self,
            _user: UserId,
        ) -> impl Future<Output = Result<Option<ProfileRow>, BackendError>> + Send {
            std::future::pending()
        }

        fn fetch_application(
            &self,
            _table: ApplicationTable,
            _user: UserId,
        ) -> impl Future<Output = Result<Option<ApplicationRow>, BackendError>> + Send {
            std::future::pending()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_failure() {
        let settings = ResolverSettings {
            lookup_timeout: Duration::from_secs(2),
            ..ResolverSettings::default()
        };
        let resolver = RoleResolver::new(Arc::new(StalledBackend), settings);

        assert_eq!(
            resolver.resolve_role(Some(&identity())).await,
            Resolution::Failed(ResolveFailure::Timeout(Duration::from_secs(2)))
        );
    }

    struct SlowApplications {
        profiles: MemoryBackend,
    }

    impl ProfileSource for SlowApplications {
        fn fetch_profile(
            &self,
            user: UserId,
        ) -> impl Future<Output = Result<Option<ProfileRow>, BackendError>> + Send {
            self.profiles.fetch_profile(user)
        }

        fn fetch_application(
            &self,
            _table: ApplicationTable,
            _user: UserId,
        ) -> impl Future<Output = Result<Option<ApplicationRow>, BackendError>> + Send {
            std::future::pending()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_application_timeout_fails_closed() {
        let profiles = MemoryBackend::new();
        let chef = with_role(&profiles, "chef");
        let settings = ResolverSettings {
            lookup_timeout: Duration::from_secs(2),
            ..ResolverSettings::default()
        };
        let resolver = RoleResolver::new(Arc::new(SlowApplications { profiles }), settings);

        let Resolution::Resolved(resolved) = resolver.resolve_role(Some(&chef)).await else {
            panic!("expected resolved role");
        };
        assert_eq!(resolved.role, Role::Chef);
        let status = resolved.application.unwrap();
        assert_eq!(status.state, ApplicationState::Pending);
        assert!(status.defaulted);
    }

    #[tokio::test]
    async fn test_begin_hides_previous_users_role() {
        let backend = Arc::new(MemoryBackend::new());
        let admin = with_role(&backend, "admin");
        let customer = with_role(&backend, "customer");
        let resolver = resolver(&backend);

        resolver.identity_changed(Some(admin)).await;
        assert_eq!(resolver.snapshot().resolution.role(), Some(Role::Admin));

        let ticket = resolver.begin(Some(customer.clone()));
        let snap = resolver.snapshot();
        assert!(snap.loading);
        assert_eq!(snap.resolution, Resolution::Unresolved);
        assert_eq!(snap.identity, Some(customer));

        resolver.complete(ticket).await;
        let snap = resolver.snapshot();
        assert!(!snap.loading);
        assert_eq!(snap.resolution.role(), Some(Role::Customer));
    }

    #[tokio::test]
    async fn test_stale_ticket_is_discarded() {
        let backend = Arc::new(MemoryBackend::new());
        let first = with_role(&backend, "chef");
        let second = with_role(&backend, "customer");
        let resolver = resolver(&backend);

        let stale = resolver.begin(Some(first));
        let current = resolver.begin(Some(second.clone()));
        assert!(current.generation() > stale.generation());

        // The stale lookup finishes first and must not publish
        assert_eq!(resolver.complete(stale).await.role(), Some(Role::Chef));
        assert!(resolver.snapshot().loading);
        assert_eq!(resolver.snapshot().resolution, Resolution::Unresolved);

        resolver.complete(current).await;
        let snap = resolver.snapshot();
        assert_eq!(snap.identity, Some(second));
        assert_eq!(snap.resolution.role(), Some(Role::Customer));
    }

    #[tokio::test]
    async fn test_sign_out_publishes_unresolved() {
        let backend = Arc::new(MemoryBackend::new());
        let chef = with_role(&backend, "chef");
        let resolver = resolver(&backend);

        resolver.identity_changed(Some(chef)).await;
        let ticket = resolver.begin(None);
        assert!(!resolver.snapshot().loading);
        assert_eq!(resolver.complete(ticket).await, Resolution::Unresolved);
        assert_eq!(resolver.snapshot().identity, None);
    }

    #[tokio::test]
    async fn test_force_refresh_sees_approval() {
        let backend = Arc::new(MemoryBackend::new());
        let chef = with_role(&backend, "chef");
        backend.insert_application(ApplicationTable::Chefs, chef.id, application("pending", None));
        let resolver = resolver(&backend);

        resolver.identity_changed(Some(chef.clone())).await;
        assert_eq!(
            resolver.snapshot().resolution.application_state(),
            Some(ApplicationState::Pending)
        );

        backend.insert_application(ApplicationTable::Chefs, chef.id, application("approved", None));
        // Cached until explicitly refreshed
        assert_eq!(
            resolver.resolve_role(Some(&chef)).await.application_state(),
            Some(ApplicationState::Pending)
        );

        resolver.force_refresh().await;
        assert_eq!(
            resolver.snapshot().resolution.application_state(),
            Some(ApplicationState::Approved)
        );
        assert_eq!(
            resolver.resolve_role(Some(&chef)).await.application_state(),
            Some(ApplicationState::Approved)
        );
    }

    #[tokio::test]
    async fn test_token_refresh_keeps_resolution_visible() {
        let backend = Arc::new(MemoryBackend::new());
        let chef = with_role(&backend, "chef");
        backend.insert_application(ApplicationTable::Chefs, chef.id, application("approved", None));
        let resolver = resolver(&backend);

        resolver.identity_changed(Some(chef.clone())).await;
        let ticket = resolver.begin(Some(chef.clone()));
        let snap = resolver.snapshot();
        assert!(!snap.loading);
        assert_eq!(snap.resolution.role(), Some(Role::Chef));

        resolver.complete(ticket).await;
        // Served from cache
        assert_eq!(backend.profile_lookups(), 1);
    }
}
