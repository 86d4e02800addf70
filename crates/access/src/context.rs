//! Wiring between the session, the resolver and the router.
//!
//! [`AccessContext`] is built once at startup and handed to whatever renders
//! routes. There is no global: two contexts over two backends are fully
//! independent.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

use homeplate_core::{ApplicationState, Role};

use crate::backend::ProfileSource;
use crate::config::RedirectTargets;
use crate::error::{AccessError, Result};
use crate::gate::{AccessPolicy, Decision, decide};
use crate::resolver::{AccessSnapshot, Resolution, RoleResolver};
use crate::routes::{RouteError, RouteTable};
use crate::session::{ListenerId, SessionStore};

/// What a view needs to know about the current user for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccess {
    /// Gate decision; `None` while a non-public route waits for the
    /// first resolution.
    pub decision: Option<Decision>,
    /// Resolved role, if any.
    pub role: Option<Role>,
    /// Application state for vetted roles.
    pub application_state: Option<ApplicationState>,
    /// A resolution is in flight and nothing is known yet.
    pub loading: bool,
}

impl ResolvedAccess {
    /// Evaluate `policy` against a published snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &AccessSnapshot, policy: &AccessPolicy) -> Self {
        let decision = if snapshot.loading && *policy != AccessPolicy::Public {
            None
        } else {
            Some(decide(&snapshot.resolution, policy))
        };

        Self {
            decision,
            role: snapshot.resolution.role(),
            application_state: snapshot.resolution.application_state(),
            loading: snapshot.loading,
        }
    }

    /// Whether the view should render now.
    #[must_use]
    pub fn renders(&self) -> bool {
        self.decision == Some(Decision::Render)
    }
}

/// Session store, resolver, routes and redirect targets for one app.
pub struct AccessContext<B, C> {
    session: Arc<SessionStore>,
    resolver: Arc<RoleResolver<B>>,
    routes: RouteTable<C>,
    redirects: RedirectTargets,
    listener: Mutex<Option<ListenerId>>,
}

impl<B, C: std::fmt::Debug> std::fmt::Debug for AccessContext<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessContext")
            .field("session", &self.session)
            .field("resolver", &self.resolver)
            .field("routes", &self.routes.len())
            .field("redirects", &self.redirects)
            .finish_non_exhaustive()
    }
}

impl<B, C> AccessContext<B, C>
where
    B: ProfileSource + 'static,
{
    /// Assemble a context. Nothing happens until [`attach`](Self::attach).
    #[must_use]
    pub fn new(
        session: Arc<SessionStore>,
        resolver: Arc<RoleResolver<B>>,
        routes: RouteTable<C>,
        redirects: RedirectTargets,
    ) -> Self {
        Self {
            session,
            resolver,
            routes,
            redirects,
            listener: Mutex::new(None),
        }
    }

    /// Start resolving roles for every session transition.
    ///
    /// The current identity is resolved immediately. Each later transition
    /// takes its ticket synchronously, in event order, and the lookup runs
    /// on the Tokio runtime that called `attach`. Calling `attach` again
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::NoRuntime` when called outside a Tokio runtime.
    pub fn attach(&self) -> Result<ListenerId> {
        let mut listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = *listener {
            return Ok(id);
        }

        let handle = Handle::try_current().map_err(|_| AccessError::NoRuntime)?;
        let resolver = Arc::clone(&self.resolver);

        let id = self.session.on_identity_change_replay(move |change| {
            let ticket = resolver.begin(change.current.clone());
            let resolver = Arc::clone(&resolver);
            handle.spawn(async move {
                resolver.complete(ticket).await;
            });
        });

        info!("Access context attached to session");
        *listener = Some(id);
        Ok(id)
    }

    /// Stop following the session. The last snapshot stays published.
    pub fn detach(&self) -> bool {
        let id = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        id.is_some_and(|id| {
            debug!("Access context detached from session");
            self.session.remove_listener(id)
        })
    }

    /// Access to `path` for the current user.
    ///
    /// # Errors
    ///
    /// Returns `RouteError::NotFound` if `path` is not registered.
    pub fn resolved_access(&self, path: &str) -> std::result::Result<ResolvedAccess, RouteError> {
        let policy = self.routes.policy_for(path)?;
        Ok(ResolvedAccess::from_snapshot(&self.resolver.snapshot(), &policy))
    }

    /// Where the router should send a navigation to `path`, or `None` to
    /// render it (or keep showing the loading state).
    ///
    /// # Errors
    ///
    /// Returns `RouteError::NotFound` if `path` is not registered.
    pub fn redirect_for(&self, path: &str) -> std::result::Result<Option<String>, RouteError> {
        let access = self.resolved_access(path)?;
        Ok(access
            .decision
            .and_then(|decision| decision.redirect_path(&self.redirects, path)))
    }

    /// Retry after a failed resolution, or pick up an application state
    /// change, by re-reading the role from the backend.
    pub async fn retry(&self) -> Resolution {
        self.resolver.force_refresh().await
    }

    /// Wait until no resolution is loading and return the snapshot.
    pub async fn settled(&self) -> AccessSnapshot {
        let mut rx = self.resolver.subscribe();
        // The sender lives in `self.resolver`, so the channel cannot close here
        rx.wait_for(|snap| !snap.loading)
            .await
            .map_or_else(|_| self.resolver.snapshot(), |snap| snap.clone())
    }

    /// Receiver notified whenever the published snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AccessSnapshot> {
        self.resolver.subscribe()
    }

    /// Session store this context follows.
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Resolver this context publishes through.
    #[must_use]
    pub const fn resolver(&self) -> &Arc<RoleResolver<B>> {
        &self.resolver
    }

    /// Registered routes.
    #[must_use]
    pub const fn routes(&self) -> &RouteTable<C> {
        &self.routes
    }

    /// Redirect destinations.
    #[must_use]
    pub const fn redirects(&self) -> &RedirectTargets {
        &self.redirects
    }
}

impl<B, C> Drop for AccessContext<B, C> {
    fn drop(&mut self) {
        let id = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = id {
            self.session.remove_listener(id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use homeplate_core::{Email, Identity, UserId};

    use super::*;
    use crate::backend::{ApplicationRow, ApplicationTable, MemoryBackend, ProfileRow};
    use crate::catalog::marketplace_routes;
    use crate::config::ResolverSettings;
    use crate::session::AuthEvent;

    fn context(backend: &Arc<MemoryBackend>) -> AccessContext<MemoryBackend, &'static str> {
        AccessContext::new(
            Arc::new(SessionStore::default()),
            Arc::new(RoleResolver::new(Arc::clone(backend), ResolverSettings::default())),
            marketplace_routes().unwrap(),
            RedirectTargets::default(),
        )
    }

    fn chef(backend: &MemoryBackend, status: &str) -> Identity {
        let identity = Identity::new(UserId::random(), Email::parse("chef@homeplate.app").unwrap());
        backend.insert_profile(
            identity.id,
            ProfileRow {
                role: Some("chef".to_string()),
            },
        );
        backend.insert_application(
            ApplicationTable::Chefs,
            identity.id,
            ApplicationRow {
                status: Some(status.to_string()),
                rejection_reason: None,
            },
        );
        identity
    }

    #[test]
    fn test_attach_requires_runtime() {
        let backend = Arc::new(MemoryBackend::new());
        assert!(matches!(context(&backend).attach(), Err(AccessError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_loading_then_render() {
        let backend = Arc::new(MemoryBackend::new());
        let ctx = context(&backend);
        ctx.attach().unwrap();

        ctx.session().apply(AuthEvent::SignedIn(chef(&backend, "approved")));

        // The lookup has not run yet on this single-threaded runtime
        let access = ctx.resolved_access("/chef/dashboard").unwrap();
        assert!(access.loading);
        assert_eq!(access.decision, None);
        assert_eq!(
            ctx.resolved_access("/menu").unwrap().decision,
            Some(Decision::Render)
        );

        ctx.settled().await;
        let access = ctx.resolved_access("/chef/dashboard").unwrap();
        assert!(!access.loading);
        assert!(access.renders());
        assert_eq!(access.role, Some(Role::Chef));
        assert_eq!(access.application_state, Some(ApplicationState::Approved));
    }

    #[tokio::test]
    async fn test_attach_resolves_existing_session() {
        let backend = Arc::new(MemoryBackend::new());
        let ctx = context(&backend);
        ctx.session().apply(AuthEvent::SignedIn(chef(&backend, "approved")));

        ctx.attach().unwrap();
        ctx.settled().await;
        assert_eq!(ctx.resolver().snapshot().resolution.role(), Some(Role::Chef));
    }

    #[tokio::test]
    async fn test_redirects() {
        let backend = Arc::new(MemoryBackend::new());
        let ctx = context(&backend);
        ctx.attach().unwrap();
        ctx.settled().await;

        assert_eq!(
            ctx.redirect_for("/chef/dashboard").unwrap().as_deref(),
            Some("/auth?next=%2Fchef%2Fdashboard")
        );

        ctx.session().apply(AuthEvent::SignedIn(chef(&backend, "under_review")));
        ctx.settled().await;
        assert_eq!(
            ctx.redirect_for("/chef/dashboard").unwrap().as_deref(),
            Some("/application-status?state=under_review")
        );
        assert_eq!(
            ctx.redirect_for("/admin").unwrap().as_deref(),
            Some("/chef/dashboard")
        );
        assert_eq!(ctx.redirect_for("/").unwrap(), None);
        assert!(ctx.redirect_for("/nowhere").is_err());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_failure() {
        let backend = Arc::new(MemoryBackend::new());
        let ctx = context(&backend);
        ctx.attach().unwrap();

        backend.set_offline(true);
        ctx.session().apply(AuthEvent::SignedIn(chef(&backend, "approved")));
        ctx.settled().await;

        let decision = ctx.resolved_access("/chef/dashboard").unwrap().decision.unwrap();
        assert!(decision.is_retryable());

        backend.set_offline(false);
        assert_eq!(ctx.retry().await.role(), Some(Role::Chef));
        assert!(ctx.resolved_access("/chef/dashboard").unwrap().renders());
    }

    #[tokio::test]
    async fn test_detach_stops_following() {
        let backend = Arc::new(MemoryBackend::new());
        let ctx = context(&backend);
        ctx.attach().unwrap();
        ctx.settled().await;
        assert!(ctx.detach());
        assert!(!ctx.detach());

        let before = ctx.resolver().snapshot().generation;
        ctx.session().apply(AuthEvent::SignedIn(chef(&backend, "approved")));
        assert_eq!(ctx.resolver().snapshot().generation, before);
    }
}
