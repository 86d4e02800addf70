//! Current authenticated identity.
//!
//! [`SessionStore`] is the single source of truth for who is signed in. It
//! knows nothing about roles; the resolver subscribes to it through
//! [`SessionStore::on_identity_change`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use homeplate_core::Identity;

use crate::backend::AuthSource;
use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};

/// Session transition reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user signed in.
    SignedIn(Identity),
    /// The user signed out or the session expired.
    SignedOut,
    /// The access token was refreshed for the same user.
    TokenRefreshed(Identity),
    /// Account details (e.g., email) changed.
    UserUpdated(Identity),
}

impl AuthEvent {
    fn into_identity(self) -> Option<Identity> {
        match self {
            Self::SignedIn(identity) | Self::TokenRefreshed(identity) | Self::UserUpdated(identity) => {
                Some(identity)
            }
            Self::SignedOut => None,
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "signed_in",
            Self::SignedOut => "signed_out",
            Self::TokenRefreshed(_) => "token_refreshed",
            Self::UserUpdated(_) => "user_updated",
        }
    }
}

/// What listeners receive on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityChange {
    /// Identity before the transition.
    pub previous: Option<Identity>,
    /// Identity after the transition.
    pub current: Option<Identity>,
}

impl IdentityChange {
    /// Whether the signed-in principal is different (not just re-issued).
    #[must_use]
    pub fn principal_changed(&self) -> bool {
        self.previous.as_ref().map(|i| i.id) != self.current.as_ref().map(|i| i.id)
    }
}

/// Handle for removing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&IdentityChange) + Send + Sync>;

/// Holds the current identity and fans transitions out to listeners.
pub struct SessionStore {
    identity: watch::Sender<Option<Identity>>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    // Serializes transitions so listeners observe them in the order applied
    transition: Mutex<()>,
    lookup_timeout: Duration,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("identity", &*self.identity.borrow())
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create an empty store (nobody signed in).
    ///
    /// `lookup_timeout` bounds [`refresh`](Self::refresh).
    #[must_use]
    pub fn new(lookup_timeout: Duration) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            identity,
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            transition: Mutex::new(()),
            lookup_timeout,
        }
    }

    /// Last known identity. Never blocks on the network.
    #[must_use]
    pub fn current_identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    /// Receiver that sees every identity the store publishes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }

    /// Register a listener called on every transition.
    ///
    /// Listeners run synchronously inside [`apply`](Self::apply), in
    /// registration order, and must not call `apply` themselves.
    pub fn on_identity_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&IdentityChange) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Register a listener and call it once with the current identity.
    ///
    /// No transition can run between the replay and the registration, so
    /// the listener never sees an identity older than one it already saw.
    pub fn on_identity_change_replay<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&IdentityChange) + Send + Sync + 'static,
    {
        let _guard = self
            .transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current = self.current_identity();
        listener(&IdentityChange {
            previous: current.clone(),
            current,
        });
        self.on_identity_change(listener)
    }

    /// Unregister a listener. Returns `false` if it was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Record a transition reported by the auth service and notify listeners.
    ///
    /// Every call notifies every listener, including token refreshes that
    /// keep the same identity.
    pub fn apply(&self, event: AuthEvent) {
        let _guard = self
            .transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let label = event.label();
        let current = event.into_identity();
        let previous = self.identity.send_replace(current.clone());

        match &current {
            Some(identity) => {
                set_sentry_user(identity);
                info!(event = label, user = %identity.id, "Session transition");
            }
            None => {
                clear_sentry_user();
                info!(event = label, "Session transition");
            }
        }
        add_breadcrumb("session", label, None);

        let change = IdentityChange { previous, current };
        // Clone the list so listeners may register or remove listeners
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&change);
        }
    }

    /// Re-read the session from the auth service.
    ///
    /// A different principal is applied as a sign-in or sign-out. If the
    /// service cannot be reached in time, the failure is logged and the
    /// cached identity is returned unchanged.
    pub async fn refresh<A: AuthSource>(&self, source: &A) -> Option<Identity> {
        let fetched = match tokio::time::timeout(self.lookup_timeout, source.fetch_session()).await
        {
            Ok(Ok(identity)) => identity,
            Ok(Err(e)) => {
                warn!(error = %e, "Session refresh failed, keeping cached identity");
                return self.current_identity();
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.lookup_timeout.as_millis(),
                    "Session refresh timed out, keeping cached identity"
                );
                return self.current_identity();
            }
        };

        if fetched == self.current_identity() {
            debug!("Session unchanged after refresh");
            return fetched;
        }

        match fetched.clone() {
            Some(identity) => self.apply(AuthEvent::SignedIn(identity)),
            None => self.apply(AuthEvent::SignedOut),
        }
        fetched
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(crate::config::ResolverSettings::default().lookup_timeout)
    }
}
