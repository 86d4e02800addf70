//! Integration test support for the Homeplate access layer.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p homeplate-integration-tests
//! ```
//!
//! No external services are needed: [`FakeBackend`] serves the backend's
//! REST endpoints from an in-process `axum` server on a random local port,
//! and [`GatedBackend`] lets a test decide when each profile lookup answers.
//!
//! # Test Categories
//!
//! - `gate_scenarios` - Route decisions through `AccessContext`
//! - `resolution_race` - Identity changes while lookups are in flight
//! - `rest_backend` - `RestBackend` against the fake server

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use homeplate_access::backend::{
    ApplicationRow, ApplicationTable, BackendError, MemoryBackend, ProfileRow, ProfileSource,
};
use homeplate_access::config::{BackendConfig, ConfigError};
use homeplate_core::{Email, EmailError, Identity, UserId};

/// A fresh identity with a random ID.
///
/// # Errors
///
/// Returns `EmailError` if `email` is not a valid address.
pub fn identity(email: &str) -> Result<Identity, EmailError> {
    Ok(Identity::new(UserId::random(), Email::parse(email)?))
}

// =============================================================================
// Gated backend
// =============================================================================

/// [`MemoryBackend`] whose profile lookups can be held until released.
#[derive(Debug, Default)]
pub struct GatedBackend {
    inner: MemoryBackend,
    gates: Mutex<HashMap<UserId, Arc<Notify>>>,
}

impl GatedBackend {
    /// Wrap a memory backend.
    #[must_use]
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped backend, for seeding records and reading call counts.
    #[must_use]
    pub const fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    /// Hold profile lookups for `user` until the returned handle is notified.
    ///
    /// `notify_one` releases one lookup; a release sent before the lookup
    /// arrives is remembered.
    pub fn hold(&self, user: UserId) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user, Arc::clone(&gate));
        gate
    }

    fn gate(&self, user: UserId) -> Option<Arc<Notify>> {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user)
            .cloned()
    }
}

impl ProfileSource for GatedBackend {
    async fn fetch_profile(&self, user: UserId) -> Result<Option<ProfileRow>, BackendError> {
        if let Some(gate) = self.gate(user) {
            gate.notified().await;
        }
        self.inner.fetch_profile(user).await
    }

    async fn fetch_application(
        &self,
        table: ApplicationTable,
        user: UserId,
    ) -> Result<Option<ApplicationRow>, BackendError> {
        self.inner.fetch_application(table, user).await
    }
}

// =============================================================================
// Fake REST backend
// =============================================================================

#[derive(Debug, Default)]
struct FakeState {
    api_key: String,
    profiles: Mutex<HashMap<String, Value>>,
    applications: Mutex<HashMap<(String, String), Value>>,
    sessions: Mutex<HashMap<String, Value>>,
    failing_tables: Mutex<HashSet<String>>,
    requests: AtomicUsize,
}

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process stand-in for the hosted backend's REST endpoints.
#[derive(Debug, Clone)]
pub struct FakeBackend {
    state: Arc<FakeState>,
    base_url: String,
}

impl FakeBackend {
    /// Bind a random local port and start serving.
    ///
    /// Requests must carry `apikey: <api_key>` or get `401`. Table reads
    /// return rows only when the bearer token is the same key.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the listener cannot be bound.
    pub async fn start(api_key: &str) -> std::io::Result<Self> {
        let state = Arc::new(FakeState {
            api_key: api_key.to_owned(),
            ..FakeState::default()
        });

        let app = Router::new()
            .route("/auth/v1/user", get(current_user))
            .route("/rest/v1/{table}", get(select_rows))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            state,
            base_url: format!("http://{addr}"),
        })
    }

    /// Base URL to point a client at.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Client configuration for this server.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the base URL does not parse.
    pub fn config(&self) -> Result<BackendConfig, ConfigError> {
        BackendConfig::new(&self.base_url, self.state.api_key.clone())
    }

    /// Store a `profiles` row. `role: None` stores a null role column.
    pub fn add_profile(&self, user: UserId, role: Option<&str>) {
        locked(&self.state.profiles).insert(user.to_string(), json!({ "role": role }));
    }

    /// Store an application row in `table`.
    pub fn add_application(&self, table: &str, user: UserId, status: &str, reason: Option<&str>) {
        locked(&self.state.applications).insert(
            (table.to_owned(), user.to_string()),
            json!({ "status": status, "rejection_reason": reason }),
        );
    }

    /// Accept `token` as a bearer token for `identity`.
    pub fn add_session(&self, token: &str, identity: &Identity) {
        locked(&self.state.sessions).insert(
            token.to_owned(),
            json!({ "id": identity.id, "email": identity.email.as_str() }),
        );
    }

    /// Answer every request for `table` with `500`.
    pub fn fail_table(&self, table: &str) {
        locked(&self.state.failing_tables).insert(table.to_owned());
    }

    /// Requests served so far.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }
}

async fn current_user(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if !has_api_key(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let user = bearer(&headers).and_then(|t| locked(&state.sessions).get(t).cloned());

    match user {
        Some(user) => axum::Json(user).into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({ "message": "invalid JWT" })),
        )
            .into_response(),
    }
}

async fn select_rows(
    State(state): State<Arc<FakeState>>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if !has_api_key(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if locked(&state.failing_tables).contains(&table) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({ "message": "boom" })),
        )
            .into_response();
    }

    // Row-level security: only the service-role key sees other users' rows
    if bearer(&headers) != Some(state.api_key.as_str()) {
        return axum::Json(Vec::<Value>::new()).into_response();
    }

    let key = if table == "profiles" { "id" } else { "user_id" };
    let Some(user) = params.get(key).and_then(|f| f.strip_prefix("eq.")) else {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({ "message": format!("missing {key} filter") })),
        )
            .into_response();
    };

    let row = if table == "profiles" {
        locked(&state.profiles).get(user).cloned()
    } else {
        locked(&state.applications)
            .get(&(table.clone(), user.to_owned()))
            .cloned()
    };

    axum::Json(row.into_iter().collect::<Vec<_>>()).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn has_api_key(state: &FakeState, headers: &HeaderMap) -> bool {
    headers
        .get("apikey")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| key == state.api_key)
}
