//! Access check for one user and route.
//!
//! # Environment Variables (live mode)
//!
//! - `HOMEPLATE_BACKEND_URL` - Backend base URL
//! - `HOMEPLATE_BACKEND_KEY` - Backend API key
//!
//! See `homeplate_access::config` for the optional tuning variables.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use homeplate_access::backend::{BackendError, MemoryBackend, ProfileSource, RestBackend};
use homeplate_access::catalog::marketplace_routes;
use homeplate_access::config::{AccessConfig, ConfigError, RedirectTargets, ResolverSettings};
use homeplate_access::{
    AccessPolicy, Decision, Resolution, RoleResolver, RouteError, SessionStore, decide,
};
use homeplate_core::UserId;

/// Errors that can occur during an access check.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Fixture file could not be read.
    #[error("Failed to read fixture {path}: {source}")]
    Fixture {
        /// Fixture path as given.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Backend could not be built or the fixture did not parse.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// The route is not in the catalog.
    #[error("Route error: {0}")]
    Route(#[from] RouteError),
}

/// Outcome of one access check.
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// Path as requested.
    pub route: String,
    /// Catalog pattern that matched.
    pub pattern: String,
    /// Policy guarding the route.
    pub policy: AccessPolicy,
    /// User evaluated; `None` means signed out.
    pub user: Option<UserId>,
    /// Role resolution for `user`.
    pub resolution: Resolution,
    /// Gate decision.
    pub decision: Decision,
    /// Redirect target, if not rendered.
    pub redirect: Option<String>,
}

/// Check against a JSON fixture.
///
/// Without `user`, the fixture's signed-in session is used.
///
/// # Errors
///
/// Returns `CheckError` if the fixture cannot be read or parsed, or the
/// route is unknown.
pub async fn with_fixture(
    path: &Path,
    user: Option<UserId>,
    route: &str,
) -> Result<CheckReport, CheckError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CheckError::Fixture {
            path: path.to_path_buf(),
            source,
        })?;
    let backend = Arc::new(MemoryBackend::from_json(&json)?);
    info!(path = %path.display(), "Loaded fixture");

    let user = match user {
        Some(user) => Some(user),
        None => SessionStore::default()
            .refresh(backend.as_ref())
            .await
            .map(|identity| identity.id),
    };

    evaluate(
        backend,
        ResolverSettings::default(),
        &RedirectTargets::default(),
        user,
        route,
    )
    .await
}

/// Check against the live backend configured in the environment.
///
/// # Errors
///
/// Returns `CheckError` if configuration is missing or invalid, the client
/// cannot be built, or the route is unknown.
pub async fn live(user: Option<UserId>, route: &str) -> Result<CheckReport, CheckError> {
    let config = AccessConfig::from_env()?;
    let backend = Arc::new(RestBackend::new(
        &config.backend,
        config.resolver.lookup_timeout,
    )?);
    info!(backend = %config.backend.base_url, "Checking against live backend");

    evaluate(backend, config.resolver, &config.redirects, user, route).await
}

async fn evaluate<B: ProfileSource>(
    backend: Arc<B>,
    settings: ResolverSettings,
    redirects: &RedirectTargets,
    user: Option<UserId>,
    route: &str,
) -> Result<CheckReport, CheckError> {
    let routes = marketplace_routes()?;
    let matched = routes
        .lookup(route)
        .ok_or_else(|| RouteError::NotFound(route.to_owned()))?;
    let policy = *matched.route.policy();

    let resolver = RoleResolver::new(backend, settings);
    let resolution = match user {
        Some(user) => resolver.resolve_user(user).await,
        None => Resolution::Unresolved,
    };

    let decision = decide(&resolution, &policy);
    let redirect = decision.redirect_path(redirects, route);

    Ok(CheckReport {
        route: route.to_owned(),
        pattern: matched.route.pattern().to_owned(),
        policy,
        user,
        resolution,
        decision,
        redirect,
    })
}

/// Print a report to stdout.
#[allow(clippy::print_stdout)]
pub fn print(report: &CheckReport) {
    for (label, value) in summarize(report) {
        println!("{label:<12} {value}");
    }
}

fn summarize(report: &CheckReport) -> Vec<(&'static str, String)> {
    let mut lines = vec![
        ("route", format!("{} ({})", report.route, report.pattern)),
        ("policy", report.policy.to_string()),
        (
            "user",
            report
                .user
                .map_or_else(|| "signed out".to_owned(), |u| u.to_string()),
        ),
    ];

    match &report.resolution {
        Resolution::Unresolved => {}
        Resolution::Resolved(resolved) => {
            lines.push(("role", resolved.role.to_string()));
            if let Some(application) = &resolved.application {
                let mut state = application.state.to_string();
                if application.defaulted {
                    state.push_str(" (assumed)");
                }
                lines.push(("application", state));
            }
        }
        Resolution::Failed(failure) => lines.push(("error", failure.to_string())),
    }

    let decision = match (&report.decision, &report.redirect) {
        (Decision::Render, _) => "render".to_owned(),
        (_, Some(target)) => format!("redirect -> {target}"),
        (other, None) => format!("{other:?}"),
    };
    lines.push(("decision", decision));

    if let Decision::RedirectToPendingNotice {
        reason: Some(reason),
        ..
    } = &report.decision
    {
        lines.push(("reason", reason.clone()));
    }

    lines
}
