//! Unified error handling with Sentry integration.
//!
//! Denials are not errors: the gate turns every resolution outcome into a
//! [`Decision`](crate::gate::Decision). `AccessError` covers setup and
//! wiring failures only (bad configuration, duplicate routes, no runtime).

use thiserror::Error;

use homeplate_core::Identity;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::routes::RouteError;

/// Error type for constructing and wiring the access layer.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Backend client could not be built or reached.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Route registration or lookup failed.
    #[error("Route error: {0}")]
    Route(#[from] RouteError),

    /// `attach` was called outside a Tokio runtime.
    #[error("No Tokio runtime available to drive role resolution")]
    NoRuntime,
}

/// Result type alias for `AccessError`.
pub type Result<T> = std::result::Result<T, AccessError>;

/// Set the Sentry user context from the signed-in identity.
///
/// Called on every sign-in so errors are associated with the account.
pub fn set_sentry_user(identity: &Identity) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(identity.id.to_string()),
            email: Some(identity.email.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Called on sign-out to stop associating errors with the previous account.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for access-layer events.
///
/// Breadcrumbs show up in Sentry reports as the trail leading to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("access", "Role resolved", Some(&[("role", "chef")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
