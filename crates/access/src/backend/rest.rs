//! REST client for the hosted backend.
//!
//! Talks to the backend's auth endpoint (`/auth/v1/user`) and its
//! table endpoints (`/rest/v1/<table>`), which answer filter queries such
//! as `?id=eq.<uuid>` with a JSON array of rows.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use homeplate_core::{Email, Identity, UserId};

use super::{ApplicationRow, ApplicationTable, AuthSource, BackendError, ProfileRow, ProfileSource};
use crate::config::BackendConfig;

/// Client for the backend's REST endpoints.
///
/// Cheaply cloneable; clones share one connection pool.
#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<RestBackendInner>,
}

struct RestBackendInner {
    client: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
}

/// User object returned by `/auth/v1/user`.
#[derive(Debug, Deserialize)]
struct AuthUser {
    id: UserId,
    email: Option<String>,
}

impl RestBackend {
    /// Create a new backend client.
    ///
    /// `request_timeout` bounds each HTTP request at the transport level;
    /// the resolver applies its own lookup timeout on top.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig, request_timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(RestBackendInner {
                client,
                base_url: config.base_url.clone(),
                api_key: SecretString::from(config.expose_key().to_owned()),
            }),
        })
    }

    /// Bind a user's access token, producing an [`AuthSource`].
    #[must_use]
    pub fn session(&self, access_token: SecretString) -> RestSession {
        RestSession {
            backend: self.clone(),
            access_token,
        }
    }

    /// Build `<base>/<segments...>` with the given query pairs.
    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, BackendError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::InvalidUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Send an authenticated GET; callers interpret the status.
    async fn get(&self, url: Url, bearer: &str) -> Result<reqwest::Response, BackendError> {
        let response = self
            .inner
            .client
            .get(url)
            .header("apikey", self.inner.api_key.expose_secret())
            .bearer_auth(bearer)
            .header("Accept", "application/json")
            .send()
            .await?;

        Ok(response)
    }

    /// Select at most one row from a table endpoint.
    ///
    /// Authorizes as the configured service-role key, not the user.
    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        filter: (&str, String),
        columns: &str,
    ) -> Result<Option<T>, BackendError> {
        let url = self.endpoint(
            &["rest", "v1", table],
            &[(filter.0, filter.1.as_str()), ("select", columns), ("limit", "1")],
        )?;

        let response = self.get(url, self.inner.api_key.expose_secret()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                endpoint: format!("/rest/v1/{table}"),
            });
        }

        let body = response.text().await?;
        let rows: Vec<T> = serde_json::from_str(&body)?;
        if rows.len() > 1 {
            debug!(table, rows = rows.len(), "More than one row for a single-row lookup");
        }
        Ok(rows.into_iter().next())
    }
}

impl ProfileSource for RestBackend {
    #[instrument(skip(self), fields(user = %user))]
    async fn fetch_profile(&self, user: UserId) -> Result<Option<ProfileRow>, BackendError> {
        self.select_one("profiles", ("id", format!("eq.{user}")), "role")
            .await
    }

    #[instrument(skip(self), fields(table = table.as_str(), user = %user))]
    async fn fetch_application(
        &self,
        table: ApplicationTable,
        user: UserId,
    ) -> Result<Option<ApplicationRow>, BackendError> {
        self.select_one(
            table.as_str(),
            ("user_id", format!("eq.{user}")),
            "status,rejection_reason",
        )
        .await
    }
}

/// A [`RestBackend`] bound to one user's access token.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct RestSession {
    backend: RestBackend,
    access_token: SecretString,
}

impl std::fmt::Debug for RestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestSession")
            .field("base_url", &self.backend.inner.base_url.as_str())
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl AuthSource for RestSession {
    #[instrument(skip(self))]
    async fn fetch_session(&self) -> Result<Option<Identity>, BackendError> {
        let url = self.backend.endpoint(&["auth", "v1", "user"], &[])?;
        let response = self
            .backend
            .get(url, self.access_token.expose_secret())
            .await?;

        let status = response.status();
        // Expired or revoked tokens mean "signed out", not a failure
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            debug!(status = status.as_u16(), "Access token rejected, no session");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                endpoint: "/auth/v1/user".to_string(),
            });
        }

        let body = response.text().await?;
        let user: AuthUser = serde_json::from_str(&body)?;
        let raw_email = user
            .email
            .ok_or_else(|| BackendError::InvalidRecord(format!("user {} has no email", user.id)))?;
        let email = Email::parse(&raw_email)
            .map_err(|e| BackendError::InvalidRecord(format!("user {}: {e}", user.id)))?;

        Ok(Some(Identity::new(user.id, email)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn backend(base: &str) -> RestBackend {
        let config = BackendConfig::new(base, "test-key").unwrap();
        RestBackend::new(&config, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_endpoint_appends_segments() {
        let url = backend("https://abc.backend.example")
            .endpoint(&["rest", "v1", "profiles"], &[("id", "eq.1"), ("select", "role")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.backend.example/rest/v1/profiles?id=eq.1&select=role"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let url = backend("http://localhost:54321/project/")
            .endpoint(&["auth", "v1", "user"], &[])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:54321/project/auth/v1/user");
    }

    #[test]
    fn test_session_debug_redacts_token() {
        let session = backend("https://abc.backend.example")
            .session(SecretString::from("user-access-token".to_string()));
        let debug_output = format!("{session:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("user-access-token"));
    }
}
