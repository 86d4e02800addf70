//! Integration tests for the REST backend client.
//!
//! Runs `RestBackend` against `FakeBackend`, an in-process server speaking
//! the backend's table and auth endpoints.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use homeplate_access::backend::{
    ApplicationTable, AuthSource, BackendError, ProfileSource, RestBackend,
};
use homeplate_access::config::{BackendConfig, ResolverSettings};
use homeplate_access::{Resolution, ResolveFailure, RoleResolver, SessionStore};
use homeplate_core::{ApplicationState, Role, UserId};
use homeplate_integration_tests::{FakeBackend, identity};

const API_KEY: &str = "svc-7Hq2Lm9Xp4Rt8Wv1Zb6Nc3Jd5Kf0Gs";

async fn start() -> (FakeBackend, RestBackend) {
    let fake = FakeBackend::start(API_KEY).await.unwrap();
    let client = RestBackend::new(&fake.config().unwrap(), Duration::from_secs(2)).unwrap();
    (fake, client)
}

// =============================================================================
// Table Endpoints
// =============================================================================

#[tokio::test]
async fn test_fetch_profile() {
    let (fake, client) = start().await;
    let user = UserId::random();
    fake.add_profile(user, Some("kitchen_partner"));

    let row = client.fetch_profile(user).await.unwrap().unwrap();
    assert_eq!(row.role.as_deref(), Some("kitchen_partner"));

    assert!(client.fetch_profile(UserId::random()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_fetch_profile_with_null_role() {
    let (fake, client) = start().await;
    let user = UserId::random();
    fake.add_profile(user, None);

    let row = client.fetch_profile(user).await.unwrap().unwrap();
    assert_eq!(row.role, None);
}

#[tokio::test]
async fn test_table_reads_authorize_as_service_role() {
    let (fake, client) = start().await;
    let user = UserId::random();
    fake.add_profile(user, Some("chef"));

    // A user's own token sees nothing of another user's profile
    let rows: Vec<serde_json::Value> = reqwest::Client::new()
        .get(format!("{}/rest/v1/profiles?id=eq.{user}&select=role", fake.base_url()))
        .header("apikey", API_KEY)
        .bearer_auth("token-someone-else")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(rows.is_empty());

    let row = client.fetch_profile(user).await.unwrap().unwrap();
    assert_eq!(row.role.as_deref(), Some("chef"));
}

#[tokio::test]
async fn test_fetch_application() {
    let (fake, client) = start().await;
    let user = UserId::random();
    fake.add_application("restaurants", user, "rejected", Some("Permit expired"));

    let row = client
        .fetch_application(ApplicationTable::Restaurants, user)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status.as_deref(), Some("rejected"));
    assert_eq!(row.rejection_reason.as_deref(), Some("Permit expired"));

    // Same user, different table
    assert!(
        client
            .fetch_application(ApplicationTable::Chefs, user)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_server_error_is_status_error() {
    let (fake, client) = start().await;
    fake.fail_table("chefs");

    let result = client
        .fetch_application(ApplicationTable::Chefs, UserId::random())
        .await;
    assert!(matches!(
        result,
        Err(BackendError::Status { status: 500, ref endpoint }) if endpoint == "/rest/v1/chefs"
    ));
}

#[tokio::test]
async fn test_wrong_api_key_is_rejected() {
    let fake = FakeBackend::start(API_KEY).await.unwrap();
    let config = BackendConfig::new(fake.base_url(), "svc-wrong-key").unwrap();
    let client = RestBackend::new(&config, Duration::from_secs(2)).unwrap();

    assert!(matches!(
        client.fetch_profile(UserId::random()).await,
        Err(BackendError::Status { status: 401, .. })
    ));
}

// =============================================================================
// Auth Endpoint
// =============================================================================

#[tokio::test]
async fn test_session_for_valid_token() {
    let (fake, client) = start().await;
    let ana = identity("ana@homeplate.app").unwrap();
    fake.add_session("token-ana", &ana);

    let session = client.session(SecretString::from("token-ana".to_owned()));
    assert_eq!(session.fetch_session().await.unwrap(), Some(ana));
}

#[tokio::test]
async fn test_session_for_expired_token_is_signed_out() {
    let (_fake, client) = start().await;
    let session = client.session(SecretString::from("expired".to_owned()));
    assert_eq!(session.fetch_session().await.unwrap(), None);
}

#[tokio::test]
async fn test_session_store_refresh_over_rest() {
    let (fake, client) = start().await;
    let ana = identity("ana@homeplate.app").unwrap();
    fake.add_session("token-ana", &ana);

    let store = SessionStore::default();
    let session = client.session(SecretString::from("token-ana".to_owned()));
    assert_eq!(store.refresh(&session).await, Some(ana.clone()));
    assert_eq!(store.current_identity(), Some(ana));
}

// =============================================================================
// Resolver over REST
// =============================================================================

#[tokio::test]
async fn test_resolver_over_rest() {
    let (fake, client) = start().await;
    let chef = identity("chef@homeplate.app").unwrap();
    fake.add_profile(chef.id, Some("chef"));
    fake.add_application("chefs", chef.id, "under_review", None);

    let resolver = RoleResolver::new(Arc::new(client), ResolverSettings::default());
    let resolution = resolver.resolve_role(Some(&chef)).await;
    assert_eq!(resolution.role(), Some(Role::Chef));
    assert_eq!(
        resolution.application_state(),
        Some(ApplicationState::UnderReview)
    );

    let served = fake.requests();
    resolver.resolve_role(Some(&chef)).await;
    assert_eq!(fake.requests(), served, "second resolution should be cached");
}

#[tokio::test]
async fn test_resolver_over_rest_fails_closed() {
    let (fake, client) = start().await;
    let chef = identity("chef@homeplate.app").unwrap();
    fake.add_profile(chef.id, Some("chef"));
    fake.add_application("chefs", chef.id, "approved", None);
    fake.fail_table("chefs");

    let resolver = RoleResolver::new(Arc::new(client), ResolverSettings::default());
    let Resolution::Resolved(resolved) = resolver.resolve_role(Some(&chef)).await else {
        panic!("expected resolved role");
    };
    let application = resolved.application.unwrap();
    assert_eq!(application.state, ApplicationState::Pending);
    assert!(application.defaulted);
}

#[tokio::test]
async fn test_resolver_over_rest_unknown_role() {
    let (fake, client) = start().await;
    let user = identity("odd@homeplate.app").unwrap();
    fake.add_profile(user.id, Some("moderator"));

    let resolver = RoleResolver::new(Arc::new(client), ResolverSettings::default());
    assert_eq!(
        resolver.resolve_role(Some(&user)).await,
        Resolution::Failed(ResolveFailure::UnknownRole {
            user: user.id,
            value: Some("moderator".to_owned()),
        })
    );
}
