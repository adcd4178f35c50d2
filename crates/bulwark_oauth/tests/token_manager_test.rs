//! Token refresh, hooks and persistence against a mock token endpoint.

use async_trait::async_trait;
use bulwark_core::{OAuthConfig, OAuthToken};
use bulwark_error::{BulwarkErrorKind, BulwarkResult, StorageError, StorageErrorKind};
use bulwark_oauth::{
    HookRegistry, MemoryTokenStorage, RefreshRequest, TokenHooks, TokenManager, TokenStorage,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> OAuthConfig {
    OAuthConfig {
        client_id: "client-abc".to_string(),
        client_secret: Some("shh".to_string()),
        token_url: format!("{}/oauth/token", server.uri()),
        redirect_url: Some("https://app.test/callback".to_string()),
        ..Default::default()
    }
}

fn token_body(access: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "token_type": "bearer",
        "expires_in": 3600,
        "scope": "public"
    })
}

fn expiring(access: &str) -> OAuthToken {
    OAuthToken::new(access)
        .with_expiry(Utc::now() + Duration::seconds(60))
        .with_refresh_token("refresh-1")
}

#[derive(Debug)]
struct BrokenStorage;

#[async_trait]
impl TokenStorage for BrokenStorage {
    async fn save(&self, _client: &str, _token: &OAuthToken) -> BulwarkResult<()> {
        Err(StorageError::new(StorageErrorKind::Unavailable("disk full".into())).into())
    }

    async fn load(&self, _client: &str) -> BulwarkResult<Option<OAuthToken>> {
        Err(StorageError::new(StorageErrorKind::Unavailable("disk full".into())).into())
    }

    async fn delete(&self, _client: &str) -> BulwarkResult<()> {
        Err(StorageError::new(StorageErrorKind::Unavailable("disk full".into())).into())
    }
}

#[tokio::test]
async fn refresh_token_grant_keeps_old_refresh_token_and_persists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("fresh")))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryTokenStorage::new());
    let manager = TokenManager::new("trakt", config(&server), reqwest::Client::new())
        .with_storage(storage.clone());
    manager.set_token(expiring("stale")).await;

    let token = manager.get_valid_token().await.expect("refreshed");
    assert_eq!(token.access_token, "fresh");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
    assert!(!token.needs_refresh());

    let stored = storage.load("trakt").await.expect("load").expect("persisted");
    assert_eq!(stored.access_token, "fresh");
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("shared"))
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = Arc::new(TokenManager::new("trakt", config(&server), reqwest::Client::new()));
    manager.set_token(expiring("stale")).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move { manager.get_valid_token().await }));
    }
    for handle in handles {
        let token = handle.await.expect("task").expect("token");
        assert_eq!(token.access_token, "shared");
    }
}

#[tokio::test]
async fn password_grant_falls_back_to_client_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("machine")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.username = Some("alice".into());
    config.password = Some("hunter2".into());
    let manager = TokenManager::new("deluge", config, reqwest::Client::new());

    let token = manager.get_valid_token().await.expect("client credentials");
    assert_eq!(token.access_token, "machine");
}

#[tokio::test]
async fn token_endpoint_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad client"))
        .mount(&server)
        .await;

    let manager = TokenManager::new("trakt", config(&server), reqwest::Client::new());
    manager.set_token(expiring("stale")).await;

    let err = manager.get_valid_token().await.expect_err("endpoint rejects");
    match err.kind() {
        BulwarkErrorKind::OAuth(oauth) => {
            assert!(oauth.to_string().contains("401"));
            assert_eq!(oauth.client, "trakt");
        }
        other => panic!("unexpected error: {other}"),
    }
}

struct AudienceHooks {
    after_calls: AtomicU32,
}

#[async_trait]
impl TokenHooks for AudienceHooks {
    async fn before_refresh(
        &self,
        config: &OAuthConfig,
        current: Option<&OAuthToken>,
        request: &mut RefreshRequest,
    ) {
        assert_eq!(config.client_id, "client-abc");
        assert!(current.is_some());
        request
            .form_param("audience", "media-api")
            .header("X-Provider", "trakt");
    }

    async fn after_refresh(&self, token: &mut OAuthToken) -> BulwarkResult<()> {
        self.after_calls.fetch_add(1, Ordering::SeqCst);
        token.scope = "rewritten".to_string();
        Ok(())
    }
}

#[tokio::test]
async fn hooks_from_registry_shape_the_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("audience=media-api"))
        .and(header("X-Provider", "trakt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("hooked")))
        .expect(1)
        .mount(&server)
        .await;

    let hooks = Arc::new(AudienceHooks {
        after_calls: AtomicU32::new(0),
    });
    let registry = HookRegistry::new();
    registry.register("trakt", hooks.clone());

    let manager = TokenManager::new("trakt", config(&server), reqwest::Client::new())
        .with_registry(&registry);
    manager.set_token(expiring("stale")).await;

    let token = manager.refresh().await.expect("refresh");
    assert_eq!(token.access_token, "hooked");
    assert_eq!(token.scope, "rewritten");
    assert_eq!(hooks.after_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hooks_registered_after_construction_apply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("audience=media-api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("late")))
        .expect(1)
        .mount(&server)
        .await;

    let registry = HookRegistry::new();
    let manager = TokenManager::new("trakt", config(&server), reqwest::Client::new())
        .with_registry(&registry);
    manager.set_token(expiring("stale")).await;

    let hooks = Arc::new(AudienceHooks {
        after_calls: AtomicU32::new(0),
    });
    registry.register("trakt", hooks.clone());

    let token = manager.get_valid_token().await.expect("refresh");
    assert_eq!(token.access_token, "late");
    assert_eq!(hooks.after_calls.load(Ordering::SeqCst), 1);

    registry.remove("trakt");
    let token = manager.refresh().await;
    assert!(token.is_err(), "request without hook params no longer matches");
}

struct VetoHooks;

#[async_trait]
impl TokenHooks for VetoHooks {
    async fn before_refresh(
        &self,
        _config: &OAuthConfig,
        _current: Option<&OAuthToken>,
        request: &mut RefreshRequest,
    ) {
        request.veto("provider maintenance");
    }
}

#[tokio::test]
async fn veto_stops_refresh_before_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("never")))
        .expect(0)
        .mount(&server)
        .await;

    let manager = TokenManager::new("trakt", config(&server), reqwest::Client::new())
        .with_hooks(Arc::new(VetoHooks));
    manager.set_token(expiring("stale")).await;

    let err = manager.get_valid_token().await.expect_err("vetoed");
    assert!(err.to_string().contains("provider maintenance"));
    assert_eq!(
        manager.get_token().await.map(|t| t.access_token),
        Some("stale".to_string())
    );
}

#[tokio::test]
async fn storage_failure_does_not_fail_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("in-memory")))
        .mount(&server)
        .await;

    let manager = TokenManager::new("trakt", config(&server), reqwest::Client::new())
        .with_storage(Arc::new(BrokenStorage));

    let token = manager.refresh().await.expect("refresh survives storage outage");
    assert_eq!(token.access_token, "in-memory");
    assert_eq!(manager.get_token().await, Some(token));

    // Revoke is best effort as well.
    manager.revoke().await;
    assert!(manager.get_token().await.is_none());
    assert!(manager.load_persisted().await.is_err());
}

#[tokio::test]
async fn exchange_code_persists_and_revoke_deletes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "exchanged",
            "refresh_token": "refresh-2",
            "expires_in": 7776000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryTokenStorage::new());
    let manager = TokenManager::new("trakt", config(&server), reqwest::Client::new())
        .with_storage(storage.clone());

    let token = manager.exchange_code("auth-code-42").await.expect("exchange");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-2"));
    assert_eq!(token.token_type, "Bearer");
    assert!(storage.load("trakt").await.expect("load").is_some());

    manager.revoke().await;
    assert!(storage.load("trakt").await.expect("load").is_none());
    assert!(manager.get_token().await.is_none());
}

#[tokio::test]
async fn load_persisted_restores_token() {
    let storage = Arc::new(MemoryTokenStorage::new());
    let saved = OAuthToken::new("from-disk").with_expiry(Utc::now() + Duration::hours(2));
    storage.save("trakt", &saved).await.expect("save");

    let server = MockServer::start().await;
    let manager = TokenManager::new("trakt", config(&server), reqwest::Client::new())
        .with_storage(storage);

    assert_eq!(manager.load_persisted().await.expect("load"), Some(saved.clone()));
    assert_eq!(manager.get_valid_token().await.expect("fresh"), saved);
}
