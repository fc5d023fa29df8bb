// Integration tests for the OAuth install API

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use mockito::{Matcher, Server, ServerGuard};
use oauth_installers::api::{create_app, OAuthAppState};
use oauth_installers::auth::{SessionRegistry, User};
use oauth_installers::config::AppConfig;
use oauth_installers::credentials::{EncryptionService, InstallationStore, Provider};
use oauth_installers::installers::InstallerContext;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const ALICE: &str = "tok-alice";
const BOB: &str = "tok-bob";

struct TestApp {
    router: Router,
    store: Arc<InstallationStore>,
    encryption: Arc<EncryptionService>,
}

fn create_test_app(provider_base_url: &str) -> TestApp {
    let mut config = AppConfig::default();
    config.server.frontend_url = "https://frontend.example".to_string();
    config.slack.client_id = "slack-id".to_string();
    config.slack.client_secret = "slack-secret".to_string();
    config.slack.api_base_url = provider_base_url.to_string();
    config.sid.client_id = "sid-id".to_string();
    config.sid.client_secret = "sid-secret".to_string();
    config.sid.auth_base_url = provider_base_url.to_string();

    let store = Arc::new(InstallationStore::new(":memory:").unwrap());
    let encryption = Arc::new(EncryptionService::from_key(&[3u8; 32]).unwrap());

    // Alice acts for an organization, Bob does not
    let sessions = Arc::new(SessionRegistry::new());
    sessions.insert(ALICE, User::new("alice").with_organization("org-1"));
    sessions.insert(BOB, User::new("bob"));

    let state = OAuthAppState {
        installers: InstallerContext {
            store: Arc::clone(&store),
            encryption: Arc::clone(&encryption),
            config: Arc::new(config),
            http_client: reqwest::Client::new(),
        },
        sessions,
    };

    TestApp {
        router: create_app(state),
        store,
        encryption,
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };

    (status, headers, json)
}

fn state_param(url: &str) -> String {
    let query = url.split_once('?').unwrap().1;
    let params: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap();
    params.into_iter().find(|(k, _)| k == "state").unwrap().1
}

async fn mock_sid_token(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::PartialJson(json!({"code": "abc"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "sid-access", "refresh_token": "sid-refresh", "expires_in": 3600}"#)
        .create_async()
        .await
}

async fn start_install(app: &TestApp, provider: &str, token: &str) -> String {
    let (status, _, json) = send(
        app,
        get(
            &format!("/api/auth/{}?redirect=https%3A%2F%2Fapp%2Fdone", provider),
            Some(token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    json.as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app("http://localhost");

    let (status, _, json) = send(&app, get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_install_requires_authentication() {
    let app = create_test_app("http://localhost");

    let (status, _, json) = send(&app, get("/api/auth/sid", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].as_str().unwrap().contains("Invalid token"));

    let (status, _, _) = send(&app, get("/api/auth/sid", Some("tok-nobody"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_install_unknown_provider() {
    let app = create_test_app("http://localhost");

    let (status, _, json) = send(&app, get("/api/auth/github", Some(ALICE))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("Unsupported OAuth provider 'github'"));
}

#[tokio::test]
async fn test_install_defaults_redirect_to_frontend() {
    let app = create_test_app("https://auth.sid.ai");

    let (status, _, json) = send(&app, get("/api/auth/sid", Some(ALICE))).await;
    assert_eq!(status, StatusCode::OK);

    let url = json.as_str().unwrap();
    assert!(url.starts_with("https://auth.sid.ai/oauth/authorize?"));

    let pending = app
        .store
        .get_installation_by_state(&state_param(url))
        .unwrap()
        .unwrap();
    assert_eq!(pending.redirect_uri, "https://frontend.example");
}

#[tokio::test]
async fn test_sid_full_flow() {
    let mut server = Server::new_async().await;
    let _token = mock_sid_token(&mut server).await;
    let _revoke = server
        .mock("POST", "/oauth/revoke")
        .with_status(200)
        .create_async()
        .await;
    let app = create_test_app(&server.url());

    // Not connected yet
    let (status, _, json) = send(&app, get("/api/auth/sid/info", Some(ALICE))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"connected": false}));

    // Install → callback redirects to the stored redirect URI
    let url = start_install(&app, "sid", ALICE).await;
    let state = state_param(&url);

    let (status, headers, _) = send(
        &app,
        get(&format!("/api/auth/sid/callback?code=abc&state={}", state), None),
    )
    .await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(headers[header::LOCATION], "https://app/done");

    // Tokens at rest are ciphertext
    let installation = app
        .store
        .get_installation_by_user_id("alice", Provider::Sid)
        .unwrap()
        .unwrap();
    let stored = installation.access_token_enc.as_deref().unwrap();
    assert_ne!(stored, "sid-access");
    assert_eq!(app.encryption.decrypt(stored).unwrap(), "sid-access");

    let (_, _, json) = send(&app, get("/api/auth/sid/info", Some(ALICE))).await;
    assert_eq!(json, json!({"connected": true}));

    // Replaying the callback is rejected
    let (status, _, _) = send(
        &app,
        get(&format!("/api/auth/sid/callback?code=abc&state={}", state), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Uninstall
    let (status, _, json) = send(&app, get("/api/auth/sid/uninstall", Some(ALICE))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"success": true}));

    let (_, _, json) = send(&app, get("/api/auth/sid/info", Some(ALICE))).await;
    assert_eq!(json, json!({"connected": false}));
}

#[tokio::test]
async fn test_callback_unknown_state_forbidden() {
    let app = create_test_app("http://localhost");

    let (status, _, json) = send(
        &app,
        get("/api/auth/sid/callback?code=abc&state=nonexistent", None),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "Invalid or expired OAuth state");
    assert!(app
        .store
        .get_installation_by_user_id("alice", Provider::Sid)
        .unwrap()
        .is_none());
    assert!(app
        .store
        .get_deleted_installation("alice", Provider::Sid)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_callback_missing_parameters() {
    let app = create_test_app("http://localhost");

    let (status, _, json) = send(&app, get("/api/auth/sid/callback?state=s1", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing 'code' parameter");

    let (status, _, json) = send(&app, get("/api/auth/slack/callback?code=abc", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing 'state' parameter");
}

#[tokio::test]
async fn test_callback_provider_denied() {
    let app = create_test_app("http://localhost");

    let (status, _, json) = send(
        &app,
        get(
            "/api/auth/sid/callback?error=access_denied&error_description=User+cancelled",
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("access_denied"));
}

#[tokio::test]
async fn test_callback_token_exchange_failure_is_bad_gateway() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/oauth/token")
        .with_status(401)
        .with_body(r#"{"error": "invalid_client", "error_description": "do not leak me"}"#)
        .create_async()
        .await;
    let app = create_test_app(&server.url());

    let state = state_param(&start_install(&app, "sid", ALICE).await);
    let (status, _, json) = send(
        &app,
        get(&format!("/api/auth/sid/callback?code=abc&state={}", state), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let message = json["error"].as_str().unwrap();
    assert_eq!(message, "Provider 'sid' request failed");
    assert!(!message.contains("do not leak me"));
}

#[tokio::test]
async fn test_sid_uninstall_never_installed() {
    let app = create_test_app("http://localhost");

    let (status, _, json) = send(&app, get("/api/auth/sid/uninstall", Some(BOB))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"success": false}));
}

#[tokio::test]
async fn test_slack_uninstall_not_supported() {
    let app = create_test_app("http://localhost");

    let (status, _, json) = send(&app, get("/api/auth/slack/uninstall", Some(ALICE))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("not supported"));
}

#[tokio::test]
async fn test_slack_info_requires_organization() {
    let app = create_test_app("http://localhost");

    let (status, _, _) = send(&app, get("/api/auth/slack/info", Some(BOB))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(&app, get("/api/auth/slack/info", Some(ALICE))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_slack_install_and_list_channels() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/oauth.v2.access")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok": true, "access_token": "xoxb-1", "token_type": "bot", "scope": "chat:write"}"#)
        .create_async()
        .await;
    let _channels = server
        .mock("GET", "/conversations.list")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer xoxb-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok": true, "channels": [{"id": "C1", "name": "general", "is_archived": false}]}"#)
        .create_async()
        .await;
    let app = create_test_app(&server.url());

    let url = start_install(&app, "slack", ALICE).await;
    assert!(url.starts_with("https://slack.com/oauth/v2/authorize?"));

    let (status, headers, _) = send(
        &app,
        get(
            &format!("/api/auth/slack/callback?code=abc&state={}", state_param(&url)),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(headers[header::LOCATION], "https://app/done");

    let (status, _, json) = send(&app, get("/api/auth/slack/info", Some(ALICE))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([{"name": "general", "id": "C1"}]));
}

#[tokio::test]
async fn test_state_from_one_provider_rejected_on_another() {
    let app = create_test_app("http://localhost");

    let state = state_param(&start_install(&app, "slack", ALICE).await);
    let (status, _, _) = send(
        &app,
        get(&format!("/api/auth/sid/callback?code=abc&state={}", state), None),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_concurrent_callbacks_redirect_once() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "sid-access", "expires_in": 3600}"#)
        .expect(1)
        .create_async()
        .await;
    let app = create_test_app(&server.url());

    let state = state_param(&start_install(&app, "sid", ALICE).await);
    let uri = format!("/api/auth/sid/callback?code=abc&state={}", state);

    let (first, second) = tokio::join!(send(&app, get(&uri, None)), send(&app, get(&uri, None)));

    let mut statuses = vec![first.0, second.0];
    statuses.sort();
    assert_eq!(
        statuses,
        vec![StatusCode::TEMPORARY_REDIRECT, StatusCode::FORBIDDEN]
    );
    token.assert_async().await;
}

#[tokio::test]
async fn test_callback_out_of_range_expiry_is_bad_gateway() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "sid-access", "expires_in": 10000000000000}"#)
        .create_async()
        .await;
    let app = create_test_app(&server.url());

    let state = state_param(&start_install(&app, "sid", ALICE).await);
    let (status, _, json) = send(
        &app,
        get(&format!("/api/auth/sid/callback?code=abc&state={}", state), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "Provider 'sid' request failed");

    let (status, _, json) = send(&app, get("/api/auth/sid/info", Some(ALICE))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"connected": false}));
}

#[tokio::test]
async fn test_slack_info_survives_pending_install_by_other_member() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/oauth.v2.access")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok": true, "access_token": "xoxb-bot", "token_type": "bot", "scope": "chat:write"}"#)
        .create_async()
        .await;
    let _channels = server
        .mock("GET", "/conversations.list")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok": true, "channels": [{"id": "C1", "name": "general"}]}"#)
        .create_async()
        .await;
    let app = create_test_app(&server.url());

    let state = state_param(&start_install(&app, "slack", ALICE).await);
    let (status, _, _) = send(
        &app,
        get(&format!("/api/auth/slack/callback?code=abc&state={}", state), None),
    )
    .await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);

    // A second member of org-1 starts an install and abandons it
    app.store
        .create_installation(
            &User::new("carol").with_organization("org-1"),
            Provider::Slack,
            "https://app",
        )
        .unwrap();

    let (status, _, json) = send(&app, get("/api/auth/slack/info", Some(ALICE))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([{"name": "general", "id": "C1"}]));
}
