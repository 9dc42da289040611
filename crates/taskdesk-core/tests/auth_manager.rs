mod common;

use std::time::Duration;

use serde_json::json;
use taskdesk_core::api::{ApiError, ErrorKind};
use taskdesk_core::auth::{AuthManager, Credentials, Registration, TokenPair, TokenStore};
use wiremock::matchers::{any, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{client_with, jwt};

fn registration(password2: &str) -> Registration {
    Registration {
        email: "a@b.com".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        phone_number: "5551234567".to_string(),
        password: "pw".to_string(),
        password2: password2.to_string(),
    }
}

#[tokio::test]
async fn login_persists_pair_and_decodes_identity() {
    let server = MockServer::start().await;
    let access = jwt(json!({ "user_id": 1, "email": "a@b.com", "first_name": "Ada" }));

    Mock::given(method("POST"))
        .and(path("/login/"))
        .and(body_json(json!({ "email": "a@b.com", "password": "pw" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access": access, "refresh": "r1" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with(&server.uri(), None);
    let manager = AuthManager::new(client);
    assert!(!manager.is_authenticated());

    let state = manager
        .login(&Credentials::new("a@b.com", "pw"))
        .await
        .expect("login");

    let pair = TokenPair::new(access.clone(), "r1");
    assert_eq!(store.load().unwrap(), Some(pair.clone()));
    assert_eq!(state.tokens, Some(pair));
    assert_eq!(state.identity.unwrap().email.as_deref(), Some("a@b.com"));
    assert!(!state.loading);
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn rejected_login_reports_server_detail_without_refreshing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "No active account found with the given credentials"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (client, store) = client_with(&server.uri(), None);
    let manager = AuthManager::new(client);

    let err = manager
        .login(&Credentials::new("a@b.com", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert_eq!(err.to_string(), "No active account found with the given credentials");
    let state = manager.state();
    assert!(!state.loading);
    assert_eq!(
        state.error.as_deref(),
        Some("No active account found with the given credentials")
    );
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test]
async fn rejected_login_without_detail_uses_default_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&server)
        .await;

    let (client, _store) = client_with(&server.uri(), None);
    let manager = AuthManager::new(client);

    let err = manager.login(&Credentials::new("a@b.com", "pw")).await.unwrap_err();
    assert_eq!(err, ApiError::Auth("Login failed".to_string()));
}

#[tokio::test]
async fn mismatched_passwords_never_reach_the_network() {
    let server = MockServer::start().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let (client, _store) = client_with(&server.uri(), None);
    let manager = AuthManager::new(client);

    let err = manager.register(&registration("other")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.to_string(), "Passwords do not match");
    assert_eq!(manager.state().error.as_deref(), Some("Passwords do not match"));
    assert!(!manager.is_authenticated());
}

#[tokio::test]
async fn register_then_logs_in_with_same_credentials() {
    let server = MockServer::start().await;
    let access = jwt(json!({ "user_id": 2, "email": "a@b.com" }));

    Mock::given(method("POST"))
        .and(path("/register/"))
        .and(body_json(json!({
            "email": "a@b.com",
            "first_name": "Ada",
            "last_name": "Lovelace",
            "phone_number": "5551234567",
            "password": "pw",
            "password2": "pw"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login/"))
        .and(body_json(json!({ "email": "a@b.com", "password": "pw" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access": access, "refresh": "r1" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with(&server.uri(), None);
    let manager = AuthManager::new(client);

    let state = manager.register(&registration("pw")).await.expect("register");

    assert!(state.is_authenticated());
    assert_eq!(store.load().unwrap(), Some(TokenPair::new(access, "r1")));
}

#[tokio::test]
async fn duplicate_email_surfaces_field_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/register/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "email": ["user with this email already exists."]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (client, store) = client_with(&server.uri(), None);
    let manager = AuthManager::new(client);

    let err = manager.register(&registration("pw")).await.unwrap_err();

    assert_eq!(
        err,
        ApiError::Validation {
            field: Some("email".to_string()),
            message: "user with this email already exists.".to_string(),
        }
    );
    assert_eq!(
        manager.state().error.as_deref(),
        Some("user with this email already exists.")
    );
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test]
async fn logout_sends_refresh_token_and_clears_session() {
    let server = MockServer::start().await;
    let access = jwt(json!({ "email": "a@b.com" }));

    Mock::given(method("POST"))
        .and(path("/logout/"))
        .and(body_json(json!({ "refresh": "r1" })))
        .respond_with(ResponseTemplate::new(205))
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with(&server.uri(), Some(TokenPair::new(access, "r1")));
    let manager = AuthManager::new(client);
    assert!(manager.is_authenticated());

    manager.logout().await.expect("logout");

    assert_eq!(store.load().unwrap(), None);
    let state = manager.state();
    assert!(state.identity.is_none());
    assert!(state.tokens.is_none());
    assert!(!state.loading);
}

#[tokio::test]
async fn logout_clears_session_even_when_server_fails() {
    let server = MockServer::start().await;
    let access = jwt(json!({ "email": "a@b.com" }));

    Mock::given(method("POST"))
        .and(path("/logout/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with(&server.uri(), Some(TokenPair::new(access, "r1")));
    let manager = AuthManager::new(client);

    manager.logout().await.expect("logout is unconditional");

    assert_eq!(store.load().unwrap(), None);
    assert!(manager.state().identity.is_none());
    assert_eq!(manager.state().error, None);
}

#[tokio::test]
async fn forced_logout_from_failed_refresh_reaches_session_state() {
    let server = MockServer::start().await;
    let access = jwt(json!({ "email": "a@b.com" }));

    Mock::given(method("GET"))
        .and(path("/tasks/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with(&server.uri(), Some(TokenPair::new(access, "r1")));
    let manager = AuthManager::new(client.clone());
    let mut state_rx = manager.subscribe();
    let _watcher = manager.watch_session_events();
    assert!(manager.is_authenticated());

    assert!(client.fetch_tasks().await.is_err());

    tokio::time::timeout(Duration::from_secs(2), async {
        while state_rx.borrow_and_update().is_authenticated() {
            state_rx.changed().await.expect("state sender alive");
        }
    })
    .await
    .expect("session state cleared");

    assert_eq!(store.load().unwrap(), None);
    assert!(manager.state().error.is_some());
}
