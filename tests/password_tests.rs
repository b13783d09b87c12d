mod support;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tglogin::config::Endpoints;
use tglogin::error::AuthError;
use tglogin::fingerprint::{GeneratedVisitorId, VisitorIdSource};
use tglogin::password::{NewAccount, PasswordAuthService};
use tglogin::session::AuthOutcome;
use tglogin::two_factor::TwoFactorKind;
use wiremock::matchers::{body_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{granted_body, two_factor_body};

fn service(server: &MockServer) -> PasswordAuthService {
    PasswordAuthService::new(Endpoints::new(server.uri()))
}

#[tokio::test]
async fn sign_in_grants_on_valid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/sign-in"))
        .and(body_json(json!({ "email": "a@b.c", "password": "hunter2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(granted_body()))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = service(&server).sign_in("a@b.c", "hunter2").await;
    match outcome {
        AuthOutcome::Granted { tokens, user } => {
            assert_eq!(tokens.access_token, "access-1");
            assert_eq!(user.id, "u1");
        }
        other => panic!("expected granted, got {other:?}"),
    }
}

#[tokio::test]
async fn sign_in_rejection_is_a_denial() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/sign-in"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = service(&server).sign_in("a@b.c", "wrong").await;
    assert!(matches!(outcome, AuthOutcome::Denied { .. }));
}

#[tokio::test]
async fn sign_in_passes_through_two_factor_requirement() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/sign-in"))
        .respond_with(ResponseTemplate::new(200).set_body_json(two_factor_body()))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = service(&server).sign_in("a@b.c", "hunter2").await;
    match outcome {
        AuthOutcome::TwoFactorRequired { methods } => {
            assert_eq!(methods[0].kind, TwoFactorKind::Email);
        }
        other => panic!("expected two-factor, got {other:?}"),
    }
}

#[tokio::test]
async fn sign_up_posts_account_details() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/sign-up"))
        .and(body_json(json!({
            "email": "a@b.c",
            "password": "hunter2",
            "firstName": "Ada"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(granted_body()))
        .expect(1)
        .mount(&server)
        .await;

    let account = NewAccount {
        email: "a@b.c".into(),
        password: "hunter2".into(),
        first_name: Some("Ada".into()),
        last_name: None,
    };
    let outcome = service(&server).sign_up(&account).await;
    assert!(outcome.is_granted());
}

#[tokio::test]
async fn refresh_exchanges_the_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({ "refreshToken": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tokens": { "accessToken": "access-2", "refreshToken": "refresh-2" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = service(&server).refresh("refresh-1").await.unwrap();
    assert_eq!(tokens.access_token, "access-2");
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn refresh_without_tokens_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let result = service(&server).refresh("refresh-1").await;
    assert!(matches!(result, Err(AuthError::InvalidResponse(_))));
}

#[tokio::test]
async fn refresh_rejection_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let result = service(&server).refresh("expired").await;
    assert!(matches!(result, Err(AuthError::Api { status: 401, .. })));
}

#[tokio::test]
async fn visitor_id_header_is_attached_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(header_exists("X-Visitor-Id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tokens": { "accessToken": "access-2" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let visitor: Arc<dyn VisitorIdSource> = Arc::new(GeneratedVisitorId::new());
    let service = PasswordAuthService::new(Endpoints::new(server.uri()))
        .with_visitor_id_source(visitor);
    service.refresh("refresh-1").await.unwrap();
}
