mod support;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tglogin::config::Endpoints;
use tglogin::error::AuthError;
use tglogin::fingerprint::{GeneratedVisitorId, VisitorIdSource};
use tglogin::service::TelegramAuthService;
use tglogin::session::{AuthOutcome, ConfirmPoll, ConfirmRequest, SignInOptions};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{granted_body, login_payload, pending_body, two_factor_body};

fn service(server: &MockServer) -> TelegramAuthService {
    TelegramAuthService::new(Endpoints::new(server.uri()))
}

fn options() -> SignInOptions {
    SignInOptions::new("demo_bot").with_redirect_url("https://app.test/cb")
}

#[tokio::test]
async fn init_merges_backend_fields_into_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/telegram/init"))
        .and(body_json(json!({
            "botName": "demo_bot",
            "redirectUrl": "https://app.test/cb",
            "isBinding": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "s1",
            "code": "123456",
            "qr": "data:image/png;base64,AAAA"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = service(&server).init_sign_in(&options()).await.unwrap();

    assert!(session.auth_url.contains("bot_id=demo_bot"));
    assert!(session.auth_url.contains("redirect_url=https%3A%2F%2Fapp.test%2Fcb"));
    assert_eq!(session.session_id.as_deref(), Some("s1"));
    assert_eq!(session.code.as_deref(), Some("123456"));
    assert_eq!(session.qr.as_deref(), Some("data:image/png;base64,AAAA"));
    assert!(session.link_to_bot.is_none());
}

#[tokio::test]
async fn init_degrades_to_redirect_only_when_backend_rejects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/telegram/init"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let session = service(&server).init_sign_in(&options()).await.unwrap();

    assert!(session.auth_url.starts_with("https://oauth.telegram.org/auth?"));
    assert!(session.session_id.is_none());
    assert!(session.code.is_none());
}

#[tokio::test]
async fn init_degrades_when_backend_is_unreachable() {
    // Nothing listening on this port: connection refused, not a 4xx.
    let endpoints = Endpoints::new("http://127.0.0.1:1");
    let service = TelegramAuthService::new(endpoints);

    let session = service.init_sign_in(&options()).await.unwrap();

    assert!(session.auth_url.contains("oauth.telegram.org"));
    assert!(session.session_id.is_none());
}

#[tokio::test]
async fn init_fails_fast_on_malformed_input() {
    let server = MockServer::start().await;
    let result = service(&server)
        .init_sign_in(&SignInOptions::new(""))
        .await;
    assert!(matches!(result, Err(AuthError::Configuration(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn confirm_with_empty_id_skips_network() {
    let server = MockServer::start().await;
    let cancel = CancellationToken::new();

    let result = service(&server)
        .confirm(&ConfirmRequest::new(""), &cancel)
        .await;

    assert!(matches!(result, Err(AuthError::MissingSessionId)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn confirm_maps_pending_and_authorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/telegram/confirm"))
        .and(body_json(json!({ "id": "s1", "isBinding": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(pending_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let service = service(&server);
    let cancel = CancellationToken::new();
    let request = ConfirmRequest::new("s1");

    let first = service.confirm(&request, &cancel).await.unwrap();
    assert!(matches!(first, ConfirmPoll::Pending));

    Mock::given(method("POST"))
        .and(path("/auth/telegram/confirm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(granted_body()))
        .mount(&server)
        .await;

    let second = service.confirm(&request, &cancel).await.unwrap();
    match second {
        ConfirmPoll::Authorized { tokens, user } => {
            assert_eq!(tokens.access_token, "access-1");
            assert_eq!(user.id, "u1");
        }
        other => panic!("expected authorized, got {other:?}"),
    }
}

#[tokio::test]
async fn confirm_surfaces_two_factor_requirement() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/telegram/confirm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(two_factor_body()))
        .expect(1)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let poll = service(&server)
        .confirm(&ConfirmRequest::new("s1"), &cancel)
        .await
        .unwrap();

    match poll {
        ConfirmPoll::TwoFactorRequired { methods } => {
            assert_eq!(methods.len(), 1);
            assert_eq!(methods[0].id, "m-email");
        }
        other => panic!("expected two-factor, got {other:?}"),
    }
}

#[tokio::test]
async fn confirm_forwards_method_selection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/telegram/confirm"))
        .and(body_json(json!({
            "id": "s1",
            "isBinding": false,
            "twoFactorType": "email"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(granted_body()))
        .expect(1)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let request = ConfirmRequest::new("s1")
        .with_two_factor(tglogin::two_factor::TwoFactorKind::Email);
    let poll = service(&server).confirm(&request, &cancel).await.unwrap();
    assert!(matches!(poll, ConfirmPoll::Authorized { .. }));
}

#[tokio::test]
async fn confirm_with_cancelled_token_short_circuits() {
    let server = MockServer::start().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let poll = service(&server)
        .confirm(&ConfirmRequest::new("s1"), &cancel)
        .await
        .unwrap();

    assert!(matches!(poll, ConfirmPoll::Aborted));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn confirm_rejection_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/telegram/confirm"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let result = service(&server)
        .confirm(&ConfirmRequest::new("s1"), &cancel)
        .await;

    match result {
        Err(AuthError::Api { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn stale_payload_fails_validation_without_network() {
    let server = MockServer::start().await;
    let service = service(&server);

    assert!(!service.validate_payload(&login_payload(90_000)));
    assert!(service.validate_payload(&login_payload(60)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn shorter_staleness_window_is_honored() {
    let server = MockServer::start().await;
    let service = TelegramAuthService::new(Endpoints::new(server.uri()))
        .with_max_payload_age(chrono::Duration::hours(1));

    assert!(!service.validate_payload(&login_payload(7_200)));
    assert!(service.validate_payload(&login_payload(60)));
}

#[tokio::test]
async fn handle_auth_result_posts_normalized_payload() {
    let server = MockServer::start().await;
    let raw = login_payload(0);
    Mock::given(method("POST"))
        .and(path("/auth/telegram"))
        .and(body_json(json!({
            "id": 99,
            "firstName": "Ada",
            "lastName": null,
            "username": "ada",
            "photoUrl": null,
            "authDate": raw["auth_date"],
            "hash": "deadbeef"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(granted_body()))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = service(&server).handle_auth_result(&raw).await;
    assert!(outcome.is_granted());
}

#[tokio::test]
async fn handle_auth_result_denies_invalid_payload_without_network() {
    let server = MockServer::start().await;
    let outcome = service(&server)
        .handle_auth_result(&json!({ "id": 99, "first_name": "Ada" }))
        .await;

    assert!(matches!(outcome, AuthOutcome::Denied { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn handle_auth_result_maps_backend_rejection_to_denial() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/telegram"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = service(&server)
        .handle_auth_result(&login_payload(0))
        .await;
    match outcome {
        AuthOutcome::Denied { reason } => assert!(reason.contains("401")),
        other => panic!("expected denial, got {other:?}"),
    }
}

#[tokio::test]
async fn visitor_id_header_is_attached_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/telegram/init"))
        .and(header_exists("X-Visitor-Id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "s1" })))
        .expect(1)
        .mount(&server)
        .await;

    let visitor: Arc<dyn VisitorIdSource> = Arc::new(GeneratedVisitorId::new());
    let service = TelegramAuthService::new(Endpoints::new(server.uri()))
        .with_visitor_id_source(visitor);

    let session = service.init_sign_in(&options()).await.unwrap();
    assert_eq!(session.session_id.as_deref(), Some("s1"));
}
