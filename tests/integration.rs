//! Integration tests for the Kharcha router
//!
//! Requests go through the full router (gate, handlers, views) against the
//! in-memory store.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use http_body_util::BodyExt;
use kharcha::auth::{MailError, Mailer, OutgoingEmail, SessionToken};
use kharcha::ledger::{Cadence, Notification, Subscription, Transaction, TransactionKind};
use kharcha::server::{pages::INVALID_LINK_MESSAGE, ROUTES};
use kharcha::signin::{EMAIL_REQUIRED_MESSAGE, SIGN_IN_FAILED_MESSAGE, SIGN_IN_SENT_MESSAGE};
use kharcha::storage::{
    LedgerStore, MemoryStore, NotificationStore, SessionRecord, SessionStore, StorageError,
};
use kharcha::{KharchaConfig, KharchaServer, Stores};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tower::ServiceExt;

const TEST_SECRET: &str = "test-secret-for-integration-tests";
const USER: &str = "asha@example.com";

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        self.sent.lock().push(email.clone());
        Ok(())
    }
}

struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _: &OutgoingEmail) -> Result<(), MailError> {
        Err(MailError::Rejected {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    mailer: Arc<RecordingMailer>,
}

fn config() -> KharchaConfig {
    KharchaConfig::from_parts("127.0.0.1:0", "https://kharcha.test", TEST_SECRET).unwrap()
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let server = KharchaServer::new(config(), Stores::shared(store.clone()), mailer.clone()).unwrap();

    TestApp {
        router: server.router(),
        store,
        mailer,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Open a session directly in the store, returning the cookie header
    async fn signed_in(&self, email: &str) -> String {
        let token = SessionToken::generate();
        let now = Utc::now();
        self.store
            .create_session(&SessionRecord {
                id: token.id().to_string(),
                email: email.to_string(),
                created_at: now,
                expires_at: now + Duration::days(1),
            })
            .await
            .unwrap();
        format!("kharcha_session={}", token)
    }
}

fn get(path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(path: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(path).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response.headers().get(header::LOCATION).unwrap().to_str().unwrap()
}

fn link_from(email: &OutgoingEmail) -> String {
    let start = email.text.find("token=").unwrap() + "token=".len();
    email.text[start..].split_whitespace().next().unwrap().to_string()
}

// ============================================================================
// Gate
// ============================================================================

#[tokio::test]
async fn test_protected_routes_require_session() {
    let app = test_app();

    for route in ROUTES.iter().filter(|r| r.protected) {
        let response = app.send(get(route.path, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", route.path);
        assert!(body_text(response).await.contains("Send sign-in link"));
    }

    // Form posts are gated too and never reach the store
    let response = app
        .send(post_form("/transactions", "kind=expense&amount=5&category=Tea", None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.store.list_transactions(USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_protected_routes_render_when_signed_in() {
    let app = test_app();
    let cookie = app.signed_in(USER).await;

    for route in ROUTES.iter().filter(|r| r.protected) {
        let response = app.send(get(route.path, Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", route.path);

        let body = body_text(response).await;
        assert!(body.contains(&format!("<title>{} · Kharcha</title>", route.title)));
        assert!(body.contains(USER));
    }
}

#[tokio::test]
async fn test_garbage_and_expired_cookies_are_unauthenticated() {
    let app = test_app();

    let response = app.send(get("/dashboard", Some("kharcha_session=garbage"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = SessionToken::generate();
    let now = Utc::now();
    app.store
        .create_session(&SessionRecord {
            id: token.id().to_string(),
            email: USER.to_string(),
            created_at: now - Duration::days(31),
            expires_at: now - Duration::days(1),
        })
        .await
        .unwrap();
    let response = app
        .send(get("/dashboard", Some(&format!("kharcha_session={}", token))))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

struct StalledSessions;

#[async_trait]
impl SessionStore for StalledSessions {
    async fn create_session(&self, _: &SessionRecord) -> Result<(), StorageError> {
        Ok(())
    }
    async fn get_session(&self, _: &str) -> Result<Option<SessionRecord>, StorageError> {
        std::future::pending().await
    }
    async fn delete_session(&self, _: &str) -> Result<(), StorageError> {
        Ok(())
    }
    async fn consume_link_nonce(&self, _: &str, _: DateTime<Utc>) -> Result<bool, StorageError> {
        Ok(true)
    }
    async fn purge_expired(&self, _: DateTime<Utc>) -> Result<u64, StorageError> {
        Ok(0)
    }
}

#[tokio::test(start_paused = true)]
async fn test_unresolved_session_serves_waiting_page() {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores {
        sessions: Arc::new(StalledSessions),
        ledger: store.clone(),
        notifications: store,
    };
    let config = config().session_resolve_timeout(std::time::Duration::from_millis(100));
    let server = KharchaServer::new(config, stores, Arc::new(RecordingMailer::default())).unwrap();

    let cookie = format!("kharcha_session={}", SessionToken::generate());
    let response = server.router().oneshot(get("/dashboard", Some(&cookie))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("refresh").unwrap(), "2");
    let body = body_text(response).await;
    assert!(body.contains("Loading"));
    assert!(!body.contains("Send sign-in link"));
    assert!(!body.contains("<nav"));
}

// ============================================================================
// Public routes
// ============================================================================

#[tokio::test]
async fn test_public_routes() {
    let app = test_app();

    let response = app.send(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");

    let response = app.send(get("/", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("href=\"/signin\""));

    let response = app.send(get("/signin", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    let input = body.find("<input id=\"email\"").unwrap();
    let input = &body[input..input + body[input..].find('>').unwrap()];
    assert!(input.contains(" required"));

    let response = app.send(get("/no-such-page", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_signin_page_redirects_when_signed_in() {
    let app = test_app();
    let cookie = app.signed_in(USER).await;

    let response = app.send(get("/signin", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
}

// ============================================================================
// Sign-in
// ============================================================================

#[tokio::test]
async fn test_sign_in_link_round_trip() {
    let app = test_app();

    let response = app.send(post_form("/signin", "email=Asha%40Example.com", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains(SIGN_IN_SENT_MESSAGE));

    let link = {
        let sent = app.mailer.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec![USER.to_string()]);
        link_from(&sent[0])
    };

    let response = app.send(get(&format!("/auth/verify?token={}", link), None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with("kharcha_session=sess-"));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Secure"));
    let cookie = set_cookie.split(';').next().unwrap().to_string();

    let response = app.send(get("/dashboard", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Links work once
    let response = app.send(get(&format!("/auth/verify?token={}", link), None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains(INVALID_LINK_MESSAGE));
}

#[tokio::test]
async fn test_second_request_while_link_in_flight_shows_same_message() {
    let app = test_app();

    for _ in 0..2 {
        let response = app.send(post_form("/signin", "email=asha%40example.com", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains(SIGN_IN_SENT_MESSAGE));
    }
    assert_eq!(app.mailer.sent.lock().len(), 1);
}

#[tokio::test]
async fn test_tampered_and_missing_links_rejected() {
    let app = test_app();

    let response = app.send(get("/auth/verify?token=link-abc.def", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.send(get("/auth/verify", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains(INVALID_LINK_MESSAGE));
}

#[tokio::test]
async fn test_blank_email_rejected() {
    let app = test_app();

    let response = app.send(post_form("/signin", "email=+++", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains(EMAIL_REQUIRED_MESSAGE));
    assert!(app.mailer.sent.lock().is_empty());
}

#[tokio::test]
async fn test_mail_failure_shows_generic_message() {
    let store = Arc::new(MemoryStore::new());
    let server = KharchaServer::new(config(), Stores::shared(store), Arc::new(FailingMailer)).unwrap();

    let response = server
        .router()
        .oneshot(post_form("/signin", "email=asha%40example.com", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    assert!(body.contains(SIGN_IN_FAILED_MESSAGE));
    assert!(!body.contains("unavailable"));
}

#[tokio::test]
async fn test_sign_out_deletes_session() {
    let app = test_app();
    let cookie = app.signed_in(USER).await;

    let response = app.send(post_form("/signout", "", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cleared = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let response = app.send(get("/dashboard", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Ledger pages
// ============================================================================

#[tokio::test]
async fn test_add_transaction() {
    let app = test_app();
    let cookie = app.signed_in(USER).await;

    let response = app
        .send(post_form(
            "/transactions",
            "kind=expense&amount=250&category=Groceries&date=2025-03-01&note=weekly+shop",
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/transactions");

    let stored = app.store.list_transactions(USER).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, TransactionKind::Expense);
    assert_eq!(stored[0].note.as_deref(), Some("weekly shop"));

    let body = body_text(app.send(get("/transactions", Some(&cookie))).await).await;
    assert!(body.contains("Groceries"));
    assert!(body.contains("-250.00"));
}

#[tokio::test]
async fn test_invalid_transaction_rerenders_form() {
    let app = test_app();
    let cookie = app.signed_in(USER).await;

    let response = app
        .send(post_form("/transactions", "kind=expense&amount=0&category=Tea", Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_text(response).await;
    assert!(body.contains("Enter an amount greater than zero."));
    assert!(body.contains("value=\"Tea\""));
    assert!(app.store.list_transactions(USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_users_only_see_their_own_records() {
    let app = test_app();
    let asha = app.signed_in(USER).await;
    let ravi = app.signed_in("ravi@example.com").await;

    app.send(post_form("/transactions", "kind=income&amount=900&category=Freelance", Some(&asha)))
        .await;

    let body = body_text(app.send(get("/transactions", Some(&ravi))).await).await;
    assert!(!body.contains("Freelance"));
}

#[tokio::test]
async fn test_subscriptions_and_loans() {
    let app = test_app();
    let cookie = app.signed_in(USER).await;

    let response = app
        .send(post_form("/subscriptions", "name=Netflix&amount=649&cadence=monthly", Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = app
        .send(post_form("/loans", "counterparty=Ravi&amount=2000&due_date=2030-01-15", Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let body = body_text(app.send(get("/subscriptions", Some(&cookie))).await).await;
    assert!(body.contains("Netflix"));
    assert!(body.contains("649.00"));
    assert!(body.contains("Ravi: 2000.00 due 2030-01-15"));

    let loan = app.store.list_loans(USER).await.unwrap().remove(0);
    let response = app
        .send(post_form(&format!("/loans/{}/settle", loan.id), "", Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(app.store.list_loans(USER).await.unwrap()[0].settled);

    // Another user's loan id is not found
    let other = app.signed_in("ravi@example.com").await;
    let response = app
        .send(post_form(&format!("/loans/{}/settle", loan.id), "", Some(&other)))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.send(post_form("/loans/not-a-uuid/settle", "", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_loan_without_due_date_rejected() {
    let app = test_app();
    let cookie = app.signed_in(USER).await;

    let response = app
        .send(post_form("/loans", "counterparty=Ravi&amount=2000", Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("Enter a valid date."));
}

#[tokio::test]
async fn test_oversized_amount_rejected_and_pages_still_render() {
    let app = test_app();
    let cookie = app.signed_in(USER).await;

    let response = app
        .send(post_form(
            "/subscriptions",
            "name=Big&amount=10000000000000000000000000000&cadence=weekly",
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("Enter an amount below 1,000,000,000,000."));
    assert!(app.store.list_subscriptions(USER).await.unwrap().is_empty());

    let response = app.send(get("/subscriptions", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_stored_huge_amounts_still_render() {
    let app = test_app();
    let cookie = app.signed_in(USER).await;
    let today = Utc::now().date_naive();

    // Rows written before the amount cap existed
    for name in ["Big", "Bigger"] {
        app.store
            .add_subscription(&Subscription::new(USER, name, Decimal::MAX, Cadence::Weekly, today))
            .await
            .unwrap();
    }
    for _ in 0..2 {
        app.store
            .add_transaction(&Transaction::new(
                USER,
                TransactionKind::Expense,
                Decimal::MAX,
                "Food",
                None,
                today,
            ))
            .await
            .unwrap();
    }

    for path in ["/subscriptions", "/insights", "/dashboard", "/transactions"] {
        let response = app.send(get(path, Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
    }
}

#[tokio::test]
async fn test_notifications_mark_all_read() {
    let app = test_app();
    let cookie = app.signed_in(USER).await;
    app.store
        .insert_notification(&Notification::new(
            USER,
            "Netflix renews tomorrow".to_string(),
            "Your monthly subscription of 649.00 renews soon.".to_string(),
            "subscription:test".to_string(),
        ))
        .await
        .unwrap();

    let body = body_text(app.send(get("/dashboard", Some(&cookie))).await).await;
    assert!(body.contains("Netflix renews tomorrow"));

    let response = app.send(post_form("/notifications/read", "", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    assert!(app.store.list_notifications(USER, true).await.unwrap().is_empty());
    let body = body_text(app.send(get("/dashboard", Some(&cookie))).await).await;
    assert!(body.contains("Nothing new."));
}

#[tokio::test]
async fn test_insights_and_settings() {
    let app = test_app();
    let cookie = app.signed_in(USER).await;
    let today = Utc::now().date_naive();

    for body in [
        format!("kind=expense&amount=300&category=Food&date={}", today),
        format!("kind=expense&amount=100&category=Travel&date={}", today),
    ] {
        app.send(post_form("/transactions", &body, Some(&cookie))).await;
    }

    let body = body_text(app.send(get("/insights", Some(&cookie))).await).await;
    let food = body.find("Food").unwrap();
    let travel = body.find("Travel").unwrap();
    assert!(food < travel);
    assert!(body.contains("300.00 (75.00%)"));

    let body = body_text(app.send(get("/settings", Some(&cookie))).await).await;
    assert!(body.contains("daily at 09:00 UTC"));
}
