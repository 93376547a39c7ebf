//! Router

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    create_checkout, health_check, item_content, list_contact_messages, list_items,
    list_payments, list_subscribers, login, me, register, stripe_webhook, submit_contact,
    subscribe,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & catalog
        .route("/health", get(health_check))
        .route("/items", get(list_items))
        .route("/items/{id}/content", get(item_content))
        // Accounts
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/payments", get(list_payments))
        // Payments
        .route("/checkout", post(create_checkout))
        .route("/webhook", post(stripe_webhook))
        // Contact form & newsletter
        .route("/contact", post(submit_contact).get(list_contact_messages))
        .route("/subscribe", post(subscribe))
        .route("/subscribers", get(list_subscribers))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::{
        body::{Body, Bytes},
        http::{header, Request, StatusCode},
    };
    use async_trait::async_trait;
    use bookshop_core::{
        CoreError, ItemId, LogNotifier, NewItem, NewUser, Notification, NotificationDispatcher,
        Notifier, PaymentId, Repositories, Role, SettlementState, User,
    };
    use bookshop_payments::{MockPaymentProvider, WebhookVerifier};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    const JWT_SECRET: &str = "0123456789abcdef0123456789abcdef";
    const WEBHOOK_SECRET: &str = "whsec_router_test";

    /// Records every attempt, then fails like a dead mail relay
    struct FailingNotifier(mpsc::UnboundedSender<Notification>);

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, notification: &Notification) -> bookshop_core::Result<()> {
            let _ = self.0.send(notification.clone());
            Err(CoreError::Other("smtp relay unreachable".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct TestApp {
        app: Router,
        state: AppState,
        _content: tempfile::TempDir,
    }

    impl TestApp {
        async fn new(payments: bool) -> Self {
            Self::with_notifier(payments, Arc::new(LogNotifier)).await
        }

        async fn with_notifier(payments: bool, notifier: Arc<dyn Notifier>) -> Self {
            let content = tempfile::tempdir().unwrap();
            std::fs::create_dir_all(content.path().join("books")).unwrap();
            std::fs::write(content.path().join("books/en.pdf"), b"%PDF-1.4 book").unwrap();

            let root = content.path().display().to_string();
            let config = AppConfig::from_lookup(|key| match key {
                "JWT_SECRET" => Some(JWT_SECRET.into()),
                "CONTENT_ROOT" => Some(root.clone()),
                "FRONTEND_URL" => Some("https://shop.test".into()),
                "ADMIN_EMAIL" => Some("owner@shop.test".into()),
                "ADMIN_PASSWORD" => Some("not-seeded-in-tests".into()),
                _ => None,
            })
            .unwrap();

            let repos = Repositories::in_memory();
            repos
                .items
                .insert(NewItem::new("Map Your Freedom", 500, "books/en.pdf"))
                .await
                .unwrap();
            repos
                .items
                .insert(NewItem::new("Lost Edition", 700, "books/missing.pdf"))
                .await
                .unwrap();

            let mut state = AppState::new(config, repos)
                .with_notifications(NotificationDispatcher::new(notifier));
            if payments {
                state = state.with_payments(Arc::new(MockPaymentProvider::new()), WEBHOOK_SECRET);
            }

            Self {
                app: router(state.clone()),
                state,
                _content: content,
            }
        }

        async fn user(&self, email: &str, role: Role) -> (User, String) {
            let user = self
                .state
                .repos
                .users
                .insert(NewUser::customer(email, "unused").unwrap().with_role(role))
                .await
                .unwrap();
            let token = self.state.tokens.issue(&user).unwrap().access_token;
            (user, token)
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let body = response.into_body().collect().await.unwrap().to_bytes();
            (status, body)
        }

        async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
            let (status, body) = self.send(request).await;
            (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
        }
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn webhook(payload: &[u8], signature: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("Stripe-Signature", signature)
            .body(Body::from(payload.to_vec()))
            .unwrap()
    }

    fn completed_event(payment_id: PaymentId) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_router",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": format!("cs_mock_{payment_id}"),
                "client_reference_id": payment_id.to_string(),
                "payment_status": "paid",
            }}
        }))
        .unwrap()
    }

    fn sign(payload: &[u8]) -> String {
        WebhookVerifier::new(WEBHOOK_SECRET).sign(payload, chrono::Utc::now().timestamp())
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new(false).await;
        let (status, body) = app.send_json(get("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["payments_configured"], false);
    }

    #[tokio::test]
    async fn test_purchase_unlocks_content() {
        let app = TestApp::new(true).await;
        let (user, token) = app.user("reader@example.com", Role::Customer).await;
        let item = ItemId::new(1);

        let (status, body) = app.send_json(get("/items/1/content", Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");
        assert_eq!(body["error"], "You do not have access to this content.");
        assert!(!body.to_string().contains("does not own"));

        let (status, body) = app
            .send_json(post_json("/checkout", Some(&token), &json!({"item_id": 1})))
            .await;
        assert_eq!(status, StatusCode::OK);
        let payment_id = PaymentId::new(body["payment_id"].as_u64().unwrap());
        assert!(body["redirect_url"].as_str().unwrap().starts_with("https://checkout.mock.test/"));

        let record = app.state.repos.payments.get(payment_id).await.unwrap().unwrap();
        assert_eq!(record.state, SettlementState::Pending);

        let payload = completed_event(payment_id);
        let signature = sign(&payload);
        let (status, body) = app.send_json(webhook(&payload, &signature)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["detail"], "OK");

        let (status, body) = app.send(get("/items/1/content", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"%PDF-1.4 book");

        // Redelivery is acknowledged and changes nothing
        let (status, _) = app.send_json(webhook(&payload, &signature)).await;
        assert_eq!(status, StatusCode::OK);
        let owner = app.state.repos.users.get(user.id).await.unwrap().unwrap();
        assert_eq!(owner.owned_items.iter().copied().collect::<Vec<_>>(), vec![item]);

        let (status, body) = app.send_json(get("/payments", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["state"], "completed");
    }

    #[tokio::test]
    async fn test_catalog_reports_access() {
        let app = TestApp::new(true).await;
        let (user, token) = app.user("reader@example.com", Role::Customer).await;
        app.state.repos.users.grant_item(user.id, ItemId::new(1)).await.unwrap();

        let (status, anonymous) = app.send_json(get("/items", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(anonymous.as_array().unwrap().len(), 2);
        assert_eq!(anonymous[0]["has_access"], false);

        let (_, owned) = app.send_json(get("/items", Some(&token))).await;
        assert_eq!(owned[0]["has_access"], true);
        assert_eq!(owned[1]["has_access"], false);

        let (status, _) = app.send_json(get("/items", Some("garbage"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_reads_everything() {
        let app = TestApp::new(false).await;
        let (_, token) = app.user("admin@example.com", Role::Admin).await;

        let (status, _) = app.send(get("/items/1/content", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.send_json(get("/items/2/content", Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.send_json(get("/items/99/content", Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = TestApp::new(true).await;

        for request in [
            get("/items/1/content", None),
            get("/auth/me", None),
            get("/payments", None),
            post_json("/checkout", None, &json!({"item_id": 1})),
        ] {
            let (status, body) = app.send_json(request).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["code"], "UNAUTHORIZED");
        }
    }

    #[tokio::test]
    async fn test_checkout_errors() {
        let app = TestApp::new(true).await;
        let (user, token) = app.user("reader@example.com", Role::Customer).await;

        let (status, body) = app.send_json(post_json("/checkout", Some(&token), &json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "item_id is required");

        let (status, _) = app
            .send_json(post_json("/checkout", Some(&token), &json!({"item_id": 42})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        assert!(app.state.repos.payments.list_for_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payments_disabled() {
        let app = TestApp::new(false).await;
        let (_, token) = app.user("reader@example.com", Role::Customer).await;

        let (status, body) = app
            .send_json(post_json("/checkout", Some(&token), &json!({"item_id": 1})))
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "PAYMENTS_DISABLED");

        let (status, _) = app.send_json(webhook(b"{}", "t=1,v1=00")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_webhook_rejections() {
        let app = TestApp::new(true).await;
        let (user, token) = app.user("reader@example.com", Role::Customer).await;
        let (_, body) = app
            .send_json(post_json("/checkout", Some(&token), &json!({"item_id": 1})))
            .await;
        let payment_id = PaymentId::new(body["payment_id"].as_u64().unwrap());
        let payload = completed_event(payment_id);

        let forged = WebhookVerifier::new("whsec_forged").sign(&payload, chrono::Utc::now().timestamp());
        let (status, body) = app.send_json(webhook(&payload, &forged)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_SIGNATURE");

        let missing_header = Request::builder()
            .method("POST")
            .uri("/webhook")
            .body(Body::from(payload.clone()))
            .unwrap();
        let (status, _) = app.send_json(missing_header).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unknown = completed_event(PaymentId::new(4242));
        let (status, _) = app.send_json(webhook(&unknown, &sign(&unknown))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let other = br#"{"id":"evt_9","type":"customer.created","data":{"object":{}}}"#;
        let (status, body) = app.send_json(webhook(other, &sign(other))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["detail"], "Event ignored");

        let record = app.state.repos.payments.get(payment_id).await.unwrap().unwrap();
        assert_eq!(record.state, SettlementState::Pending);
        let owner = app.state.repos.users.get(user.id).await.unwrap().unwrap();
        assert!(owner.owned_items.is_empty());
    }

    #[tokio::test]
    async fn test_register_login_me() {
        let app = TestApp::new(false).await;
        let credentials = json!({"email": " Reader@Example.com ", "password": "long enough"});

        let (status, body) = app
            .send_json(post_json(
                "/auth/register",
                None,
                &json!({
                    "email": " Reader@Example.com ",
                    "password": "long enough",
                    "first_name": "Ada",
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["email"], "reader@example.com");
        assert!(body.get("password_hash").is_none());

        let (status, body) = app.send_json(post_json("/auth/register", None, &credentials)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");

        let (status, body) = app.send_json(post_json("/auth/login", None, &credentials)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "Bearer");
        let token = body["access_token"].as_str().unwrap().to_string();

        let (status, body) = app.send_json(get("/auth/me", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["first_name"], "Ada");
        assert_eq!(body["owned_items"], json!([]));

        let wrong = json!({"email": "reader@example.com", "password": "not the password"});
        let (status, _) = app.send_json(post_json("/auth/login", None, &wrong)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let app = TestApp::new(false).await;

        for body in [
            json!({"email": "no-at-sign", "password": "long enough"}),
            json!({"email": "reader@example.com", "password": "short"}),
        ] {
            let (status, body) = app.send_json(post_json("/auth/register", None, &body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["code"], "VALIDATION_ERROR");
        }

        let malformed = Request::builder()
            .method("POST")
            .uri("/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{"))
            .unwrap();
        let (status, body) = app.send_json(malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_non_numeric_item_id_is_a_json_bad_request() {
        let app = TestApp::new(false).await;
        let (_, token) = app.user("reader@example.com", Role::Customer).await;

        let (status, body) = app.send_json(get("/items/abc/content", Some(&token))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_contact_saved_when_mail_fails() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let app = TestApp::with_notifier(false, Arc::new(FailingNotifier(tx))).await;

        let (status, body) = app
            .send_json(post_json(
                "/contact",
                None,
                &json!({"name": "Ada", "email": "Ada@Example.com", "message": "Hello there"}),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["message"].as_str().unwrap().contains("received"));

        let inbox = app.state.repos.contacts.list().await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].email, "ada@example.com");

        // Both the thank-you and the admin alert were attempted
        let mut recipients = vec![
            rx.recv().await.unwrap().recipient().to_string(),
            rx.recv().await.unwrap().recipient().to_string(),
        ];
        recipients.sort();
        assert_eq!(recipients, ["ada@example.com", "owner@shop.test"]);

        let blank = json!({"name": "Ada", "email": "ada@example.com", "message": " "});
        let (status, body) = app.send_json(post_json("/contact", None, &blank)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_subscribe_saved_when_mail_fails() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let app = TestApp::with_notifier(false, Arc::new(FailingNotifier(tx))).await;
        let signup = json!({"email": "reader@example.com", "first_name": "Ada", "last_name": "L"});

        let (status, _) = app.send_json(post_json("/subscribe", None, &signup)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(matches!(rx.recv().await, Some(_)));

        let listed = app.state.repos.subscribers.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].first_name, "Ada");

        let (status, body) = app.send_json(post_json("/subscribe", None, &signup)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");
        assert_eq!(app.state.repos.subscribers.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inbox_and_list_are_admin_only() {
        let app = TestApp::new(false).await;
        let (_, customer) = app.user("reader@example.com", Role::Customer).await;
        let (_, admin) = app.user("admin@example.com", Role::Admin).await;

        app.send_json(post_json(
            "/contact",
            None,
            &json!({"name": "Ada", "email": "ada@example.com", "message": "Hi"}),
        ))
        .await;

        for uri in ["/contact", "/subscribers"] {
            let (status, _) = app.send_json(get(uri, None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            let (status, _) = app.send_json(get(uri, Some(&customer))).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
        }

        let (status, body) = app.send_json(get("/contact", Some(&admin))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "Ada");
        let (status, body) = app.send_json(get("/subscribers", Some(&admin))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
}
