//! HTTP Handlers

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};

use bookshop_core::{
    authorize_content, catalog, password, user, CatalogEntry, ContactMessage, CoreError, ItemId,
    NewContactMessage, NewSubscriber, NewUser, Notification, PaymentId, PaymentRecord, Subscriber,
    User,
};
use bookshop_payments::PaymentError;

use crate::auth::{AuthUser, MaybeUser, TokenResponse};
use crate::content;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub payments_configured: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub item_id: Option<ItemId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub redirect_url: String,
    pub payment_id: PaymentId,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub detail: String,
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        payments_configured: state.payments_enabled(),
    })
}

/// Catalog, with `has_access` filled in for logged-in callers
pub async fn list_items(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
) -> ApiResult<Json<Vec<CatalogEntry>>> {
    let entries = catalog::list_for(state.repos.items.as_ref(), viewer.as_ref()).await?;
    Ok(Json(entries))
}

/// Create a customer account
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let Json(payload) = payload?;

    let email = user::validate_email(&payload.email)?;
    user::validate_password(&payload.password)?;

    if state.repos.users.find_by_email(&email).await?.is_some() {
        return Err(CoreError::Conflict("An account with this email already exists".into()).into());
    }

    let secret = payload.password;
    let hash = tokio::task::spawn_blocking(move || password::hash_password(&secret)).await??;

    let new_user = NewUser::customer(&email, hash)?.with_name(
        payload.first_name.unwrap_or_default().trim(),
        payload.last_name.unwrap_or_default().trim(),
    );
    let created = state.repos.users.insert(new_user).await?;

    tracing::info!(user_id = %created.id, "Registered user");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Exchange credentials for an access token
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let Json(payload) = payload?;
    let invalid = || ApiError::from(CoreError::Auth("Invalid email or password".into()));

    let email = user::normalize_email(&payload.email);
    let account = state
        .repos
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(invalid)?;

    let secret = payload.password;
    let hash = account.password_hash.clone();
    let matches =
        tokio::task::spawn_blocking(move || password::verify_password(&secret, &hash)).await??;

    if !matches {
        tracing::info!(user_id = %account.id, "Login rejected");
        return Err(invalid());
    }

    Ok(Json(state.tokens.issue(&account)?))
}

/// Profile of the caller, including owned items
pub async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

/// The caller's purchase history
pub async fn list_payments(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<PaymentRecord>>> {
    Ok(Json(state.repos.payments.list_for_user(user.id).await?))
}

/// Start a hosted checkout for one item
pub async fn create_checkout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> ApiResult<Json<CheckoutResponse>> {
    let checkout = state.checkout.as_ref().ok_or(ApiError::PaymentsDisabled)?;

    let Json(payload) = payload?;
    let item_id = payload
        .item_id
        .ok_or_else(|| ApiError::BadRequest("item_id is required".into()))?;

    let redirect = checkout.start(user.id, item_id).await?;

    Ok(Json(CheckoutResponse {
        redirect_url: redirect.redirect_url,
        payment_id: redirect.payment_id,
        session_id: redirect.session_id,
    }))
}

/// Stripe webhook receiver
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let reconciler = state.reconciler.as_ref().ok_or(ApiError::PaymentsDisabled)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PaymentError::Signature("Missing Stripe-Signature header".into()))?;

    let outcome = reconciler.handle(&body, signature).await.map_err(|e| {
        tracing::warn!(error = %e, "Webhook rejected");
        e
    })?;

    Ok(Json(WebhookResponse {
        detail: outcome.detail().into(),
    }))
}

/// Protected content of an owned item
pub async fn item_content(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    item_id: Result<Path<ItemId>, PathRejection>,
) -> ApiResult<Response> {
    let Path(item_id) = item_id?;
    let item = authorize_content(&state.repos, user.id, item_id).await?;
    content::serve(&state.config.content_root, &item).await
}

/// Store a contact form message, then acknowledge it by email.
///
/// The message is saved before any mail goes out; delivery failures are
/// only logged.
pub async fn submit_contact(
    State(state): State<AppState>,
    payload: Result<Json<ContactRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let Json(payload) = payload?;
    let message = NewContactMessage::new(&payload.name, &payload.email, &payload.message)?;

    let saved = state.repos.contacts.insert(message).await?;
    tracing::info!(message_id = %saved.id, "Contact message stored");

    state.notifications.dispatch(Notification::ContactReceived {
        message_id: saved.id,
        email: saved.email.clone(),
        name: saved.name.clone(),
    });
    alert_admin(&state, format!("New contact form submission from {}", saved.name));

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Your message has been received. We'll get back to you soon.".into(),
        }),
    ))
}

/// Add an address to the newsletter and send the welcome mail
pub async fn subscribe(
    State(state): State<AppState>,
    payload: Result<Json<SubscribeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let Json(payload) = payload?;
    let subscriber = NewSubscriber::new(&payload.email, &payload.first_name, &payload.last_name)?;

    let saved = state.repos.subscribers.insert(subscriber).await?;
    tracing::info!(subscriber_id = %saved.id, "Subscriber added");

    state.notifications.dispatch(Notification::Subscribed {
        subscriber_id: saved.id,
        email: saved.email.clone(),
        first_name: saved.first_name.clone(),
    });
    alert_admin(&state, format!("New subscriber: {} ({})", saved.full_name(), saved.email));

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Thank you for subscribing!".into(),
        }),
    ))
}

/// Contact inbox, newest first (admins only)
pub async fn list_contact_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<ContactMessage>>> {
    require_admin(&user)?;
    Ok(Json(state.repos.contacts.list().await?))
}

/// Newsletter list, newest first (admins only)
pub async fn list_subscribers(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<Subscriber>>> {
    require_admin(&user)?;
    Ok(Json(state.repos.subscribers.list().await?))
}

fn require_admin(user: &User) -> Result<(), CoreError> {
    if user.role.is_privileged() {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!("user {} is not an admin", user.id)))
    }
}

fn alert_admin(state: &AppState, subject: String) {
    if let Some(admin) = &state.config.admin {
        state.notifications.dispatch(Notification::AdminAlert {
            email: admin.email.clone(),
            subject,
        });
    }
}
