use crate::error::NotifyError;
use crate::push as push_service;
use crate::state;
use crate::types::push::PushSubscription;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde::Serialize;

use super::identity::CurrentUser;
use super::{ApiError, api_error};

#[derive(Serialize)]
pub(crate) struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub(crate) public_key: String,
}

pub(crate) async fn public_key(
    State(state): State<state::AppState>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    match push_service::load_vapid_config(&state.config) {
        push_service::VapidConfigStatus::Ready(vapid) if state.notifier.push_enabled() => {
            Ok(Json(PublicKeyResponse {
                public_key: vapid.public_key,
            }))
        }
        _ => Err(not_configured()),
    }
}

/// Browser `PushSubscription.toJSON()` shape.
#[derive(Debug, Deserialize)]
pub(crate) struct SubscribeRequest {
    pub(crate) endpoint: String,
    pub(crate) keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionKeys {
    pub(crate) p256dh: String,
    pub(crate) auth: String,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct SubscriptionResponse {
    pub(crate) status: String,
}

pub(crate) async fn subscribe(
    State(state): State<state::AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let subscription = PushSubscription {
        endpoint: request.endpoint.trim().to_string(),
        p256dh: request.keys.p256dh.trim().to_string(),
        auth: request.keys.auth.trim().to_string(),
    };
    let inserted = state
        .notifier
        .subscribe_push(&user, subscription)
        .await
        .map_err(|err| notify_error(&user, err))?;
    let status = if inserted {
        "subscribed"
    } else {
        "already_subscribed"
    };
    Ok(Json(SubscriptionResponse {
        status: status.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct UnsubscribeRequest {
    pub(crate) endpoint: String,
}

pub(crate) async fn unsubscribe(
    State(state): State<state::AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let endpoint = request.endpoint.trim();
    if endpoint.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "endpoint is required."));
    }
    let removed = state
        .notifier
        .unsubscribe_push(&user, endpoint)
        .await
        .map_err(|err| notify_error(&user, err))?;
    let status = if removed { "unsubscribed" } else { "not_found" };
    Ok(Json(SubscriptionResponse {
        status: status.to_string(),
    }))
}

fn not_configured() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "Push notifications are not configured.",
    )
}

fn notify_error(user: &str, err: NotifyError) -> ApiError {
    match err {
        NotifyError::PushNotConfigured => not_configured(),
        NotifyError::InvalidSubscription(reason) => api_error(StatusCode::BAD_REQUEST, reason),
        NotifyError::Store(err) => {
            tracing::error!(user, error = %err, "push subscription store failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update push subscription.",
            )
        }
    }
}
