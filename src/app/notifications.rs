use crate::notify::{BroadcastReport, DispatchSummary};
use crate::state;
use crate::types::notification::RawNotification;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::HeaderName;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::identity::CurrentUser;
use super::{ApiError, api_error};

const NOTIFICATION_EVENT: &str = "notification";

pub(crate) async fn stream(
    State(state): State<state::AppState>,
    CurrentUser(user): CurrentUser,
) -> impl IntoResponse {
    let live = state.notifier.open_live_channel(&user);
    tracing::debug!(user = live.user(), "opened live channel");
    let events = live.map(|notification| {
        Event::default()
            .event(NOTIFICATION_EVENT)
            .json_data(&notification)
    });
    (
        [(HeaderName::from_static("x-accel-buffering"), "no")],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendRequest {
    pub(crate) user_id: Option<String>,
    #[serde(default)]
    pub(crate) user_ids: Vec<String>,
    #[serde(flatten)]
    pub(crate) notification: RawNotification,
}

pub(crate) async fn send(
    State(state): State<state::AppState>,
    CurrentUser(caller): CurrentUser,
    Json(request): Json<SendRequest>,
) -> Result<Json<DispatchSummary>, ApiError> {
    if !request.notification.has_content() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "title and message are required.",
        ));
    }

    let mut targets: Vec<String> = request
        .user_id
        .into_iter()
        .chain(request.user_ids)
        .map(|user| user.trim().to_string())
        .filter(|user| !user.is_empty())
        .collect();
    tracing::debug!(caller = %caller, recipients = targets.len(), "send requested");

    let summary = match targets.len() {
        0 => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "userId or userIds is required.",
            ));
        }
        1 => {
            let user = targets.remove(0);
            let report = state.notifier.notify_user(&user, request.notification).await;
            DispatchSummary::from_reports(vec![report])
        }
        _ => {
            state
                .notifier
                .notify_users(&targets, request.notification)
                .await
        }
    };
    Ok(Json(summary))
}

pub(crate) async fn broadcast(
    State(state): State<state::AppState>,
    CurrentUser(caller): CurrentUser,
    Json(notification): Json<RawNotification>,
) -> Result<Json<BroadcastReport>, ApiError> {
    if !notification.has_content() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "title and message are required.",
        ));
    }
    tracing::debug!(caller = %caller, "broadcast requested");
    Ok(Json(state.notifier.broadcast(notification)))
}

#[derive(Serialize, Deserialize)]
pub(crate) struct OnlineCountResponse {
    pub(crate) online: usize,
}

pub(crate) async fn online_count(
    State(state): State<state::AppState>,
    _caller: CurrentUser,
) -> Json<OnlineCountResponse> {
    Json(OnlineCountResponse {
        online: state.notifier.online_count(),
    })
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OnlineStatusResponse {
    pub(crate) user_id: String,
    pub(crate) online: bool,
}

pub(crate) async fn online_status(
    State(state): State<state::AppState>,
    _caller: CurrentUser,
    Path(user_id): Path<String>,
) -> Json<OnlineStatusResponse> {
    let online = state.notifier.is_online(&user_id);
    Json(OnlineStatusResponse { user_id, online })
}

#[derive(Serialize, Deserialize)]
pub(crate) struct RemoveUserResponse {
    pub(crate) removed: bool,
}

pub(crate) async fn remove_user(
    State(state): State<state::AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<String>,
) -> Json<RemoveUserResponse> {
    let removed = state.notifier.remove_user(&user_id);
    if removed {
        tracing::info!(caller = %caller, user = %user_id, "removed live channel and queued notifications");
    }
    Json(RemoveUserResponse { removed })
}
