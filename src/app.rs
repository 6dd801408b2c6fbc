use crate::adapters::UtcTimeProvider;
use crate::auth::IdentityVerifier;
use crate::config;
use crate::error::StartupError;
use crate::notify::{Notifier, NotifierOptions};
use crate::push as push_service;
use crate::state;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use std::sync::Arc;

mod identity;
mod notifications;
mod push;

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: &'static str,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: &'static str) -> ApiError {
    (status, Json(ErrorResponse { error }))
}

/// Composition root: one notifier per process, shared by every handler.
pub fn build_state(config: config::AppConfig) -> Result<state::AppState, StartupError> {
    let identity = IdentityVerifier::from_config(&config)?;
    let store = match config.subscriptions_path.as_ref() {
        Some(path) => push_service::LocalSubscriptionStore::open(path)?,
        None => {
            tracing::warn!("no subscriptions file configured, push subscriptions are kept in memory");
            push_service::LocalSubscriptionStore::in_memory()
        }
    };
    let sender = push_service::build_sender(&config);
    let options = NotifierOptions {
        replay_capacity: config.replay_capacity,
        stream_buffer: config.stream_buffer,
    };
    let notifier = Notifier::new(store, sender, UtcTimeProvider, options);
    Ok(state::AppState {
        config,
        identity,
        notifier: Arc::new(notifier),
    })
}

pub fn router(state: state::AppState) -> Router {
    Router::new()
        .route("/api/notifications/stream", get(notifications::stream))
        .route("/api/notifications/send", post(notifications::send))
        .route("/api/notifications/broadcast", post(notifications::broadcast))
        .route("/api/notifications/online", get(notifications::online_count))
        .route(
            "/api/notifications/online/{user_id}",
            get(notifications::online_status),
        )
        .route(
            "/api/notifications/users/{user_id}",
            delete(notifications::remove_user),
        )
        .route("/api/push/public-key", get(push::public_key))
        .route("/api/push/subscribe", post(push::subscribe))
        .route("/api/push/unsubscribe", post(push::unsubscribe))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub fn app(config: config::AppConfig) -> Result<Router, StartupError> {
    Ok(router(build_state(config)?))
}

pub(crate) async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::Request;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use base64::{URL_SAFE_NO_PAD, encode_config};
    use jwt_simple::algorithms::MACLike;
    use jwt_simple::prelude::{Claims, Duration as JwtDuration, HS256Key};
    use serde_json::Value as JsonValue;
    use serde_json::from_slice as json_from_slice;
    use serde_json::json;
    use tower::ServiceExt;

    fn test_state() -> state::AppState {
        build_state(config::AppConfig::default()).expect("build state")
    }

    fn auth_state(key_bytes: &[u8]) -> state::AppState {
        let app_config = config::AppConfig {
            auth: Some(config::AuthConfig {
                key: encode_config(key_bytes, URL_SAFE_NO_PAD),
                cookie_name: "padel_session".to_string(),
            }),
            ..Default::default()
        };
        build_state(app_config).expect("build state")
    }

    fn json_request(method: &str, uri: &str, body: JsonValue) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .header(identity::USER_ID_HEADER, "admin")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> JsonValue {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        json_from_slice(&body).expect("parse json")
    }

    #[tokio::test]
    async fn app__should_return_ok_on_health_endpoint() {
        // Given
        let app = app(config::AppConfig::default()).expect("app");

        // When
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        assert_eq!(body.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn send__should_queue_for_offline_user() {
        // Given
        let state = test_state();
        let request = json_request(
            "POST",
            "/api/notifications/send",
            json!({ "userId": "alice", "title": "T", "message": "M" }),
        );

        // When
        let response = router(state.clone())
            .oneshot(request)
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload["queued"], 1);
        assert_eq!(payload["sentLive"], 0);
        assert_eq!(payload["recipients"][0]["status"], "queued");
        assert_eq!(payload["recipients"][0]["push"]["attempted"], 0);
        assert_eq!(state.notifier.registry().pending("alice").len(), 1);
    }

    #[tokio::test]
    async fn send__should_reject_missing_message() {
        // Given
        let state = test_state();
        let request = json_request(
            "POST",
            "/api/notifications/send",
            json!({ "userId": "alice", "title": "T" }),
        );

        // When
        let response = router(state.clone())
            .oneshot(request)
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = read_json(response).await;
        assert_eq!(payload["error"], "title and message are required.");
        assert!(state.notifier.registry().pending("alice").is_empty());
    }

    #[tokio::test]
    async fn send__should_reject_missing_target() {
        let request = json_request(
            "POST",
            "/api/notifications/send",
            json!({ "userIds": [" "], "title": "T", "message": "M" }),
        );

        let response = router(test_state())
            .oneshot(request)
            .await
            .expect("request failed");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn send__should_fan_out_to_many_users() {
        // Given
        let state = test_state();
        let _bob = state.notifier.open_live_channel("bob");
        let request = json_request(
            "POST",
            "/api/notifications/send",
            json!({ "userIds": ["alice", "bob"], "title": "Match", "message": "Tonight", "type": "match" }),
        );

        // When
        let response = router(state.clone())
            .oneshot(request)
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload["sentLive"], 1);
        assert_eq!(payload["queued"], 1);
        let pending = state.notifier.registry().pending("alice");
        assert_eq!(pending[0].kind, "match");
    }

    #[tokio::test]
    async fn broadcast__should_report_live_deliveries() {
        // Given
        let state = test_state();
        let _x = state.notifier.open_live_channel("x");
        let _y = state.notifier.open_live_channel("y");
        let request = json_request(
            "POST",
            "/api/notifications/broadcast",
            json!({ "title": "Maintenance", "message": "Courts closed tomorrow" }),
        );

        // When
        let response = router(state.clone())
            .oneshot(request)
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload["delivered"], 2);
        assert_eq!(payload["dropped"], 0);
    }

    #[tokio::test]
    async fn online__should_report_count_and_status() {
        // Given
        let state = test_state();
        let _alice = state.notifier.open_live_channel("alice");

        // When
        let count = router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/notifications/online")
                    .header(identity::USER_ID_HEADER, "admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");
        let status = router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/notifications/online/alice")
                    .header(identity::USER_ID_HEADER, "admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        // Then
        assert_eq!(read_json(count).await["online"], 1);
        let status = read_json(status).await;
        assert_eq!(status["userId"], "alice");
        assert_eq!(status["online"], true);
    }

    #[tokio::test]
    async fn remove_user__should_drop_live_channel() {
        let state = test_state();
        let _alice = state.notifier.open_live_channel("alice");

        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/notifications/users/alice")
                    .header(identity::USER_ID_HEADER, "admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        assert_eq!(read_json(response).await["removed"], true);
        assert!(!state.notifier.is_online("alice"));
    }

    #[tokio::test]
    async fn admin_routes__should_reject_unauthenticated_callers() {
        // Given
        let state = auth_state(b"admin-auth-secret");
        let _victim = state.notifier.open_live_channel("victim");
        let requests = [
            json_request(
                "POST",
                "/api/notifications/send",
                json!({ "userId": "victim", "title": "T", "message": "M" }),
            ),
            json_request(
                "POST",
                "/api/notifications/broadcast",
                json!({ "title": "T", "message": "M" }),
            ),
            Request::builder()
                .uri("/api/notifications/online")
                .body(Body::empty())
                .unwrap(),
            Request::builder()
                .uri("/api/notifications/online/victim")
                .body(Body::empty())
                .unwrap(),
            Request::builder()
                .method("DELETE")
                .uri("/api/notifications/users/victim")
                .body(Body::empty())
                .unwrap(),
        ];

        for request in requests {
            // When
            let response = router(state.clone())
                .oneshot(request)
                .await
                .expect("request failed");

            // Then
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        assert!(state.notifier.is_online("victim"));
        assert!(state.notifier.registry().pending("victim").is_empty());
    }

    #[tokio::test]
    async fn remove_user__should_reject_missing_identity_without_auth() {
        let state = test_state();
        let _alice = state.notifier.open_live_channel("alice");

        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/notifications/users/alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(state.notifier.is_online("alice"));
    }

    #[tokio::test]
    async fn stream__should_reject_unidentified_caller() {
        let response = router(test_state())
            .oneshot(
                Request::builder()
                    .uri("/api/notifications/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read_json(response).await["error"], "unauthorized");
    }

    #[tokio::test]
    async fn stream__should_register_until_response_is_dropped() {
        // Given
        let state = test_state();

        // When
        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/notifications/stream")
                    .header(identity::USER_ID_HEADER, "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).expect("content type"),
            "text/event-stream"
        );
        assert_eq!(
            response.headers().get("x-accel-buffering").expect("buffering header"),
            "no"
        );
        assert!(state.notifier.is_online("alice"));

        drop(response);
        assert!(!state.notifier.is_online("alice"));
    }

    #[tokio::test]
    async fn stream__should_resolve_user_from_bearer_token() {
        // Given
        let key_bytes = b"stream-auth-secret";
        let state = auth_state(key_bytes);
        let issuer = state.config.app_name.clone();
        let claims = Claims::create(JwtDuration::from_hours(1))
            .with_issuer(issuer)
            .with_subject("player-9");
        let token = HS256Key::from_bytes(key_bytes)
            .authenticate(claims)
            .expect("authenticate token");

        // When
        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/notifications/stream")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .header(identity::USER_ID_HEADER, "spoofed")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.notifier.is_online("player-9"));
        assert!(!state.notifier.is_online("spoofed"));
    }

    #[tokio::test]
    async fn push_public_key__should_be_unavailable_without_vapid() {
        let response = router(test_state())
            .oneshot(
                Request::builder()
                    .uri("/api/push/public-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            read_json(response).await["error"],
            "Push notifications are not configured."
        );
    }

    #[tokio::test]
    async fn push_subscribe__should_be_unavailable_without_vapid() {
        let request = json_request(
            "POST",
            "/api/push/subscribe",
            json!({
                "endpoint": "https://push.example/a",
                "expirationTime": null,
                "keys": { "p256dh": "p256", "auth": "auth" }
            }),
        );

        let response = router(test_state())
            .oneshot(request)
            .await
            .expect("request failed");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn push_unsubscribe__should_remove_callers_endpoint() {
        // Given
        let state = test_state();
        let request = json_request(
            "POST",
            "/api/push/unsubscribe",
            json!({ "endpoint": "https://push.example/none" }),
        );

        // When
        let response = router(state)
            .oneshot(request)
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "not_found");
    }
}
