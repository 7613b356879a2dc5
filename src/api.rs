//! HTTP routes and the per-user WebSocket push channel.
//!
//! Callers identify themselves with the `x-user-id` header; the WebSocket
//! takes the same id as a `user_id` query parameter.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::assistant::{Assistant, ChatReply, ChatRequest, VoiceReply};
use crate::db::run_blocking;
use crate::dispatcher::NotificationHub;
use crate::error::AssistantError;
use crate::metrics::MetricsCollector;
use crate::models::{
    AppointmentWithReminders, Conversation, HealthInsight, Medication, MedicationUpdate, MedicationWithReminders,
    NewAppointment, NewMedication, NewTimer, NewUser, ProfileUpdate, Timer, User,
};
use crate::service::HealthService;

/// Header carrying the caller's user id
pub const USER_HEADER: &str = "x-user-id";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: HealthService,
    pub assistant: Assistant,
    pub hub: Arc<NotificationHub>,
    pub metrics: MetricsCollector,
}

impl IntoResponse for AssistantError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Validation(_) | Self::InvalidTime(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Conflict(detail) => (StatusCode::CONFLICT, detail.clone()),
            _ => {
                error!(error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            },
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, AssistantError>;

/// Run a service call on the blocking pool
async fn with_service<T, F>(state: &AppState, call: F) -> ApiResult<T>
where
    F: FnOnce(&HealthService) -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let service = state.service.clone();
    run_blocking(move || call(&service)).await
}

/// Authenticated caller, taken from the `x-user-id` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .map(CallerId)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": format!("missing or invalid {USER_HEADER} header") })),
                )
                    .into_response()
            })
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/users", post(register))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/medications", get(list_medications).post(create_medication))
        .route("/medications/{id}", put(update_medication).delete(delete_medication))
        .route(
            "/medications/{medication_id}/reminders/{reminder_id}/acknowledge",
            post(acknowledge_reminder),
        )
        .route("/reminders/{id}/dismiss", post(dismiss_reminder))
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/timers", get(list_timers).post(create_timer))
        .route("/timers/{id}/start", post(start_timer))
        .route("/insights", get(list_insights))
        .route("/insights/{id}/read", post(mark_insight_read))
        .route("/ai/chat", post(chat))
        .route("/ai/voice", post(voice))
        .route("/ai/conversations", get(list_conversations))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn message(text: &str) -> Json<serde_json::Value> {
    Json(json!({ "message": text }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn register(State(state): State<AppState>, Json(body): Json<NewUser>) -> ApiResult<(StatusCode, Json<User>)> {
    let user = with_service(&state, move |service| service.register_user(&body, Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_profile(State(state): State<AppState>, CallerId(user_id): CallerId) -> ApiResult<Json<User>> {
    Ok(Json(with_service(&state, move |service| service.get_profile(user_id)).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(body): Json<ProfileUpdate>,
) -> ApiResult<Json<User>> {
    Ok(Json(
        with_service(&state, move |service| service.update_profile(user_id, &body)).await?,
    ))
}

async fn list_medications(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> ApiResult<Json<Vec<MedicationWithReminders>>> {
    Ok(Json(with_service(&state, move |service| service.list_medications(user_id)).await?))
}

async fn create_medication(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(body): Json<NewMedication>,
) -> ApiResult<(StatusCode, Json<MedicationWithReminders>)> {
    let created = with_service(&state, move |service| service.create_medication(user_id, &body, Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_medication(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<i64>,
    Json(body): Json<MedicationUpdate>,
) -> ApiResult<Json<Medication>> {
    let updated =
        with_service(&state, move |service| service.update_medication(user_id, id, &body, Utc::now())).await?;
    Ok(Json(updated))
}

async fn delete_medication(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    with_service(&state, move |service| service.delete_medication(user_id, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn acknowledge_reminder(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path((medication_id, reminder_id)): Path<(i64, i64)>,
) -> ApiResult<Json<serde_json::Value>> {
    with_service(&state, move |service| {
        service.acknowledge_reminder(user_id, medication_id, reminder_id)
    })
    .await?;
    Ok(message("Medication marked as taken"))
}

async fn dismiss_reminder(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    with_service(&state, move |service| service.dismiss_reminder(user_id, id)).await?;
    Ok(message("Reminder dismissed"))
}

async fn list_appointments(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> ApiResult<Json<Vec<AppointmentWithReminders>>> {
    Ok(Json(with_service(&state, move |service| service.list_appointments(user_id)).await?))
}

async fn create_appointment(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(body): Json<NewAppointment>,
) -> ApiResult<(StatusCode, Json<AppointmentWithReminders>)> {
    let created = with_service(&state, move |service| service.create_appointment(user_id, &body, Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_timers(State(state): State<AppState>, CallerId(user_id): CallerId) -> ApiResult<Json<Vec<Timer>>> {
    Ok(Json(with_service(&state, move |service| service.list_timers(user_id)).await?))
}

async fn create_timer(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(body): Json<NewTimer>,
) -> ApiResult<(StatusCode, Json<Timer>)> {
    let timer = with_service(&state, move |service| service.create_timer(user_id, &body, Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(timer)))
}

async fn start_timer(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<i64>,
) -> ApiResult<Json<Timer>> {
    Ok(Json(with_service(&state, move |service| service.start_timer(user_id, id, Utc::now())).await?))
}

async fn list_insights(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> ApiResult<Json<Vec<HealthInsight>>> {
    Ok(Json(with_service(&state, move |service| service.list_insights(user_id)).await?))
}

async fn mark_insight_read(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    with_service(&state, move |service| service.mark_insight_read(user_id, id)).await?;
    Ok(message("Insight marked as read"))
}

async fn chat(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(body): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    Ok(Json(state.assistant.chat(user_id, &body.message).await?))
}

async fn voice(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(body): Json<ChatRequest>,
) -> ApiResult<Json<VoiceReply>> {
    Ok(Json(state.assistant.voice(user_id, &body.message).await?))
}

async fn list_conversations(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> ApiResult<Json<Vec<Conversation>>> {
    Ok(Json(with_service(&state, move |service| service.list_conversations(user_id)).await?))
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WsParams {
    user_id: i64,
}

/// Messages a client may send over the socket
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ClientEvent {
    MedicationTaken { reminder_id: i64, medication_id: i64 },
}

/// Replies to client messages
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ServerEvent {
    MedicationTaken { success: bool, message: String },
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let user_id = params.user_id;
    if let Err(e) = with_service(&state, move |service| service.get_profile(user_id)).await {
        return e.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_client_event(state: &AppState, user_id: i64, text: &str) -> Option<ServerEvent> {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(user_id, error = %e, "Ignoring unrecognized client message");
            return None;
        },
    };

    match event {
        ClientEvent::MedicationTaken {
            reminder_id,
            medication_id,
        } => {
            let acknowledged = with_service(state, move |service| {
                service.acknowledge_reminder(user_id, medication_id, reminder_id)
            })
            .await;
            let reply = match acknowledged {
                Ok(()) => ServerEvent::MedicationTaken {
                    success: true,
                    message: "Medication marked as taken".to_string(),
                },
                Err(e) => {
                    warn!(user_id, reminder_id, medication_id, error = %e, "Acknowledgment over socket failed");
                    ServerEvent::MedicationTaken {
                        success: false,
                        message: "Failed to update medication status".to_string(),
                    }
                },
            };
            Some(reply)
        },
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: i64) {
    let (mut sender, mut receiver) = socket.split();
    let mut notifications = state.hub.subscribe(user_id);
    state.metrics.set_live_connections(state.hub.live_connections());
    info!(user_id, "Notification channel connected");

    loop {
        let outgoing = tokio::select! {
            pushed = notifications.recv() => match pushed {
                Ok(notification) => serde_json::to_string(&notification),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(user_id, skipped, "Slow client missed notifications");
                    continue;
                },
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match handle_client_event(&state, user_id, text.as_str()).await {
                    Some(reply) => serde_json::to_string(&reply),
                    None => continue,
                },
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };

        let json = match outgoing {
            Ok(json) => json,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to encode socket message");
                continue;
            },
        };
        if sender.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }

    drop(notifications);
    state.hub.prune(user_id);
    state.metrics.set_live_connections(state.hub.live_connections());
    info!(user_id, "Notification channel disconnected");
}
