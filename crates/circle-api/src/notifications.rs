use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde::Serialize;
use tracing::{info, warn};

use circle_push::{PushMessage, PushOutcome, PushSender, ReminderSummary, send_daily_reminder};
use circle_types::api::{MessageResponse, ReminderPreferenceRequest, SaveTokenRequest};

use crate::error::{ApiError, ApiJson};
use crate::middleware::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct ReminderRunResponse {
    message: String,
    #[serde(flatten)]
    summary: ReminderSummary,
}

pub async fn save_token(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<SaveTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = req.token.trim().to_string();
    if token.is_empty() {
        return Err(ApiError::validation("FCM token is required"));
    }
    let id = current.id;
    state
        .run_db(move |db| db.set_push_token(&id, Some(&token)))
        .await?;
    info!("Push token saved for {}", current.email);
    Ok(Json(MessageResponse::new("FCM token saved successfully")))
}

pub async fn remove_token(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let id = current.id;
    state.run_db(move |db| db.set_push_token(&id, None)).await?;
    Ok(Json(MessageResponse::new("FCM token removed successfully")))
}

pub async fn set_reminder(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ReminderPreferenceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = current.id;
    let enabled = req.reminder_enabled;
    state
        .run_db(move |db| db.set_reminder_enabled(&id, enabled))
        .await?;
    let message = if enabled {
        "Daily reminders enabled"
    } else {
        "Daily reminders disabled"
    };
    Ok(Json(MessageResponse::new(message)))
}

/// Push a test message to the caller's own device.
pub async fn send_test(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let id = current.id.clone();
    let token = state
        .run_db(move |db| Ok(db.get_user_by_id(&id)?.and_then(|u| u.push_token)))
        .await?
        .ok_or_else(|| {
            ApiError::validation("No FCM token found for user. Please enable notifications first.")
        })?;

    let push = state
        .push
        .as_ref()
        .ok_or_else(|| ApiError::ExternalService("push messaging is not configured".into()))?;

    match push.send(&token, &PushMessage::test()).await {
        PushOutcome::Sent => Ok(Json(MessageResponse::new("Test notification sent successfully"))),
        PushOutcome::InvalidToken => {
            warn!("Test push to {} hit an invalid token, clearing it", current.email);
            let id = current.id;
            state.run_db(move |db| db.set_push_token(&id, None)).await?;
            Err(ApiError::ExternalService("device token rejected by provider".into()))
        }
        PushOutcome::TransientFailure => Err(ApiError::ExternalService("test push failed".into())),
    }
}

/// Run the nightly reminder job now.
pub async fn send_daily(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let push = state
        .push
        .as_ref()
        .ok_or_else(|| ApiError::ExternalService("push messaging is not configured".into()))?;

    let summary = send_daily_reminder(state.db.clone(), push.as_ref())
        .await
        .map_err(ApiError::Internal)?;

    Ok(Json(ReminderRunResponse {
        message: "Daily reminder sent successfully".into(),
        summary,
    }))
}
