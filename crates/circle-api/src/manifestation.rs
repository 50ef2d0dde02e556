use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use circle_types::LogStatus;
use circle_types::api::{CalendarResponse, MarkResponse, TodayResponse};

use crate::calendar;
use crate::error::ApiError;
use crate::middleware::{CurrentUser, parse_id};
use crate::state::AppState;
use crate::views;

/// Mark today as done. A second mark on the same day is a conflict and leaves
/// the first record untouched.
pub async fn mark(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let today = state.today();
    let user_id = current.id.clone();
    let log = state
        .run_db(move |db| {
            let id = Uuid::new_v4().to_string();
            db.insert_log(&id, &user_id, today, LogStatus::Done, Some(Utc::now()))
        })
        .await
        .map_err(|e| e.conflict_as("Already marked for today"))?;

    info!("{} marked {} as done", current.email, today);
    Ok((
        StatusCode::CREATED,
        Json(MarkResponse {
            message: "Manifestation marked as complete!".into(),
            log: views::log(&log),
        }),
    ))
}

pub async fn today(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let today = state.today();
    let user_id = current.id;
    let log = state.run_db(move |db| db.get_log(&user_id, today)).await?;

    Ok(Json(TodayResponse {
        completed: log.as_ref().is_some_and(|l| l.status.is_done()),
        log: log.as_ref().map(views::log),
    }))
}

/// `/calendar/{year}/{month}` for the caller, or
/// `/calendar/{userId}/{year}/{month}` for another member.
pub async fn get_calendar(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(segments): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let parts: Vec<&str> = segments.split('/').filter(|s| !s.is_empty()).collect();
    match parts.as_slice() {
        [year, month] => {
            let (year, month) = calendar::parse_year_month(year, month)?;
            month_calendar(&state, current.id, year, month).await
        }
        [user_id, year, month] => user_calendar(&state, user_id, year, month).await,
        _ => Err(ApiError::not_found("Not found")),
    }
}

/// Any member may view another visible, active member's month.
async fn user_calendar(
    state: &AppState,
    user_id: &str,
    year: &str,
    month: &str,
) -> Result<Json<CalendarResponse>, ApiError> {
    let user_id = parse_id(user_id, "user")?.to_string();
    let (year, month) = calendar::parse_year_month(year, month)?;

    let lookup = user_id.clone();
    let target = state.run_db(move |db| db.get_user_by_id(&lookup)).await?;
    match target {
        Some(user) if user.is_active && state.policy.is_visible(&user.email) => {}
        _ => return Err(ApiError::not_found("User not found")),
    }

    month_calendar(state, user_id, year, month).await
}

async fn month_calendar(
    state: &AppState,
    user_id: String,
    year: i32,
    month: u32,
) -> Result<Json<CalendarResponse>, ApiError> {
    let (first, last) = calendar::month_bounds(year, month)
        .ok_or_else(|| ApiError::validation("Invalid year or month"))?;
    let logs = state
        .run_db(move |db| db.logs_between(&user_id, first, last))
        .await?;

    Ok(Json(CalendarResponse {
        year,
        month,
        calendar: calendar::aggregate(year, month, &logs),
    }))
}
