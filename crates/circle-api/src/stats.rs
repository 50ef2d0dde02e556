use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Days;

use circle_types::api::{ConsistencyResponse, WindowStats};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::streak;
use crate::views;

const WINDOW_DAYS: u64 = 30;
const RECENT_ACTIVITY: usize = 7;

/// Computed streaks are cached on the user row unless a manual override is set.
pub async fn streak(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let today = state.today();
    let user_id = current.id;
    let stats = state
        .run_db(move |db| {
            let user = db
                .get_user_by_id(&user_id)?
                .ok_or_else(|| anyhow::anyhow!("user {} vanished", user_id))?;
            let logs = db.logs_for_user(&user_id)?;
            let stats = streak::for_user(&user, &logs, today);
            if !user.streak_overridden {
                db.cache_streaks(&user_id, stats.current_streak, stats.longest_streak)?;
            }
            Ok(stats)
        })
        .await?;

    Ok(Json(stats))
}

/// Done-over-logged ratio for the last 30 days plus the latest week of logs.
pub async fn consistency(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let today = state.today();
    let from = today
        .checked_sub_days(Days::new(WINDOW_DAYS - 1))
        .unwrap_or(today);
    let user_id = current.id;
    let logs = state
        .run_db(move |db| db.logs_between(&user_id, from, today))
        .await?;

    let total = logs.len() as u32;
    let completed = logs.iter().filter(|l| l.status.is_done()).count() as u32;
    let skip = logs.len().saturating_sub(RECENT_ACTIVITY);

    Ok(Json(ConsistencyResponse {
        last30_days: WindowStats {
            completed,
            total,
            percentage: streak::percentage(completed, total),
        },
        recent_activity: logs[skip..].iter().map(views::log).collect(),
    }))
}
