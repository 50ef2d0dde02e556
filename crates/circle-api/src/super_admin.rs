//! Account management for the hidden super admin.
//!
//! Every route here sits behind `require_super_admin`, and every lookup by id
//! goes through [`load_visible`], so the super admin's own record behaves as
//! if it did not exist.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use circle_db::UserRow;
use circle_db::users::{NewUser, UserFilter, UserUpdate};
use circle_gateway::connection::{delivery_message, test_notification};
use circle_types::api::{
    AdminUserEnvelope, CalendarOverrideRequest, CreateUserRequest, DashboardResponse, DashboardStats,
    MessageResponse, TestNotificationRequest, TestNotificationResponse, UpdateUserRequest,
    UserDetailsResponse, UserListQuery, UserListResponse, UserRoleRequest, UserStatusRequest,
};
use circle_types::{LogStatus, Role};

use crate::auth::hash_password;
use crate::error::{ApiError, ApiJson, ApiQuery};
use crate::group::WELCOME_MESSAGE;
use crate::middleware::{CurrentUser, parse_id};
use crate::state::AppState;
use crate::streak;
use crate::validate;
use crate::views;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;
const DETAIL_LOG_LIMIT: u32 = 365;

pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let role = match query.role.as_deref().unwrap_or("all") {
        "all" | "" => None,
        other => Some(
            other
                .parse::<Role>()
                .map_err(|_| ApiError::validation("Invalid role filter"))?,
        ),
    };
    let active = match query.status.as_deref().unwrap_or("all") {
        "all" | "" => None,
        "active" => Some(true),
        "blocked" => Some(false),
        _ => return Err(ApiError::validation("Invalid status filter")),
    };

    let hidden = state.policy.hidden_email().map(str::to_string);
    let search = query.search;
    let (rows, total) = state
        .run_db(move |db| {
            db.list_users(&UserFilter {
                exclude_email: hidden.as_deref(),
                search: search.as_deref(),
                role,
                active,
                limit,
                offset: (page - 1).saturating_mul(limit),
            })
        })
        .await?;

    let users = state
        .policy
        .retain_visible(rows, |u| u.email.as_str())
        .into_iter()
        .map(views::admin_user)
        .collect();

    Ok(Json(UserListResponse {
        users,
        total_pages: total.div_ceil(limit),
        current_page: page,
        total,
    }))
}

pub async fn user_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_visible(&state, &id).await?;
    let user_id = user.id.clone();
    let logs = state
        .run_db(move |db| db.recent_logs(&user_id, DETAIL_LOG_LIMIT))
        .await?;

    Ok(Json(UserDetailsResponse {
        current_streak: user.current_streak,
        longest_streak: user.longest_streak,
        manifestation_logs: logs.iter().map(views::log).collect(),
        user: views::admin_user(user),
    }))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate::text(&req.name, 2, 50, "Name")?;
    let email = validate::email(&req.email)?;
    validate::password(&req.password)?;
    if state.policy.is_super_admin(&email) {
        return Err(ApiError::Conflict("User already exists".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let role = req.role.unwrap_or(Role::User);
    let id = Uuid::new_v4().to_string();
    let creator = current.id;

    let user = state
        .run_db(move |db| {
            db.create_user(&NewUser {
                id: &id,
                name: &name,
                email: &email,
                password_hash: &password_hash,
                role,
                joined_at: Utc::now(),
            })?;
            db.get_or_create_group(WELCOME_MESSAGE, &creator)?;
            db.add_group_member(&id)?;
            fetch(db, &id)
        })
        .await
        .map_err(|e| e.conflict_as("User already exists"))?;
    info!("Super admin created {}", user.email);

    Ok((
        StatusCode::CREATED,
        Json(AdminUserEnvelope {
            message: "User created successfully".into(),
            user: views::admin_user(user),
        }),
    ))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target = load_visible(&state, &id).await?;

    let email = req.email.as_deref().map(validate::email).transpose()?;
    if email.as_deref().is_some_and(|e| state.policy.is_super_admin(e)) {
        return Err(ApiError::Conflict("Email already in use".into()));
    }
    let update = UserUpdate {
        name: req
            .name
            .as_deref()
            .map(|n| validate::text(n, 2, 50, "Name"))
            .transpose()?,
        email,
        role: req.role,
        is_active: req.is_active,
        reminder_enabled: req.reminder_enabled,
        joined_at: req.joined_at,
    };

    let user_id = target.id;
    let user = state
        .run_db(move |db| {
            db.update_user(&user_id, &update)?;
            fetch(db, &user_id)
        })
        .await
        .map_err(|e| e.conflict_as("Email already in use"))?;

    Ok(Json(AdminUserEnvelope {
        message: "User updated successfully".into(),
        user: views::admin_user(user),
    }))
}

pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UserStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target = load_visible(&state, &id).await?;
    let active = req.is_active;
    let user = state
        .run_db(move |db| {
            db.set_user_active(&target.id, active)?;
            fetch(db, &target.id)
        })
        .await?;
    info!("{} is now {}", user.email, if active { "active" } else { "blocked" });

    let message = if active {
        "User activated successfully"
    } else {
        "User blocked successfully"
    };
    Ok(Json(AdminUserEnvelope {
        message: message.into(),
        user: views::admin_user(user),
    }))
}

pub async fn set_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UserRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target = load_visible(&state, &id).await?;
    let role = req.role;
    let user = state
        .run_db(move |db| {
            db.set_user_role(&target.id, role)?;
            fetch(db, &target.id)
        })
        .await?;

    Ok(Json(AdminUserEnvelope {
        message: format!("User role updated to {}", role),
        user: views::admin_user(user),
    }))
}

/// Back-date or rewrite day records and pin or release the streak values.
pub async fn override_calendar(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<CalendarOverrideRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target = load_visible(&state, &id).await?;
    let today = state.today();

    let logs = req.logs.unwrap_or_default();
    if logs.iter().any(|l| l.date > today) {
        return Err(ApiError::validation("Cannot set logs in the future"));
    }
    let clear = req.clear_override.unwrap_or(false);
    let pin = (req.current_streak, req.longest_streak);

    let user = state
        .run_db(move |db| {
            for entry in &logs {
                let status = entry.status.unwrap_or(LogStatus::Done);
                let completed_at = match status {
                    LogStatus::Done => entry.completed_at.or_else(|| Some(Utc::now())),
                    LogStatus::Missed => None,
                };
                let log_id = Uuid::new_v4().to_string();
                db.upsert_log(&log_id, &target.id, entry.date, status, completed_at)?;
            }

            if clear {
                db.clear_streak_override(&target.id)?;
                let user = fetch(db, &target.id)?;
                let stats = streak::for_user(&user, &db.logs_for_user(&target.id)?, today);
                db.cache_streaks(&target.id, stats.current_streak, stats.longest_streak)?;
            } else if pin.0.is_some() || pin.1.is_some() {
                db.override_streaks(&target.id, pin.0, pin.1)?;
            }
            fetch(db, &target.id)
        })
        .await?;
    info!("Calendar override applied to {}", user.email);

    Ok(Json(AdminUserEnvelope {
        message: "Calendar updated successfully".into(),
        user: views::admin_user(user),
    }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let target = load_visible(&state, &id).await?;
    let user_id = target.id.clone();
    let deleted = state.run_db(move |db| db.delete_user(&user_id)).await?;
    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }

    if let (Some(picture), Some(media)) = (target.profile_picture.as_deref(), state.media.as_ref()) {
        media.destroy_by_url(picture).await;
    }
    warn!("Super admin deleted {}", target.email);

    Ok(Json(MessageResponse::new("User deleted successfully")))
}

pub async fn dashboard(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let hidden = state.policy.hidden_email().map(str::to_string);
    let stats = state
        .run_db(move |db| {
            let counts = db.user_counts(hidden.as_deref())?;
            Ok(DashboardStats {
                total_users: counts.total,
                total_admins: counts.admins,
                active_users: counts.active,
                blocked_users: counts.blocked,
                total_manifestations: db.count_logs(hidden.as_deref())?,
                total_affirmations: db.count_affirmations()?,
            })
        })
        .await?;

    Ok(Json(DashboardResponse { stats }))
}

/// Deliver a live notification over the gateway to one connected user.
pub async fn send_test_notification(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TestNotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target_email = validate::email(&req.target_email)?;
    let notification = test_notification(req.title, req.message, req.kind);
    let success = state.dispatcher.notify(&target_email, notification).await;

    Ok(Json(TestNotificationResponse {
        success,
        target_email,
        message: delivery_message(success).into(),
    }))
}

/// A user addressed by id, treating the super admin as nonexistent.
async fn load_visible(state: &AppState, raw_id: &str) -> Result<UserRow, ApiError> {
    let id = parse_id(raw_id, "user")?.to_string();
    let user = state.run_db(move |db| db.get_user_by_id(&id)).await?;
    match user {
        Some(user) if state.policy.is_visible(&user.email) => Ok(user),
        _ => Err(ApiError::not_found("User not found")),
    }
}

fn fetch(db: &circle_db::Database, id: &str) -> anyhow::Result<UserRow> {
    db.get_user_by_id(id)?
        .ok_or_else(|| anyhow::anyhow!("user {} vanished", id))
}
