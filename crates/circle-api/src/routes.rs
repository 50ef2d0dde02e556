use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post, put},
};
use chrono::Utc;

use circle_types::api::HealthResponse;

use crate::middleware::{require_admin, require_auth, require_super_admin};
use crate::profile::MAX_PICTURE_BYTES;
use crate::state::AppState;
use crate::{affirmations, auth, group, manifestation, notifications, profile, stats, super_admin};

pub const API_BASE: &str = "/api/v1";

/// Room for multipart framing around the largest accepted picture.
const PICTURE_BODY_LIMIT: usize = MAX_PICTURE_BYTES + 64 * 1024;

/// The full REST surface, nested under [`API_BASE`].
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let member_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/manifestation/mark", post(manifestation::mark))
        .route("/manifestation/today", get(manifestation::today))
        .route("/manifestation/calendar/{*segments}", get(manifestation::get_calendar))
        .route("/stats/streak", get(stats::streak))
        .route("/stats/consistency", get(stats::consistency))
        .route("/group/details", get(group::details))
        .route("/group/thread", get(group::get_thread))
        .route("/affirmations", get(affirmations::list_active))
        .route("/profile", get(profile::get_profile).put(profile::update_profile))
        .route(
            "/profile/picture",
            post(profile::upload_picture)
                .delete(profile::delete_picture)
                .layer(DefaultBodyLimit::max(PICTURE_BODY_LIMIT)),
        )
        .route(
            "/notifications/token",
            post(notifications::save_token).delete(notifications::remove_token),
        )
        .route("/notifications/reminder", patch(notifications::set_reminder))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/group/thread", put(group::update_thread))
        .route("/affirmations", post(affirmations::create))
        .route("/affirmations/all", get(affirmations::list_all))
        .route("/affirmations/reorder", put(affirmations::reorder))
        .route(
            "/affirmations/{id}",
            put(affirmations::update).delete(affirmations::delete),
        )
        .route("/notifications/test", post(notifications::send_test))
        .route("/notifications/daily-reminder", post(notifications::send_daily))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let super_admin_routes = Router::new()
        .route("/users", get(super_admin::list_users).post(super_admin::create_user))
        .route(
            "/users/{id}",
            put(super_admin::update_user).delete(super_admin::delete_user),
        )
        .route("/users/{id}/details", get(super_admin::user_details))
        .route("/users/{id}/status", patch(super_admin::set_status))
        .route("/users/{id}/role", patch(super_admin::set_role))
        .route("/users/{id}/calendar", patch(super_admin::override_calendar))
        .route("/dashboard", get(super_admin::dashboard))
        .route("/notifications/test", post(super_admin::send_test_notification))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_super_admin));

    let api = Router::new()
        .merge(public_routes)
        .merge(member_routes)
        .merge(admin_routes)
        .nest("/super-admin", super_admin_routes)
        .with_state(state);

    Router::new().nest(API_BASE, api)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.run_db(|db| db.ping()).await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now(),
        database,
    })
}
