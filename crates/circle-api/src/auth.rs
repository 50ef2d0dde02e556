use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use circle_db::group::DEFAULT_GROUP_NAME;
use circle_db::users::NewUser;
use circle_types::Role;
use circle_types::api::{AuthResponse, Claims, LoginRequest, MeResponse, MeUser, RegisterRequest};

use crate::error::{ApiError, ApiJson};
use crate::group::WELCOME_MESSAGE;
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::validate;
use crate::views;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate::text(&req.name, 2, 50, "Name")?;
    let email = validate::email(&req.email)?;
    validate::password(&req.password)?;

    let is_super_admin = state.policy.is_super_admin(&email);
    if !is_super_admin && !state.config.is_invited(&email) {
        warn!("Registration refused for uninvited {}", email);
        return Err(ApiError::Forbidden(
            "Registration is by invitation only".into(),
        ));
    }

    let lookup = email.clone();
    let hidden = state.policy.hidden_email().map(str::to_string);
    let (existing, active_members) = state
        .run_db(move |db| {
            let existing = db.get_user_by_email(&lookup)?;
            let active = db.count_active_users(hidden.as_deref())?;
            Ok((existing, active))
        })
        .await?;

    if existing.is_some() {
        return Err(ApiError::Conflict("User already exists".into()));
    }
    if !is_super_admin && active_members >= state.config.max_members {
        return Err(ApiError::Forbidden(format!(
            "{} is full ({} members maximum)",
            DEFAULT_GROUP_NAME, state.config.max_members
        )));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();

    let id = user_id.to_string();
    let user_email = email.clone();
    let user = state
        .run_db(move |db| {
            db.create_user(&NewUser {
                id: &id,
                name: &name,
                email: &user_email,
                password_hash: &password_hash,
                role: Role::Admin,
                joined_at: Utc::now(),
            })?;
            if !is_super_admin {
                db.get_or_create_group(WELCOME_MESSAGE, &id)?;
                db.add_group_member(&id)?;
            }
            db.get_user_by_id(&id)?
                .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", id))
        })
        .await
        .map_err(|e| e.conflict_as("User already exists"))?;

    let token = create_token(&state.config.jwt_secret, state.config.jwt_ttl_days, user_id, &email)?;
    info!("{} registered", email);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully".into(),
            token,
            user: views::summary(&user),
        }),
    ))
}

/// Unknown email, wrong password and blocked account all look the same.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let lookup = email.clone();
    let user = state
        .run_db(move |db| db.get_user_by_email(&lookup))
        .await?
        .ok_or_else(|| ApiError::Authentication(INVALID_CREDENTIALS.into()))?;

    verify_password(&req.password, &user.password)?;
    if !user.is_active {
        return Err(ApiError::Authentication(INVALID_CREDENTIALS.into()));
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt user id '{}': {}", user.id, e)))?;
    let token = create_token(&state.config.jwt_secret, state.config.jwt_ttl_days, user_id, &user.email)?;

    Ok(Json(AuthResponse {
        message: "Login successful".into(),
        token,
        user: views::summary(&user),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let id = current.id.clone();
    let user = state
        .run_db(move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let role = if current.is_super_admin { Role::Admin } else { user.role };
    Ok(Json(MeResponse {
        user: MeUser {
            id: user.id,
            name: user.name,
            email: user.email,
            role,
            reminder_enabled: user.reminder_enabled,
            profile_picture: user.profile_picture,
        },
    }))
}

pub(crate) fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored: &str) -> Result<(), ApiError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt password hash: {}", e)))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::Authentication(INVALID_CREDENTIALS.into()))
}

pub(crate) fn create_token(secret: &str, ttl_days: i64, user_id: Uuid, email: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (Utc::now() + chrono::Duration::days(ttl_days)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))
}
