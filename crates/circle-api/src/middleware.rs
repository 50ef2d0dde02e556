use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;
use uuid::Uuid;

use circle_types::Role;
use circle_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

type BearerHeader = Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>;

/// The authenticated caller, freshly loaded from the database.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_super_admin: bool,
}

impl CurrentUser {
    /// The super admin can do everything an admin can.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin || self.is_super_admin
    }
}

/// Validate the bearer token, re-fetch the user and require an active account.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: BearerHeader,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, bearer).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Layered inside `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = req
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(CurrentUser::is_admin);
    if !is_admin {
        return Err(ApiError::Forbidden("Admin access required".into()));
    }
    Ok(next.run(req).await)
}

/// Anyone who is not the configured super admin, including anonymous
/// callers, gets the same 404 an unknown route would.
pub async fn require_super_admin(
    State(state): State<AppState>,
    bearer: BearerHeader,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = match authenticate(&state, bearer).await {
        Ok(user) if user.is_super_admin => user,
        Ok(user) => {
            debug!("Super-admin route hit by {}", user.email);
            return Err(ApiError::not_found("Not found"));
        }
        Err(_) => return Err(ApiError::not_found("Not found")),
    };
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

async fn authenticate(state: &AppState, bearer: BearerHeader) -> Result<CurrentUser, ApiError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.map_err(|_| ApiError::Authentication("No token, authorization denied".into()))?;

    let claims = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Authentication("Token is not valid".into()))?
    .claims;

    let user_id = claims.sub.to_string();
    let user = state
        .run_db(move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or_else(|| ApiError::Authentication("Token is not valid".into()))?;

    if !user.is_active {
        return Err(ApiError::Authentication("Account is deactivated".into()));
    }

    let is_super_admin = state.policy.is_super_admin(&user.email);
    Ok(CurrentUser {
        id: user.id,
        name: user.name,
        email: user.email,
        role: user.role,
        is_super_admin,
    })
}

/// Parse a path id, answering malformed ones with 400.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    raw.parse::<Uuid>()
        .map_err(|_| ApiError::validation(format!("Invalid {} id", what)))
}
