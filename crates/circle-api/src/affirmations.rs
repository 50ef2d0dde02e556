use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info};
use uuid::Uuid;

use circle_db::affirmations::AffirmationUpdate;
use circle_types::api::{
    AffirmationResponse, CreateAffirmationRequest, MessageResponse, ReorderRequest, ReorderResponse,
    UpdateAffirmationRequest,
};

use crate::error::{ApiError, ApiJson};
use crate::middleware::{CurrentUser, parse_id};
use crate::state::AppState;
use crate::validate;
use crate::views;

pub const DEFAULT_AFFIRMATIONS: [&str; 8] = [
    "I am very beautiful.",
    "I am healthy and full of energy.",
    "I am wealthy and financially abundant.",
    "Thank you for giving me a high-paying job that I love.",
    "Thank you for keeping my family healthy and safe.",
    "Thank you for keeping my friends healthy and happy.",
    "I do not hate anyone, and I release all grudges peacefully.",
    "I am mentally calm, peaceful, and balanced.",
];

/// Active affirmations in mirror-mode order. Seeds the defaults into an
/// empty store.
pub async fn list_active(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .run_db(|db| {
            if db.seed_affirmations(&DEFAULT_AFFIRMATIONS, None)? {
                info!("Seeded {} default affirmations", DEFAULT_AFFIRMATIONS.len());
            }
            db.list_affirmations(true)
        })
        .await?;
    Ok(Json(rows.into_iter().map(views::affirmation).collect::<Vec<_>>()))
}

/// Admin view, including deactivated entries.
pub async fn list_all(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let rows = state.run_db(|db| db.list_affirmations(false)).await?;
    Ok(Json(rows.into_iter().map(views::affirmation).collect::<Vec<_>>()))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<CreateAffirmationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = validate::text(&req.text, 1, validate::MAX_AFFIRMATION_LEN, "Affirmation text")?;
    let order = req.order.map(validate::order).transpose()?;

    let creator = current.id;
    let row = state
        .run_db(move |db| {
            let id = Uuid::new_v4().to_string();
            db.insert_affirmation(&id, &text, order, &creator)
        })
        .await?;
    info!("Affirmation {} created at order {}", row.id, row.sort_order);

    Ok((StatusCode::CREATED, Json(views::affirmation(row))))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateAffirmationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "affirmation")?.to_string();
    let update = AffirmationUpdate {
        text: req
            .text
            .as_deref()
            .map(|t| validate::text(t, 1, validate::MAX_AFFIRMATION_LEN, "Affirmation text"))
            .transpose()?,
        sort_order: req.order.map(validate::order).transpose()?,
        is_active: req.is_active,
    };

    let row = state
        .run_db(move |db| db.update_affirmation(&id, &update))
        .await?
        .ok_or_else(|| ApiError::not_found("Affirmation not found"))?;
    debug!("Affirmation {} updated", row.id);

    Ok(Json(views::affirmation(row)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "affirmation")?.to_string();
    let deleted = state.run_db(move |db| db.delete_affirmation(&id)).await?;
    if !deleted {
        return Err(ApiError::not_found("Affirmation not found"));
    }
    Ok(Json(MessageResponse::new("Affirmation deleted successfully")))
}

/// Swap the order values of exactly two affirmations, atomically.
pub async fn reorder(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.affirmation1_id.trim().is_empty() || req.affirmation2_id.trim().is_empty() {
        return Err(ApiError::validation("Both affirmation IDs are required"));
    }
    let (Ok(first), Ok(second)) = (
        req.affirmation1_id.trim().parse::<Uuid>(),
        req.affirmation2_id.trim().parse::<Uuid>(),
    ) else {
        return Err(ApiError::validation("Invalid affirmation IDs"));
    };
    if first == second {
        return Err(ApiError::validation("Cannot swap affirmation with itself"));
    }

    let (a, b) = state
        .run_db(move |db| db.swap_affirmation_order(&first.to_string(), &second.to_string()))
        .await?
        .ok_or_else(|| ApiError::not_found("One or both affirmations not found"))?;
    info!("Swapped affirmation order {} <-> {}", a.id, b.id);

    let affirmations: Vec<AffirmationResponse> = vec![views::affirmation(a), views::affirmation(b)];
    Ok(Json(ReorderResponse {
        message: "Affirmations reordered successfully".into(),
        affirmations,
    }))
}
