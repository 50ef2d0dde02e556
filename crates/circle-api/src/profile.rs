use axum::{
    Extension, Json,
    extract::{Multipart, State},
    response::IntoResponse,
};
use tracing::info;

use circle_media::cloudinary::profile_public_id;
use circle_types::api::{
    MessageResponse, PictureUpdatedResponse, ProfileUpdatedResponse, UpdateProfileRequest,
};

use crate::error::{ApiError, ApiJson};
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::views;

pub const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;
const PICTURE_FIELD: &str = "profilePicture";

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let id = current.id;
    let user = state
        .run_db(move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(views::profile(user)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = crate::validate::text(&req.name, 1, 50, "Name")?;
    let id = current.id;
    let user = state
        .run_db(move |db| {
            db.update_user_name(&id, &name)?;
            db.get_user_by_id(&id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ProfileUpdatedResponse {
        message: "Profile updated successfully".into(),
        user: views::profile(user),
    }))
}

/// Replace the caller's picture. The previous image is deleted best-effort
/// once the new one is stored.
pub async fn upload_picture(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let media = state
        .media
        .as_ref()
        .ok_or_else(|| ApiError::ExternalService("image storage is not configured".into()))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(PICTURE_FIELD) {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(ApiError::validation("Only image files are allowed"));
        }
        let bytes = field.bytes().await?;
        if bytes.len() > MAX_PICTURE_BYTES {
            return Err(ApiError::validation("Image must be 5MB or smaller"));
        }
        upload = Some((content_type, bytes.to_vec()));
        break;
    }
    let (content_type, bytes) = upload.ok_or_else(|| ApiError::validation("No file uploaded"))?;

    let id = current.id.clone();
    let previous = state
        .run_db(move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?
        .profile_picture;

    let url = media
        .upload_profile_picture(bytes, &content_type, &profile_public_id(&current.id))
        .await
        .map_err(|e| ApiError::ExternalService(e.to_string()))?;

    let id = current.id.clone();
    let stored = url.clone();
    let user = state
        .run_db(move |db| {
            db.set_profile_picture(&id, Some(&stored))?;
            db.get_user_by_id(&id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if let Some(old) = previous {
        media.destroy_by_url(&old).await;
    }
    info!("{} updated their profile picture", current.email);

    Ok(Json(PictureUpdatedResponse {
        message: "Profile picture updated successfully".into(),
        profile_picture: Some(url),
        user: views::profile(user),
    }))
}

pub async fn delete_picture(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let id = current.id.clone();
    let previous = state
        .run_db(move |db| {
            let user = db.get_user_by_id(&id)?;
            let previous = user.and_then(|u| u.profile_picture);
            if previous.is_some() {
                db.set_profile_picture(&id, None)?;
            }
            Ok(previous)
        })
        .await?
        .ok_or_else(|| ApiError::validation("No profile picture to delete"))?;

    if let Some(media) = state.media.as_ref() {
        media.destroy_by_url(&previous).await;
    }
    info!("{} removed their profile picture", current.email);

    Ok(Json(MessageResponse::new("Profile picture deleted successfully")))
}
