use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::info;

use circle_db::GroupRow;
use circle_types::AccessPolicy;
use circle_types::api::{
    GroupDetailsResponse, MemberResponse, ThreadAuthor, ThreadResponse, ThreadUpdatedResponse,
    UpdateThreadRequest,
};

use crate::error::{ApiError, ApiJson};
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::streak;
use crate::validate;

pub const WELCOME_MESSAGE: &str = "Welcome to our manifestation journey! 🌙✨";

/// Roster with each member's live streak and consistency.
pub async fn details(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let today = state.today();
    let hidden = state.policy.hidden_email().map(str::to_string);
    let members = state
        .run_db(move |db| {
            let roster = db.list_group_members(hidden.as_deref())?;
            let mut members = Vec::with_capacity(roster.len());
            for user in roster {
                let logs = db.logs_for_user(&user.id)?;
                let stats = streak::for_user(&user, &logs, today);
                members.push(MemberResponse {
                    id: user.id,
                    name: user.name,
                    email: user.email,
                    role: user.role,
                    profile_picture: user.profile_picture,
                    current_streak: stats.current_streak,
                    consistency_percentage: stats.consistency_percentage,
                    joined_at: user.joined_at,
                });
            }
            Ok(members)
        })
        .await?;

    let members = state.policy.retain_visible(members, |m| m.email.as_str());
    Ok(Json(GroupDetailsResponse {
        total_members: members.len(),
        members,
    }))
}

pub async fn get_thread(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let creator = current.id;
    let group = state
        .run_db(move |db| db.get_or_create_group(WELCOME_MESSAGE, &creator))
        .await?;
    Ok(Json(thread_view(group, &state.policy)))
}

pub async fn update_thread(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<UpdateThreadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = validate::text(&req.message, 1, validate::MAX_THREAD_LEN, "Thread message")?;

    let editor = current.id.clone();
    let group = state
        .run_db(move |db| db.update_group_message(&message, &editor))
        .await?;
    info!("Thread updated by {}", current.email);

    Ok(Json(ThreadUpdatedResponse {
        message: "Thread updated successfully".into(),
        thread: thread_view(group, &state.policy),
    }))
}

/// The super admin never appears as a thread author.
fn thread_view(group: GroupRow, policy: &AccessPolicy) -> ThreadResponse {
    let created_by = match (group.created_by, group.created_by_name, group.created_by_email) {
        (Some(id), Some(name), Some(email)) if policy.is_visible(&email) => Some(ThreadAuthor { id, name }),
        _ => None,
    };
    ThreadResponse {
        thread: group.message,
        created_by,
        updated_at: group.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn group(email: &str) -> GroupRow {
        GroupRow {
            name: "Circle".into(),
            message: "Hello".into(),
            created_by: Some("u1".into()),
            created_by_name: Some("Ana".into()),
            created_by_email: Some(email.into()),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn super_admin_author_is_hidden() {
        let policy = AccessPolicy::new(Some("root@circle.test"));
        assert!(thread_view(group("root@circle.test"), &policy).created_by.is_none());

        let visible = thread_view(group("ana@circle.test"), &policy);
        assert_eq!(visible.created_by.map(|a| a.name).as_deref(), Some("Ana"));
        assert_eq!(visible.thread, "Hello");
    }
}
