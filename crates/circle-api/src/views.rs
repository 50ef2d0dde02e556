//! Row -> response conversions.

use circle_db::{AffirmationRow, LogRow, UserRow};
use circle_types::api::{AdminUserResponse, AffirmationResponse, LogResponse, ProfileResponse, UserSummary};

pub fn log(row: &LogRow) -> LogResponse {
    LogResponse {
        id: row.id.clone(),
        date: row.day,
        status: row.status,
        completed_at: row.completed_at,
    }
}

pub fn affirmation(row: AffirmationRow) -> AffirmationResponse {
    AffirmationResponse {
        id: row.id,
        text: row.text,
        order: row.sort_order,
        is_active: row.is_active,
        created_by: row.created_by,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub fn summary(row: &UserRow) -> UserSummary {
    UserSummary {
        id: row.id.clone(),
        name: row.name.clone(),
        email: row.email.clone(),
        role: row.role,
    }
}

pub fn profile(row: UserRow) -> ProfileResponse {
    ProfileResponse {
        id: row.id,
        name: row.name,
        email: row.email,
        role: row.role,
        profile_picture: row.profile_picture,
        reminder_enabled: row.reminder_enabled,
        joined_at: row.joined_at,
    }
}

pub fn admin_user(row: UserRow) -> AdminUserResponse {
    AdminUserResponse {
        has_push_token: row.push_token.is_some(),
        id: row.id,
        name: row.name,
        email: row.email,
        role: row.role,
        is_active: row.is_active,
        profile_picture: row.profile_picture,
        reminder_enabled: row.reminder_enabled,
        current_streak: row.current_streak,
        longest_streak: row.longest_streak,
        streak_overridden: row.streak_overridden,
        joined_at: row.joined_at,
        created_at: row.created_at,
    }
}
