use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use circle_db::Database;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

/// FCM caps a multicast at 500 tokens; batches mirror that limit.
pub const BATCH_SIZE: usize = 500;

/// A provider-agnostic push payload.
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
    /// Path the web client opens when the notification is clicked.
    pub link: Option<String>,
}

impl PushMessage {
    pub fn daily_reminder() -> Self {
        Self {
            title: "🌙 Manifestation Time".into(),
            body: "Look into the mirror and complete your affirmations".into(),
            data: BTreeMap::from([
                ("type".to_string(), "daily_reminder".to_string()),
                ("url".to_string(), "/mirror-mode".to_string()),
                ("timestamp".to_string(), chrono::Utc::now().to_rfc3339()),
            ]),
            link: Some("/mirror-mode".into()),
        }
    }

    pub fn test() -> Self {
        Self {
            title: "🧪 Test Notification".into(),
            body: "This is a test notification from Manifestation Circle!".into(),
            data: BTreeMap::from([
                ("type".to_string(), "test".to_string()),
                ("url".to_string(), "/dashboard".to_string()),
            ]),
            link: Some("/dashboard".into()),
        }
    }
}

/// What happened to a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Sent,
    /// The provider says the token will never work again.
    InvalidToken,
    /// Anything else. Not retried within a run.
    TransientFailure,
}

/// Something that can deliver a push to one device token.
pub trait PushSender: Send + Sync {
    fn send(&self, token: &str, message: &PushMessage) -> impl Future<Output = PushOutcome> + Send;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSummary {
    pub total_users: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub invalid_tokens_removed: usize,
}

/// Tokens to clear after a run: exactly those reported as permanently invalid.
pub fn tokens_to_remove(results: &[(String, PushOutcome)]) -> Vec<String> {
    let mut tokens: Vec<String> = results
        .iter()
        .filter(|(_, outcome)| *outcome == PushOutcome::InvalidToken)
        .map(|(token, _)| token.clone())
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

/// Send the daily reminder to every active member with a token and reminders
/// on, then clear the tokens the provider rejected as invalid.
pub async fn send_daily_reminder<S: PushSender>(db: Arc<Database>, sender: &S) -> anyhow::Result<ReminderSummary> {
    let lookup = db.clone();
    let recipients = tokio::task::spawn_blocking(move || lookup.reminder_recipients()).await??;

    info!("Found {} users with notifications enabled", recipients.len());
    if recipients.is_empty() {
        return Ok(ReminderSummary::default());
    }

    let message = PushMessage::daily_reminder();
    let mut results: Vec<(String, PushOutcome)> = Vec::with_capacity(recipients.len());

    for (idx, batch) in recipients.chunks(BATCH_SIZE).enumerate() {
        let sends = batch.iter().map(|r| sender.send(&r.token, &message));
        let outcomes = join_all(sends).await;

        let sent = outcomes.iter().filter(|o| **o == PushOutcome::Sent).count();
        info!("Batch {}: {}/{} sent successfully", idx + 1, sent, batch.len());

        results.extend(batch.iter().map(|r| r.token.clone()).zip(outcomes));
    }

    let success_count = results.iter().filter(|(_, o)| *o == PushOutcome::Sent).count();
    let invalid = tokens_to_remove(&results);

    let invalid_tokens_removed = if invalid.is_empty() {
        0
    } else {
        warn!("Removing {} invalid push tokens", invalid.len());
        tokio::task::spawn_blocking(move || db.clear_push_tokens(&invalid)).await??
    };

    let summary = ReminderSummary {
        total_users: recipients.len(),
        success_count,
        failure_count: results.len() - success_count,
        invalid_tokens_removed,
    };
    info!(
        "Daily reminder completed: {} sent, {} failed",
        summary.success_count, summary.failure_count
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;
    use circle_db::users::NewUser;
    use circle_types::Role;

    struct FakeSender {
        outcomes: HashMap<String, PushOutcome>,
        seen: Mutex<Vec<String>>,
    }

    impl PushSender for FakeSender {
        async fn send(&self, token: &str, _message: &PushMessage) -> PushOutcome {
            self.seen.lock().unwrap().push(token.to_string());
            self.outcomes.get(token).copied().unwrap_or(PushOutcome::Sent)
        }
    }

    fn member_with_token(db: &Database, email: &str, token: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        db.create_user(&NewUser {
            id: &id,
            name: "Member",
            email,
            password_hash: "hash",
            role: Role::Admin,
            joined_at: Utc::now(),
        })
        .unwrap();
        db.set_push_token(&id, Some(token)).unwrap();
        id
    }

    #[test]
    fn only_invalid_tokens_are_removed() {
        let results = vec![
            ("a".to_string(), PushOutcome::Sent),
            ("b".to_string(), PushOutcome::InvalidToken),
            ("c".to_string(), PushOutcome::TransientFailure),
            ("b".to_string(), PushOutcome::InvalidToken),
        ];
        assert_eq!(tokens_to_remove(&results), vec!["b".to_string()]);
        assert!(tokens_to_remove(&[]).is_empty());
    }

    #[tokio::test]
    async fn reminder_run_counts_outcomes_and_cleans_tokens() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        member_with_token(&db, "a@circle.test", "tok-a");
        let b = member_with_token(&db, "b@circle.test", "tok-b");
        let c = member_with_token(&db, "c@circle.test", "tok-c");

        let sender = FakeSender {
            outcomes: HashMap::from([
                ("tok-b".to_string(), PushOutcome::InvalidToken),
                ("tok-c".to_string(), PushOutcome::TransientFailure),
            ]),
            seen: Mutex::new(Vec::new()),
        };

        let summary = send_daily_reminder(db.clone(), &sender).await.unwrap();
        assert_eq!(
            summary,
            ReminderSummary {
                total_users: 3,
                success_count: 1,
                failure_count: 2,
                invalid_tokens_removed: 1,
            }
        );
        assert_eq!(sender.seen.lock().unwrap().len(), 3);
        assert!(db.get_user_by_id(&b).unwrap().unwrap().push_token.is_none());
        assert_eq!(db.get_user_by_id(&c).unwrap().unwrap().push_token.as_deref(), Some("tok-c"));
    }

    #[tokio::test]
    async fn empty_recipient_list_sends_nothing() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let sender = FakeSender {
            outcomes: HashMap::new(),
            seen: Mutex::new(Vec::new()),
        };
        let summary = send_daily_reminder(db, &sender).await.unwrap();
        assert_eq!(summary, ReminderSummary::default());
        assert!(sender.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn summary_serializes_in_camel_case() {
        let json = serde_json::to_value(ReminderSummary {
            total_users: 2,
            success_count: 1,
            failure_count: 1,
            invalid_tokens_removed: 0,
        })
        .unwrap();
        assert_eq!(json["totalUsers"], 2);
        assert_eq!(json["invalidTokensRemoved"], 0);
    }
}
