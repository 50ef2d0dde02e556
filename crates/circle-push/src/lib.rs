//! Device push notifications: the FCM HTTP v1 client and the nightly
//! reminder job that fans a single message out to every opted-in member.

pub mod fcm;
pub mod reminder;

pub use fcm::{FcmClient, PushError};
pub use reminder::{
    PushMessage, PushOutcome, PushSender, ReminderSummary, send_daily_reminder, tokens_to_remove,
};
