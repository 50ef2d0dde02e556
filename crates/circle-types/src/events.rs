use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An in-app notification delivered over the live gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub read: bool,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            message: message.into(),
            kind: kind.into(),
            created_at: chrono::Utc::now(),
            read: false,
        }
    }
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, name: String },

    /// A notification targeted at this connection
    NotificationNew { notification: Notification },

    /// Reply to a client `Ping`
    Pong,

    /// Outcome of a `TestNotification` command
    TestNotificationResult {
        success: bool,
        target_email: Option<String>,
        message: String,
    },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Application-level health check
    Ping,

    /// Deliver a notification to another connected user (super admin only)
    TestNotification {
        target_email: String,
        title: Option<String>,
        message: Option<String>,
        kind: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_adjacent_tagging() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"Identify","data":{"token":"abc"}}"#).unwrap();
        assert!(matches!(cmd, GatewayCommand::Identify { token } if token == "abc"));

        let ping: GatewayCommand = serde_json::from_str(r#"{"type":"Ping"}"#).unwrap();
        assert!(matches!(ping, GatewayCommand::Ping));
    }

    #[test]
    fn notification_kind_is_serialized_as_type() {
        let event = GatewayEvent::NotificationNew {
            notification: Notification::new("Hi", "Body", "info"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "NotificationNew");
        assert_eq!(json["data"]["notification"]["type"], "info");
        assert_eq!(json["data"]["notification"]["read"], false);
    }
}
