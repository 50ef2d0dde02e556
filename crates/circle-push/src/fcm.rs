use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::reminder::{PushMessage, PushOutcome, PushSender};

const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Refresh the access token this long before Google says it expires.
const TOKEN_SLACK_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to read service account: {0}")]
    Credentials(String),
    #[error("failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// The subset of a Google service-account key file the client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// FCM HTTP v1 client. One request per device token.
pub struct FcmClient {
    http: reqwest::Client,
    account: ServiceAccount,
    token: Mutex<Option<CachedToken>>,
}

impl FcmClient {
    pub fn new(account: ServiceAccount) -> Result<Self, PushError> {
        let http = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            http,
            account,
            token: Mutex::new(None),
        })
    }

    /// Load a service-account JSON file.
    pub fn from_file(path: &Path) -> Result<Self, PushError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PushError::Credentials(format!("{}: {}", path.display(), e)))?;
        let account: ServiceAccount =
            serde_json::from_str(&raw).map_err(|e| PushError::Credentials(e.to_string()))?;
        info!("FCM enabled for project {}", account.project_id);
        Self::new(account)
    }

    pub fn project_id(&self) -> &str {
        &self.account.project_id
    }

    async fn access_token(&self) -> Result<String, PushError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            scope: MESSAGING_SCOPE,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(self.account.private_key.as_bytes())?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key)?;

        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::TokenExchange(format!("{status}: {body}")));
        }

        let token: TokenResponse = response.json().await?;
        debug!("FCM access token refreshed, valid for {}s", token.expires_in);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in - TOKEN_SLACK_SECS),
        });
        Ok(token.access_token)
    }

    async fn try_send(&self, token: &str, message: &PushMessage) -> Result<PushOutcome, PushError> {
        let access_token = self.access_token().await?;
        let url = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.account.project_id
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(&message_body(token, message))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(PushOutcome::Sent);
        }

        let body = response.text().await.unwrap_or_default();
        let outcome = classify_failure(status.as_u16(), &body);
        warn!("FCM send failed ({}): {:?}", status, outcome);
        Ok(outcome)
    }
}

impl PushSender for FcmClient {
    async fn send(&self, token: &str, message: &PushMessage) -> PushOutcome {
        match self.try_send(token, message).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("FCM send error: {}", e);
                PushOutcome::TransientFailure
            }
        }
    }
}

/// The v1 `messages:send` body for one device, with web push options.
pub fn message_body(token: &str, message: &PushMessage) -> serde_json::Value {
    let mut webpush = json!({
        "headers": { "Urgency": "high" },
        "notification": {
            "title": message.title,
            "body": message.body,
            "icon": "/favicon.svg",
            "badge": "/favicon.svg",
            "tag": "manifestation-reminder",
            "requireInteraction": true,
        },
    });
    if let Some(link) = &message.link {
        webpush["fcm_options"] = json!({ "link": link });
    }

    json!({
        "message": {
            "token": token,
            "notification": { "title": message.title, "body": message.body },
            "data": message.data,
            "webpush": webpush,
        }
    })
}

/// Map an FCM error response to an outcome. Only unregistered or malformed
/// registration tokens count as permanently invalid.
pub fn classify_failure(status: u16, body: &str) -> PushOutcome {
    let parsed: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let error = &parsed["error"];

    let error_codes: Vec<&str> = error["details"]
        .as_array()
        .map(|details| details.iter().filter_map(|d| d["errorCode"].as_str()).collect())
        .unwrap_or_default();

    if status == 404 || error_codes.contains(&"UNREGISTERED") {
        return PushOutcome::InvalidToken;
    }

    let message = error["message"].as_str().unwrap_or_default().to_lowercase();
    if status == 400 && message.contains("registration token") {
        return PushOutcome::InvalidToken;
    }

    PushOutcome::TransientFailure
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn unregistered_tokens_are_invalid() {
        let body = r#"{"error":{"code":404,"status":"NOT_FOUND","details":[{"errorCode":"UNREGISTERED"}]}}"#;
        assert_eq!(classify_failure(404, body), PushOutcome::InvalidToken);
        assert_eq!(
            classify_failure(400, r#"{"error":{"details":[{"errorCode":"UNREGISTERED"}]}}"#),
            PushOutcome::InvalidToken
        );
    }

    #[test]
    fn malformed_registration_token_is_invalid() {
        let body = r#"{"error":{"code":400,"message":"The registration token is not a valid FCM registration token","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(classify_failure(400, body), PushOutcome::InvalidToken);
    }

    #[test]
    fn other_failures_are_transient() {
        assert_eq!(classify_failure(503, ""), PushOutcome::TransientFailure);
        assert_eq!(
            classify_failure(429, r#"{"error":{"details":[{"errorCode":"QUOTA_EXCEEDED"}]}}"#),
            PushOutcome::TransientFailure
        );
        assert_eq!(
            classify_failure(400, r#"{"error":{"message":"Invalid JSON payload"}}"#),
            PushOutcome::TransientFailure
        );
    }

    #[test]
    fn body_targets_one_token_with_link() {
        let message = PushMessage {
            title: "T".into(),
            body: "B".into(),
            data: BTreeMap::from([("type".to_string(), "test".to_string())]),
            link: Some("/dashboard".into()),
        };
        let body = message_body("tok", &message);
        assert_eq!(body["message"]["token"], "tok");
        assert_eq!(body["message"]["data"]["type"], "test");
        assert_eq!(body["message"]["webpush"]["fcm_options"]["link"], "/dashboard");
        assert_eq!(body["message"]["webpush"]["headers"]["Urgency"], "high");
    }
}
