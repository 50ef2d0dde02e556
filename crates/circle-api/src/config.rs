use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};
use chrono::{FixedOffset, Offset};
use circle_media::CloudinaryConfig;

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "dev-secret-change-me",
    "change-me",
    "changeme",
    "secret",
    "your-secret-key",
    "your_jwt_secret",
];

/// Server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_ttl_days: i64,
    /// Lowercased invite list.
    pub allowed_emails: Vec<String>,
    pub super_admin_email: Option<String>,
    pub max_members: u32,
    /// Offset that defines the local calendar day for logs and streaks.
    pub utc_offset: FixedOffset,
    pub cors_origins: Vec<String>,
    pub fcm_credentials: Option<PathBuf>,
    pub cloudinary: Option<CloudinaryConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = std::env::var("CIRCLE_JWT_SECRET").context("CIRCLE_JWT_SECRET must be set")?;
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("CIRCLE_JWT_SECRET is empty or a placeholder; set a real secret");
        }

        let offset_minutes: i32 = env_or("CIRCLE_UTC_OFFSET_MINUTES", 0)?;
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60)
            .with_context(|| format!("CIRCLE_UTC_OFFSET_MINUTES out of range: {}", offset_minutes))?;

        let cloudinary = match (
            optional_env("CLOUDINARY_CLOUD_NAME"),
            optional_env("CLOUDINARY_API_KEY"),
            optional_env("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        Ok(Self {
            host: env_or("CIRCLE_HOST", "0.0.0.0".to_string())?,
            port: env_or("CIRCLE_PORT", 5000)?,
            db_path: env_or("CIRCLE_DB_PATH", PathBuf::from("circle.db"))?,
            jwt_secret,
            jwt_ttl_days: env_or("CIRCLE_JWT_TTL_DAYS", 7)?,
            allowed_emails: split_list(&optional_env("CIRCLE_ALLOWED_EMAILS").unwrap_or_default(), true),
            super_admin_email: optional_env("CIRCLE_SUPER_ADMIN_EMAIL").map(|e| e.to_lowercase()),
            max_members: env_or("CIRCLE_MAX_MEMBERS", 4)?,
            utc_offset,
            cors_origins: split_list(&optional_env("CIRCLE_CORS_ORIGINS").unwrap_or_default(), false),
            fcm_credentials: optional_env("CIRCLE_FCM_CREDENTIALS").map(PathBuf::from),
            cloudinary,
        })
    }

    /// Defaults with the given signing secret and nothing external configured.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            db_path: PathBuf::from("circle.db"),
            jwt_secret: jwt_secret.into(),
            jwt_ttl_days: 7,
            allowed_emails: Vec::new(),
            super_admin_email: None,
            max_members: 4,
            utc_offset: chrono::Utc.fix(),
            cors_origins: Vec::new(),
            fcm_credentials: None,
            cloudinary: None,
        }
    }

    pub fn is_invited(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.allowed_emails.iter().any(|allowed| *allowed == email)
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

fn split_list(raw: &str, lowercase: bool) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| if lowercase { s.to_lowercase() } else { s.to_string() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_list_is_case_insensitive() {
        let mut config = Config::with_secret("s3cret-for-tests");
        config.allowed_emails = split_list(" Ana@Circle.test, ,ben@circle.test", true);
        assert_eq!(config.allowed_emails, vec!["ana@circle.test", "ben@circle.test"]);
        assert!(config.is_invited("ANA@circle.test "));
        assert!(!config.is_invited("eve@circle.test"));
    }
}
