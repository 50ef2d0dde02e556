use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{info, warn};

pub const PROFILE_FOLDER: &str = "manifestation-circle/profiles";
/// 200x200 face-centred crop, automatic quality and format.
pub const PROFILE_TRANSFORMATION: &str = "c_fill,g_face,h_200,w_200/q_auto,f_auto";

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cloudinary rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

pub struct CloudinaryClient {
    http: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryClient {
    pub fn new(config: CloudinaryConfig) -> Result<Self, MediaError> {
        let http = reqwest::Client::builder().timeout(UPLOAD_TIMEOUT).build()?;
        info!("Cloudinary enabled for cloud {}", config.cloud_name);
        Ok(Self { http, config })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/{}",
            self.config.cloud_name, action
        )
    }

    /// Upload a profile picture under `public_id` and return its HTTPS URL.
    pub async fn upload_profile_picture(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        public_id: &str,
    ) -> Result<String, MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let params = BTreeMap::from([
            ("folder", PROFILE_FOLDER),
            ("public_id", public_id),
            ("timestamp", timestamp.as_str()),
            ("transformation", PROFILE_TRANSFORMATION),
        ]);
        let signature = sign(&params, &self.config.api_secret);

        let file = reqwest::multipart::Part::bytes(bytes)
            .file_name(public_id.to_string())
            .mime_str(content_type)?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature);
        for (key, value) in params {
            form = form.text(key, value.to_string());
        }

        let response = self.http.post(self.endpoint("upload")).multipart(form).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::Rejected { status, body });
        }

        let uploaded: UploadResponse = response.json().await?;
        info!("Uploaded profile picture {}/{}", PROFILE_FOLDER, public_id);
        Ok(uploaded.secure_url)
    }

    /// Delete the asset behind a previously returned URL. Failures are logged
    /// and swallowed.
    pub async fn destroy_by_url(&self, url: &str) {
        let Some(public_id) = public_id_from_url(url) else {
            warn!("Cannot derive public id from {}", url);
            return;
        };
        if let Err(e) = self.destroy(&public_id).await {
            warn!("Failed to delete old picture {}: {}", public_id, e);
        }
    }

    pub async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let params = BTreeMap::from([("public_id", public_id), ("timestamp", timestamp.as_str())]);
        let signature = sign(&params, &self.config.api_secret);

        let form = [
            ("public_id", public_id),
            ("timestamp", timestamp.as_str()),
            ("api_key", self.config.api_key.as_str()),
            ("signature", signature.as_str()),
        ];
        let response = self.http.post(self.endpoint("destroy")).form(&form).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::Rejected { status, body });
        }
        Ok(())
    }
}

/// Cloudinary request signature: SHA-1 over the sorted `key=value` pairs
/// joined by `&`, with the API secret appended.
pub fn sign(params: &BTreeMap<&str, &str>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha1::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// `https://.../upload/v17/manifestation-circle/profiles/user_1.jpg`
/// becomes `manifestation-circle/profiles/user_1`.
pub fn public_id_from_url(url: &str) -> Option<String> {
    let file = url.rsplit('/').next()?;
    let stem = file.split('.').next()?;
    if stem.is_empty() {
        return None;
    }
    Some(format!("{PROFILE_FOLDER}/{stem}"))
}

/// Fresh public id for a user's upload.
pub fn profile_public_id(user_id: &str) -> String {
    format!("user_{}_{}", user_id, chrono::Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_uses_sorted_params_and_secret() {
        let params = BTreeMap::from([("timestamp", "1315060510"), ("public_id", "sample_image")]);
        // Documented example from the Cloudinary signing guide.
        assert_eq!(
            sign(&params, "abcd"),
            "b4ad47fb4e25c7bf5f92a20089f9db59bc302313"
        );
    }

    #[test]
    fn public_id_strips_version_and_extension() {
        assert_eq!(
            public_id_from_url(
                "https://res.cloudinary.com/demo/image/upload/v1699/manifestation-circle/profiles/user_42_17.jpg"
            )
            .as_deref(),
            Some("manifestation-circle/profiles/user_42_17")
        );
        assert_eq!(public_id_from_url("https://host/").as_deref(), None);
    }

    #[test]
    fn profile_ids_are_prefixed_with_user() {
        assert!(profile_public_id("abc").starts_with("user_abc_"));
    }
}
