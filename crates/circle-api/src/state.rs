use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::error;

use circle_db::Database;
use circle_gateway::{Dispatcher, GatewayContext};
use circle_media::CloudinaryClient;
use circle_push::FcmClient;
use circle_types::AccessPolicy;

use crate::config::Config;
use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub config: Config,
    pub policy: AccessPolicy,
    pub dispatcher: Dispatcher,
    pub push: Option<Arc<FcmClient>>,
    pub media: Option<CloudinaryClient>,
}

impl AppStateInner {
    /// State with push and media disabled; attach them with the `with_*` builders.
    pub fn new(db: Database, config: Config, dispatcher: Dispatcher) -> Self {
        let policy = AccessPolicy::new(config.super_admin_email.as_deref());
        Self {
            db: Arc::new(db),
            config,
            policy,
            dispatcher,
            push: None,
            media: None,
        }
    }

    pub fn with_push(mut self, push: FcmClient) -> Self {
        self.push = Some(Arc::new(push));
        self
    }

    pub fn with_media(mut self, media: CloudinaryClient) -> Self {
        self.media = Some(media);
        self
    }

    /// The local calendar day right now.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.config.utc_offset).date_naive()
    }

    /// Run a blocking DB closure off the async runtime.
    pub async fn run_db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.into())
            })?
            .map_err(ApiError::from)
    }

    pub fn gateway_context(&self) -> GatewayContext {
        GatewayContext {
            dispatcher: self.dispatcher.clone(),
            db: self.db.clone(),
            policy: self.policy.clone(),
            jwt_secret: self.config.jwt_secret.clone(),
        }
    }
}
