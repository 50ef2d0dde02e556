pub mod affirmations;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod error;
pub mod group;
pub mod manifestation;
pub mod middleware;
pub mod notifications;
pub mod profile;
pub mod routes;
pub mod stats;
pub mod state;
pub mod streak;
pub mod super_admin;
pub mod validate;
pub mod views;

pub use config::Config;
pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
