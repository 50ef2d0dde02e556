pub mod api;
pub mod events;
pub mod models;
pub mod policy;

pub use models::{LogStatus, Role};
pub use policy::AccessPolicy;
