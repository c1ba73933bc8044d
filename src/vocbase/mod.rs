pub mod auth;
pub mod database;
mod lifecycle;
pub mod maintenance;
pub mod proxy;
pub mod status;

pub use auth::{AuthInfo, AuthTable};
pub use database::{CreateOptions, Database, USERS_COLLECTION};
pub use proxy::{CollectionGuard, CollectionProxy};
pub use status::CollectionStatus;
