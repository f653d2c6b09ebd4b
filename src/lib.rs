//! Profile directory service: profiles over a JSON:API style surface, full-text search,
//! analytic models and static resources, on an embedded SQLite or external PostgreSQL database.

pub mod analytics;
pub mod datastore;
pub mod entity;
pub mod error;
pub mod filters;
pub mod handlers;
pub mod hooks;
pub mod migration;
pub mod response;
pub mod routes;
pub mod search;
pub mod server;
pub mod settings;
pub mod sql;
pub mod state;

pub use datastore::{DataStore, DataStoreChain, ReadOutcome, ReadRequest, Resource, WriteOutcome, WriteRequest};
pub use entity::Profile;
pub use error::{AppError, ConfigError, MigrationError};
pub use hooks::{HookRegistry, LifecycleEvent, LifecycleHook, RequestScope};
pub use migration::{apply_migrations, MigrationReport};
pub use server::Application;
pub use settings::Settings;
pub use state::AppState;
