//! Shared application state for all routes.

use crate::datastore::DataStoreChain;
use crate::settings::Settings;
use sqlx::AnyPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: AnyPool,
    pub chain: Arc<DataStoreChain>,
    pub settings: Arc<Settings>,
}
