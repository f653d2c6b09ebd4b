//! Application assembly: settings to pool, migrations, hooks, data store chain and router.

use crate::datastore::DataStoreChain;
use crate::entity::PROFILE_MODEL;
use crate::error::AppError;
use crate::hooks::{HookRegistry, Operation, SaveProfileHook, TransactionPhase};
use crate::migration::apply_migrations;
use crate::routes::{api_routes, common_routes, doc_routes};
use crate::settings::{connect, DatabaseTarget, Settings, DEPLOYMENT_CONTEXT};
use crate::state::AppState;
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub const BODY_LIMIT: usize = 1024 * 1024;

pub struct Application {
    settings: Arc<Settings>,
    state: AppState,
    router: Router,
}

impl Application {
    /// Every failure here is fatal to startup.
    pub async fn build(settings: Settings) -> Result<Self, AppError> {
        let static_root = settings.static_resource_root()?;
        let props = settings.database_properties()?;
        let target = settings.resolve_database_target();
        tracing::info!(?target, dialect = %settings.select_sql_dialect(), "starting");

        let pool = connect(&props, target).await?;
        if target == DatabaseTarget::InMemory {
            apply_migrations(&settings.database, &settings.changelog_path(), &[DEPLOYMENT_CONTEXT]).await?;
        }

        let mut hooks = HookRegistry::new();
        hooks.bind(PROFILE_MODEL, Operation::Create, TransactionPhase::PostCommit, Arc::new(SaveProfileHook));
        let chain = settings.build_data_store_chain(pool.clone(), Arc::new(hooks)).await?;

        let settings = Arc::new(settings);
        let state = AppState {
            pool,
            chain: Arc::new(chain),
            settings: settings.clone(),
        };
        let router = router(state.clone(), static_root);
        Ok(Application { settings, state, router })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn chain(&self) -> &Arc<DataStoreChain> {
        &self.state.chain
    }

    pub async fn serve(self) -> Result<(), AppError> {
        let listener = TcpListener::bind(self.settings.listen_addr()).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        self.state.pool.close().await;
        tracing::info!("stopped");
        Ok(())
    }
}

/// Routes and static fallback (no directory index pages) behind CORS, tracing and the body limit,
/// outermost first.
pub fn router(state: AppState, static_root: PathBuf) -> Router {
    let settings = state.settings.clone();
    let mut app = Router::new()
        .merge(common_routes(state.clone()))
        .merge(api_routes(state));
    if settings.enable_swagger {
        app = app.merge(doc_routes());
    }
    app.fallback_service(ServeDir::new(static_root).append_index_html_on_directories(false))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(settings.cors.layer())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
