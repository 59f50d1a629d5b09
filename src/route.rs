//! Route definitions for the site catalog API

use axum::routing::{delete, get, post};
use axum::Router;

use crate::database::AppState;
use crate::handler::{
    bulk_delete, create_category, create_site, create_tag, delete_category, delete_tag, export_sites,
    get_site, import_file, list_categories, list_sites, list_tags, preview_import, restore,
    retry_relations, undo_bulk_delete, update_site,
};

/// Creates the Axum router with all routes
///
/// # Route Definitions
///
/// - `GET|POST /sites` - List with filters / create
/// - `GET|PUT /sites/{id}` - Read one / update with membership reconcile
/// - `POST /sites/{id}/relations` - Retry relation attach
/// - `GET|POST /categories`, `DELETE /categories/{id}`
/// - `GET|POST /tags`, `DELETE /tags/{id}`
/// - `POST /bulk-delete`, `POST /bulk-delete/undo`, `POST /restore`
/// - `POST /import`, `POST /import/preview`, `GET /export`
///
/// # Example Usage
///
/// ```no_run
/// # use site_catalog::config::Config;
/// # use site_catalog::database::{init_db, AppState};
/// # use site_catalog::route::create_app;
/// let config = Config::from_env();
/// let db = init_db(&config.database_url).unwrap();
/// let app = create_app(AppState::new(db, &config));
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/sites", get(list_sites).post(create_site))
        .route("/sites/{id}", get(get_site).put(update_site))
        .route("/sites/{id}/relations", post(retry_relations))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/{id}", delete(delete_category))
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/{id}", delete(delete_tag))
        .route("/bulk-delete", post(bulk_delete))
        .route("/bulk-delete/undo", post(undo_bulk_delete))
        .route("/restore", post(restore))
        .route("/import", post(import_file))
        .route("/import/preview", post(preview_import))
        .route("/export", get(export_sites))
        .with_state(state)
}
