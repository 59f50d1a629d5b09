//! HTTP request handlers for the site catalog API
//!
//! Handlers are thin: they extract the request, call into the relation,
//! query, bulk and import layers, and wrap the outcome in the response
//! envelope. Errors are returned as [`AppError`] and rendered by its
//! `IntoResponse` impl.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::bulk::{replay, BulkDeleteRequest, RestorePayload, UndoRequest};
use crate::database::AppState;
use crate::error::AppError;
use crate::export::{export, ExportFormat};
use crate::import;
use crate::list_query::{shape_full, ListQuery, ListResponse};
use crate::model::{
    ApiResponse, Category, CreateCategoryRequest, CreateSiteRequest, CreateTagRequest, ExportParams,
    ImportParams, ListParams, RelationsRequest, Tag, UpdateSiteRequest, Warning, WithWarnings,
};
use crate::relation_sync::{self, NewSite};
use crate::taxonomy;

/// Lists sites with filtering, sorting and pagination
///
/// # Query Parameters
///
/// - `user_id` - Owner filter
/// - `q` - Case-insensitive search over name and URL
/// - `category_id` / `tag_id` - Membership filter, or `uncategorized` / `untagged`
/// - `sort_by` - `created_at` (default), `updated_at`, `name` or `pricing`
/// - `sort_order` - `asc` or `desc` (default)
/// - `favorites` - `true` to keep favorites only
/// - `import_source` - Exact import source match
/// - `page` / `limit` - Pagination; `limit` is clamped to 1..=5000, default 100
/// - `fields` - `minimal`, `ids` or `full` (default)
///
/// # Example Request
///
/// `GET /sites?user_id=u1&category_id=uncategorized&sort_by=name&limit=50`
///
/// # Response
///
/// ```json
/// { "success": true, "data": [...], "totalCount": 42 }
/// ```
///
/// A `debug.failed_batches` list is attached when a relation batch failed
/// and the page was returned with partial relations.
pub async fn list_sites(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = ListQuery::from_params(&params);
    let result = query.execute(&state.catalog, state.batch_size)?;
    Ok(Json(ListResponse::from(result)))
}

/// Creates a site and attaches its categories and tags
///
/// # Request Body
///
/// ```json
/// {
///   "name": "GitHub",
///   "url": "github.com",
///   "pricing": "fully_free",
///   "user_id": "u1",
///   "category_ids": ["c1"],
///   "tag_ids": ["t1", "t2"]
/// }
/// ```
///
/// # Response
///
/// - **201 Created** - Site written; relation problems come back as `warnings`
/// - **400 Bad Request** - Missing or invalid fields
/// - **409 Conflict** - URL already in the collection; `data` holds the existing site
pub async fn create_site(
    State(state): State<AppState>,
    Json(payload): Json<CreateSiteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new = NewSite::try_from(payload)?;
    let created = relation_sync::create_site(&state.catalog, new, state.batch_size)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::from(created))))
}

pub async fn get_site(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let site = state
        .catalog
        .get_site(&id)?
        .ok_or_else(|| AppError::NotFound(format!("site {id}")))?;

    let (mut views, failures) = shape_full(&state.catalog, vec![site], state.batch_size)?;
    let view = views
        .pop()
        .ok_or_else(|| AppError::NotFound(format!("site {id}")))?;

    let warnings = failures
        .into_iter()
        .map(|failure| Warning::new("read_relations", "failed", json!(failure)))
        .collect();
    Ok(Json(ApiResponse::from(WithWarnings::with_warnings(view, warnings))))
}

/// Updates a site. `category_ids` / `tag_ids`, when present, replace the
/// site's membership of that kind.
pub async fn update_site(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateSiteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated = relation_sync::update_site(&state.catalog, &id, payload, state.batch_size)?;
    Ok(Json(ApiResponse::from(updated)))
}

/// Re-runs relation attach for a site whose earlier attach partly failed
pub async fn retry_relations(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<RelationsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let view = relation_sync::retry_relations(&state.catalog, &id, payload, state.batch_size)?;
    Ok(Json(ApiResponse::from(view)))
}

#[derive(serde::Deserialize, Debug, Default)]
pub struct OwnerParams {
    pub user_id: Option<String>,
}

pub async fn list_categories(
    State(state): State<AppState>,
    Query(params): Query<OwnerParams>,
) -> Result<impl IntoResponse, AppError> {
    let categories = state.catalog.entities::<Category>(params.user_id.as_deref())?;
    Ok(Json(ApiResponse::ok(categories)))
}

pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let category = taxonomy::create_category(&state.catalog, payload)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(category))))
}

/// Deletes a category that no site uses
///
/// - **200 OK** - Deleted; `data` holds the removed category
/// - **404 Not Found** - Unknown id
/// - **409 Conflict** - Still in use; `data.sites` lists the referencing sites
pub async fn delete_category(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let category = taxonomy::delete_entity::<Category>(&state.catalog, &id, state.batch_size)?;
    Ok(Json(ApiResponse::ok(category)))
}

pub async fn list_tags(
    State(state): State<AppState>,
    Query(params): Query<OwnerParams>,
) -> Result<impl IntoResponse, AppError> {
    let tags = state.catalog.entities::<Tag>(params.user_id.as_deref())?;
    Ok(Json(ApiResponse::ok(tags)))
}

pub async fn create_tag(
    State(state): State<AppState>,
    Json(payload): Json<CreateTagRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tag = taxonomy::create_tag(&state.catalog, payload)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(tag))))
}

pub async fn delete_tag(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let tag = taxonomy::delete_entity::<Tag>(&state.catalog, &id, state.batch_size)?;
    Ok(Json(ApiResponse::ok(tag)))
}

/// Deletes a selection of sites, categories or tags in one batched call
///
/// # Request Body
///
/// ```json
/// { "type": "sites", "ids": ["s1", "s2"], "view_id": "tab-1" }
/// ```
///
/// The response carries the `restore_payload` and opens an undo window for
/// the view; a later bulk delete in the same view replaces it.
pub async fn bulk_delete(
    State(state): State<AppState>,
    Json(payload): Json<BulkDeleteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .bulk
        .bulk_delete(&state.catalog, payload, state.batch_size)?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// Replays the pending restore payload of a view
///
/// - **200 OK** - Restored; skipped sites are listed in `warnings`
/// - **410 Gone** - Nothing pending, or the window has closed
pub async fn undo_bulk_delete(
    State(state): State<AppState>,
    Json(payload): Json<UndoRequest>,
) -> Result<impl IntoResponse, AppError> {
    let restored = state
        .bulk
        .undo(&state.catalog, payload.view_id.as_deref(), state.batch_size)?;
    Ok(Json(ApiResponse::from(restored)))
}

/// Replays a restore payload supplied by the client
pub async fn restore(
    State(state): State<AppState>,
    Json(payload): Json<RestorePayload>,
) -> Result<impl IntoResponse, AppError> {
    let restored = replay(&state.catalog, &payload, state.batch_size)?;
    Ok(Json(ApiResponse::from(restored)))
}

fn required_filename(params: &ImportParams) -> Result<&str, AppError> {
    params
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::validation("filename"))
}

/// Imports a JSON, CSV, HTML table or bookmark file
///
/// The raw file is the request body; `filename` selects the parser.
///
/// # Example Request
///
/// `POST /import?user_id=u1&filename=bookmarks.html`
///
/// # Response
///
/// - **200 OK** - `data` holds imported/skipped/discarded/merged counts
/// - **422 Unprocessable Entity** - The file could not be parsed; nothing was written
pub async fn import_file(
    State(state): State<AppState>,
    Query(params): Query<ImportParams>,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let user_id = params
        .user_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::validation("user_id"))?;
    let parsed = import::parse(required_filename(&params)?, &body)?;
    let summary = import::persist(&state.catalog, &user_id, parsed, state.batch_size)?;
    Ok(Json(ApiResponse::from(summary)))
}

/// Parses an import file and returns the normalized rows without writing
pub async fn preview_import(
    Query(params): Query<ImportParams>,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let parsed = import::parse(required_filename(&params)?, &body)?;
    Ok(Json(ApiResponse::ok(parsed)))
}

/// Downloads the owner's catalog as json, csv or html
pub async fn export_sites(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<impl IntoResponse, AppError> {
    let format = ExportFormat::parse(params.format.as_deref());
    let file = export(
        &state.catalog,
        params.user_id.as_deref().unwrap_or_default(),
        format,
        state.batch_size,
    )?;

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.body,
    ))
}
