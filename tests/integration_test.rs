//! Integration tests for the site catalog API
//!
//! These tests drive the full router against a temporary database:
//! - Site creation with relations and URL normalization
//! - Duplicate and validation rejections
//! - Membership reconcile on update
//! - Filtered, sorted and paginated reads
//! - Usage checks, bulk delete and undo
//! - Import and export

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tower::ServiceExt;

use site_catalog::config::Config;
use site_catalog::database::{init_db, AppState};
use site_catalog::route::create_app;

/// Helper function to create a test application with a temporary database
fn setup_test_app() -> (axum::Router, NamedTempFile) {
    setup_with_config(Config::default())
}

fn setup_with_config(config: Config) -> (axum::Router, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = temp_db.path().to_str().unwrap();

    let db = init_db(db_path).expect("Failed to initialize test database");
    let app = create_app(AppState::new(db, &config));

    (app, temp_db)
}

/// Helper function to parse response body as JSON
async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

async fn send(app: &axum::Router, method: &str, uri: &str, payload: Option<Value>) -> (StatusCode, Value) {
    let request = match payload {
        Some(payload) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, response_json(response.into_body()).await)
}

async fn send_text(app: &axum::Router, uri: &str, content: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "text/plain")
                .body(Body::from(content.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, response_json(response.into_body()).await)
}

async fn create_category(app: &axum::Router, name: &str) -> String {
    let (status, body) = send(app, "POST", "/categories", Some(json!({ "user_id": "u1", "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn create_tag(app: &axum::Router, name: &str) -> String {
    let (status, body) = send(app, "POST", "/tags", Some(json!({ "user_id": "u1", "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn create_site(app: &axum::Router, payload: Value) -> Value {
    let (status, body) = send(app, "POST", "/sites", Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
    body
}

fn site(name: &str, url: &str) -> Value {
    json!({ "name": name, "url": url, "pricing": "fully_free", "user_id": "u1" })
}

fn names(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|site| site["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_create_site_with_relations() {
    let (app, _temp_db) = setup_test_app();

    let dev = create_category(&app, "Development").await;
    let git = create_tag(&app, "git").await;
    let hosting = create_tag(&app, "hosting").await;

    let body = create_site(
        &app,
        json!({
            "name": "GitHub",
            "url": "github.com",
            "pricing": "fully_free",
            "user_id": "u1",
            "category_ids": [dev],
            "tag_ids": [git, hosting]
        }),
    )
    .await;

    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["url"], "https://github.com");
    assert_eq!(body["data"]["pricing"], "fully_free");
    assert_eq!(body["data"]["categories"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["categories"][0]["name"], "Development");
    assert_eq!(body["data"]["tags"].as_array().unwrap().len(), 2);
    assert!(body.get("warnings").is_none());
}

#[tokio::test]
async fn test_create_site_duplicate_url_returns_existing() {
    let (app, _temp_db) = setup_test_app();

    let first = create_site(&app, site("GitHub", "github.com")).await;
    let (status, body) = send(&app, "POST", "/sites", Some(site("GitHub again", "https://GitHub.com/"))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "conflict");
    assert_eq!(body["data"]["id"], first["data"]["id"]);
    assert_eq!(body["data"]["name"], "GitHub");
}

#[tokio::test]
async fn test_create_site_missing_fields() {
    let (app, _temp_db) = setup_test_app();

    let (status, body) = send(&app, "POST", "/sites", Some(json!({ "name": "No url" }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["data"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f.as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["url", "pricing", "user_id"]);

    let (_, list) = send(&app, "GET", "/sites?user_id=u1", None).await;
    assert_eq!(list["totalCount"], 0);
}

#[tokio::test]
async fn test_create_site_rejects_foreign_scheme() {
    let (app, _temp_db) = setup_test_app();

    let (status, body) = send(&app, "POST", "/sites", Some(site("Bad", "javascript:alert(1)"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn test_unknown_tag_comes_back_as_warning() {
    let (app, _temp_db) = setup_test_app();

    let mut payload = site("Figma", "figma.com");
    payload["tag_ids"] = json!(["does-not-exist"]);
    let body = create_site(&app, payload).await;

    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["tags"].as_array().unwrap().len(), 0);
    assert_eq!(body["warnings"][0]["stage"], "site_tags");
    assert_eq!(body["warnings"][0]["status"], "failed");
}

#[tokio::test]
async fn test_update_reconciles_membership() {
    let (app, _temp_db) = setup_test_app();

    let t1 = create_tag(&app, "one").await;
    let t2 = create_tag(&app, "two").await;
    let t3 = create_tag(&app, "three").await;

    let mut payload = site("Notion", "notion.so");
    payload["tag_ids"] = json!([t1, t2]);
    let created = create_site(&app, payload).await;
    let id = created["data"]["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/sites/{id}"),
        Some(json!({ "tag_ids": [t2, t3], "is_pinned": true })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_pinned"], true);
    let mut tag_ids: Vec<&str> = body["data"]["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    tag_ids.sort();
    let mut expected = vec![t2.as_str(), t3.as_str()];
    expected.sort();
    assert_eq!(tag_ids, expected);
}

#[tokio::test]
async fn test_update_missing_site() {
    let (app, _temp_db) = setup_test_app();

    let (status, body) = send(&app, "PUT", "/sites/nope", Some(json!({ "name": "x" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_list_limit_is_clamped() {
    let (app, _temp_db) = setup_test_app();

    for i in 1..=3 {
        create_site(&app, site(&format!("Site {i}"), &format!("site{i}.com"))).await;
    }

    for limit in ["0", "-5", "abc", "99999999999999999999999"] {
        let (status, body) = send(&app, "GET", &format!("/sites?user_id=u1&limit={limit}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 3, "limit={limit}");
        assert_eq!(body["totalCount"], 3);
    }

    let (_, body) = send(&app, "GET", "/sites?user_id=u1&limit=2&page=2", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["totalCount"], 3);
}

#[tokio::test]
async fn test_list_uncategorized_and_untagged() {
    let (app, _temp_db) = setup_test_app();

    let cat = create_category(&app, "Design").await;
    let tag = create_tag(&app, "ui").await;

    let mut with_category = site("Categorized", "a.com");
    with_category["category_ids"] = json!([cat]);
    create_site(&app, with_category).await;

    let mut with_tag = site("Tagged", "b.com");
    with_tag["tag_ids"] = json!([tag]);
    create_site(&app, with_tag).await;

    create_site(&app, site("Bare", "c.com")).await;

    let (_, body) = send(&app, "GET", "/sites?user_id=u1&category_id=uncategorized&sort_by=name&sort_order=asc", None).await;
    assert_eq!(names(&body), vec!["Bare", "Tagged"]);
    assert_eq!(body["totalCount"], 2);

    let (_, body) = send(&app, "GET", "/sites?user_id=u1&tag_id=untagged&sort_by=name&sort_order=asc", None).await;
    assert_eq!(names(&body), vec!["Bare", "Categorized"]);

    let (_, body) = send(&app, "GET", &format!("/sites?user_id=u1&category_id={cat}"), None).await;
    assert_eq!(names(&body), vec!["Categorized"]);
}

#[tokio::test]
async fn test_list_pinned_first() {
    let (app, _temp_db) = setup_test_app();

    create_site(&app, site("Alpha", "alpha.com")).await;
    let mut pinned = site("Zulu", "zulu.com");
    pinned["is_pinned"] = json!(true);
    create_site(&app, pinned).await;
    create_site(&app, site("Mike", "mike.com")).await;

    let (_, body) = send(&app, "GET", "/sites?user_id=u1&sort_by=name&sort_order=asc", None).await;
    assert_eq!(names(&body), vec!["Zulu", "Alpha", "Mike"]);

    let (_, body) = send(&app, "GET", "/sites?user_id=u1&sort_by=name&sort_order=desc", None).await;
    assert_eq!(names(&body), vec!["Zulu", "Mike", "Alpha"]);
}

#[tokio::test]
async fn test_list_search_and_favorites() {
    let (app, _temp_db) = setup_test_app();

    let mut favorite = site("Figma", "figma.com");
    favorite["is_favorite"] = json!(true);
    create_site(&app, favorite).await;
    create_site(&app, site("Sketch", "sketch.com")).await;

    let (_, body) = send(&app, "GET", "/sites?user_id=u1&q=FIG", None).await;
    assert_eq!(names(&body), vec!["Figma"]);

    let (_, body) = send(&app, "GET", "/sites?user_id=u1&favorites=true", None).await;
    assert_eq!(names(&body), vec!["Figma"]);
}

#[tokio::test]
async fn test_list_field_modes() {
    let (app, _temp_db) = setup_test_app();

    let cat = create_category(&app, "Design").await;
    let mut payload = site("Figma", "figma.com");
    payload["category_ids"] = json!([cat]);
    create_site(&app, payload).await;

    let (_, body) = send(&app, "GET", "/sites?user_id=u1&fields=ids", None).await;
    assert_eq!(body["data"][0]["category_ids"], json!([cat]));
    assert!(body["data"][0].get("categories").is_none());

    let (_, body) = send(&app, "GET", "/sites?user_id=u1&fields=minimal", None).await;
    assert!(body["data"][0].get("category_ids").is_none());
    assert!(body["data"][0].get("categories").is_none());

    let (_, body) = send(&app, "GET", "/sites?user_id=u1", None).await;
    assert_eq!(body["data"][0]["categories"][0]["name"], "Design");
}

#[tokio::test]
async fn test_delete_category_in_use_is_rejected() {
    let (app, _temp_db) = setup_test_app();

    let cat = create_category(&app, "Design").await;
    let mut payload = site("Figma", "figma.com");
    payload["category_ids"] = json!([cat]);
    let created = create_site(&app, payload).await;
    let site_id = created["data"]["id"].as_str().unwrap();

    let (status, body) = send(&app, "DELETE", &format!("/categories/{cat}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "in_use");
    assert_eq!(body["data"]["sites"][0]["name"], "Figma");

    send(&app, "PUT", &format!("/sites/{site_id}"), Some(json!({ "category_ids": [] }))).await;

    let (status, body) = send(&app, "DELETE", &format!("/categories/{cat}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Design");

    let (status, _) = send(&app, "DELETE", &format!("/categories/{cat}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_delete_and_undo_round_trip() {
    let (app, _temp_db) = setup_test_app();

    let cat = create_category(&app, "Design").await;
    let tag = create_tag(&app, "ui").await;
    let mut ids = Vec::new();
    for (name, url, pricing, favorite, pinned) in [
        ("Figma", "figma.com", "freemium", true, false),
        ("Sketch", "sketch.com", "paid", false, true),
    ] {
        let payload = json!({
            "name": name,
            "url": url,
            "pricing": pricing,
            "user_id": "u1",
            "category_ids": [cat],
            "tag_ids": [tag],
            "description": format!("{name} for interface design"),
            "use_case": "mockups",
            "is_favorite": favorite,
            "is_pinned": pinned,
        });
        let created = create_site(&app, payload).await;
        ids.push(created["data"]["id"].as_str().unwrap().to_string());
    }

    let mut before = Vec::new();
    for id in &ids {
        let (status, body) = send(&app, "GET", &format!("/sites/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        before.push(body["data"].clone());
    }

    let (status, body) = send(
        &app,
        "POST",
        "/bulk-delete",
        Some(json!({ "type": "sites", "ids": ids, "view_id": "tab-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], 2);
    assert_eq!(body["data"]["reload"], true);
    assert_eq!(body["data"]["restore_payload"]["sites"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["restore_payload"]["site_tags"].as_array().unwrap().len(), 2);

    let (_, list) = send(&app, "GET", "/sites?user_id=u1", None).await;
    assert_eq!(list["totalCount"], 0);

    let (status, body) = send(&app, "POST", "/bulk-delete/undo", Some(json!({ "view_id": "tab-1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sites"], 2);
    assert_eq!(body["data"]["site_categories"], 2);
    assert_eq!(body["data"]["site_tags"], 2);

    // Core fields, timestamps and memberships come back exactly as they were
    for (id, expected) in ids.iter().zip(&before) {
        let (status, body) = send(&app, "GET", &format!("/sites/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let restored = &body["data"];
        for field in [
            "id", "name", "url", "pricing", "is_favorite", "is_pinned", "is_needed",
            "description", "use_case", "created_at", "updated_at",
        ] {
            assert_eq!(restored[field], expected[field], "field {field} of {id}");
        }
        assert_eq!(restored["categories"], expected["categories"]);
        assert_eq!(restored["tags"], expected["tags"]);
        assert_eq!(restored, expected);
    }

    // Single-shot
    let (status, body) = send(&app, "POST", "/bulk-delete/undo", Some(json!({ "view_id": "tab-1" }))).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "undo_unavailable");
}

#[tokio::test]
async fn test_category_and_tag_round_trip_keeps_records() {
    let (app, _temp_db) = setup_test_app();

    let cat = create_category(&app, "Design").await;
    let tag = create_tag(&app, "ui").await;
    let mut payload = site("Figma", "figma.com");
    payload["category_ids"] = json!([cat]);
    payload["tag_ids"] = json!([tag]);
    let created = create_site(&app, payload).await;
    let site_id = created["data"]["id"].as_str().unwrap().to_string();

    let (_, categories_before) = send(&app, "GET", "/categories?user_id=u1", None).await;
    let (_, tags_before) = send(&app, "GET", "/tags?user_id=u1", None).await;
    let (_, site_before) = send(&app, "GET", &format!("/sites/{site_id}"), None).await;
    assert!(categories_before["data"][0]["color"].is_string());

    for (kind, id, view) in [("categories", &cat, "cats"), ("tags", &tag, "tags")] {
        let (status, _) = send(
            &app,
            "POST",
            "/bulk-delete",
            Some(json!({ "type": kind, "ids": [id], "force": true, "view_id": view })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, site_mid) = send(&app, "GET", &format!("/sites/{site_id}"), None).await;
    assert_eq!(site_mid["data"]["categories"], json!([]));
    assert_eq!(site_mid["data"]["tags"], json!([]));

    for view in ["cats", "tags"] {
        let (status, _) = send(&app, "POST", "/bulk-delete/undo", Some(json!({ "view_id": view }))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, categories_after) = send(&app, "GET", "/categories?user_id=u1", None).await;
    let (_, tags_after) = send(&app, "GET", "/tags?user_id=u1", None).await;
    let (_, site_after) = send(&app, "GET", &format!("/sites/{site_id}"), None).await;

    assert_eq!(categories_after["data"], categories_before["data"]);
    assert_eq!(tags_after["data"], tags_before["data"]);
    assert_eq!(site_after["data"], site_before["data"]);
}

#[tokio::test]
async fn test_new_bulk_delete_replaces_pending_undo() {
    let (app, _temp_db) = setup_test_app();

    let first = create_site(&app, site("First", "first.com")).await;
    let second = create_site(&app, site("Second", "second.com")).await;

    send(&app, "POST", "/bulk-delete", Some(json!({ "type": "sites", "ids": [first["data"]["id"]] }))).await;
    send(&app, "POST", "/bulk-delete", Some(json!({ "type": "sites", "ids": [second["data"]["id"]] }))).await;

    let (status, _) = send(&app, "POST", "/bulk-delete/undo", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = send(&app, "GET", "/sites?user_id=u1", None).await;
    assert_eq!(names(&list), vec!["Second"]);
}

#[tokio::test]
async fn test_undo_after_window_closed() {
    let config = Config {
        undo_window: Duration::from_millis(0),
        ..Config::default()
    };
    let (app, _temp_db) = setup_with_config(config);

    let created = create_site(&app, site("Gone", "gone.com")).await;
    send(&app, "POST", "/bulk-delete", Some(json!({ "type": "sites", "ids": [created["data"]["id"]] }))).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    let (status, _) = send(&app, "POST", "/bulk-delete/undo", Some(json!({}))).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_bulk_delete_categories_usage_check_and_force() {
    let (app, _temp_db) = setup_test_app();

    let used = create_category(&app, "Used").await;
    let unused = create_category(&app, "Unused").await;
    let mut payload = site("Figma", "figma.com");
    payload["category_ids"] = json!([used]);
    create_site(&app, payload).await;

    let (status, body) = send(
        &app,
        "POST",
        "/bulk-delete",
        Some(json!({ "type": "categories", "ids": [used, unused] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["data"]["sites"][0]["name"], "Figma");

    let (status, body) = send(
        &app,
        "POST",
        "/bulk-delete",
        Some(json!({ "type": "categories", "ids": [used, unused], "force": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], 2);
    assert_eq!(body["data"]["restore_payload"]["site_categories"].as_array().unwrap().len(), 1);

    let (_, list) = send(&app, "GET", "/sites?user_id=u1&category_id=uncategorized", None).await;
    assert_eq!(list["totalCount"], 1);

    let (status, _) = send(&app, "POST", "/bulk-delete/undo", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = send(&app, "GET", &format!("/sites?user_id=u1&category_id={used}"), None).await;
    assert_eq!(names(&list), vec!["Figma"]);
}

#[tokio::test]
async fn test_restore_endpoint_replays_payload() {
    let (app, _temp_db) = setup_test_app();

    let tag = create_tag(&app, "ui").await;
    let mut payload = site("Figma", "figma.com");
    payload["tag_ids"] = json!([tag]);
    let created = create_site(&app, payload).await;

    let (_, deleted) = send(
        &app,
        "POST",
        "/bulk-delete",
        Some(json!({ "type": "sites", "ids": [created["data"]["id"]] })),
    )
    .await;
    let restore_payload = deleted["data"]["restore_payload"].clone();

    let (status, body) = send(&app, "POST", "/restore", Some(restore_payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sites"], 1);
    assert_eq!(body["data"]["site_tags"], 1);

    let (_, site) = send(&app, "GET", &format!("/sites/{}", created["data"]["id"].as_str().unwrap()), None).await;
    assert_eq!(site["data"]["tags"][0]["name"], "ui");
}

#[tokio::test]
async fn test_import_bookmarks_merges_duplicates() {
    let (app, _temp_db) = setup_test_app();

    let bookmarks = r#"<!DOCTYPE NETSCAPE-Bookmark-file-1>
<DL><p>
    <DT><H3>Bookmarks bar</H3>
    <DL><p>
        <DT><H3>Dev</H3>
        <DL><p>
            <DT><A HREF="https://github.com/">GitHub</A>
        </DL><p>
        <DT><H3>Tools</H3>
        <DL><p>
            <DT><A HREF="https://github.com">GitHub</A>
            <DT><A HREF="chrome://settings">Settings</A>
        </DL><p>
    </DL><p>
</DL><p>"#;

    let (status, preview) = send_text(&app, "/import/preview?filename=bookmarks.html", bookmarks).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["data"]["format"], "bookmarks");
    assert_eq!(preview["data"]["rows"].as_array().unwrap().len(), 1);
    assert_eq!(preview["data"]["rows"][0]["categories"], json!(["Dev", "Tools"]));

    let (status, body) = send_text(&app, "/import?user_id=u1&filename=bookmarks.html", bookmarks).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["imported"], 1);
    assert_eq!(body["data"]["merged"], 1);

    let (_, list) = send(&app, "GET", "/sites?user_id=u1&import_source=bookmarks", None).await;
    assert_eq!(list["totalCount"], 1);
    let mut categories: Vec<&str> = list["data"][0]["categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    categories.sort();
    assert_eq!(categories, vec!["Dev", "Tools"]);

    // Importing again skips URLs already in the collection
    let (_, body) = send_text(&app, "/import?user_id=u1&filename=bookmarks.html", bookmarks).await;
    assert_eq!(body["data"]["imported"], 0);
    assert_eq!(body["data"]["skipped_existing"], 1);
}

#[tokio::test]
async fn test_import_reuses_existing_category_by_name() {
    let (app, _temp_db) = setup_test_app();

    let design = create_category(&app, "Design").await;
    let csv = "name,url,category,pricing\nFigma,figma.com,design,Freemium\n";

    let (status, body) = send_text(&app, "/import?user_id=u1&filename=tools.csv", csv).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["imported"], 1);

    let (_, list) = send(&app, "GET", &format!("/sites?user_id=u1&category_id={design}"), None).await;
    assert_eq!(names(&list), vec!["Figma"]);
    assert_eq!(list["data"][0]["pricing"], "freemium");

    let (_, categories) = send(&app, "GET", "/categories?user_id=u1", None).await;
    assert_eq!(categories["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_import_parse_failure_writes_nothing() {
    let (app, _temp_db) = setup_test_app();

    let (status, body) = send_text(&app, "/import?user_id=u1&filename=broken.json", "[{\"name\": ").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "import_parse");

    let (_, list) = send(&app, "GET", "/sites?user_id=u1", None).await;
    assert_eq!(list["totalCount"], 0);
}

#[tokio::test]
async fn test_export_csv() {
    let (app, _temp_db) = setup_test_app();

    let tag = create_tag(&app, "ui").await;
    let mut payload = site("Figma", "figma.com");
    payload["tag_ids"] = json!([tag]);
    create_site(&app, payload).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/export?user_id=u1&format=csv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/csv"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("name,url,pricing,categories,tags,description,use_case,favorite,pinned")
    );
    assert_eq!(lines.next(), Some("Figma,https://figma.com,fully_free,,ui,,,false,false"));
}
