//! JSON import: site arrays and Chromium bookmark files

use serde_json::{Map, Value};

use crate::error::AppError;
use crate::import::{field_for_header, split_multi, Field, ImportRow};

const CHROMIUM_ROOT_FOLDERS: &[&str] = &["bookmark_bar", "other", "synced"];

pub fn parse(content: &str) -> Result<Vec<ImportRow>, AppError> {
    let value: Value = serde_json::from_str(content.trim_start_matches('\u{feff}'))
        .map_err(|e| AppError::ImportParse(format!("invalid JSON: {e}")))?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(object) => {
            if let Some(roots) = object.get("roots").and_then(Value::as_object) {
                return Ok(parse_chromium(roots));
            }
            match object.get("sites").or_else(|| object.get("data")) {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(AppError::ImportParse(
                        "JSON must be an array of sites or an object with a \"sites\" or \"data\" array".into(),
                    ))
                }
            }
        }
        _ => return Err(AppError::ImportParse("JSON root must be an array or an object".into())),
    };

    let rows: Vec<ImportRow> = items
        .iter()
        .filter_map(Value::as_object)
        .map(row_from_object)
        .collect();
    tracing::debug!(rows = rows.len(), "json parsed");
    Ok(rows)
}

/// Category/tag values: `["a", "b"]`, `[{"name": "a"}]` or `"a, b"`
fn names_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => split_multi(s),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(o) => o.get("name").and_then(Value::as_str).map(|s| s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Object(o) => o
            .get("name")
            .and_then(Value::as_str)
            .map(|s| vec![s.trim().to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn row_from_object(object: &Map<String, Value>) -> ImportRow {
    let mut row = ImportRow::default();
    for (key, value) in object {
        let Some(field) = field_for_header(key) else {
            continue;
        };
        match field {
            Field::Categories => row.categories.extend(names_of(value)),
            Field::Tags => row.tags.extend(names_of(value)),
            _ => {
                if let Some(text) = scalar_text(value) {
                    row.set(field, &text);
                }
            }
        }
    }
    row
}

fn walk_chromium(node: &Value, path: &mut Vec<String>, rows: &mut Vec<ImportRow>) {
    let Some(object) = node.as_object() else {
        return;
    };
    match object.get("type").and_then(Value::as_str) {
        Some("url") => {
            let url = object.get("url").and_then(Value::as_str).unwrap_or_default();
            let lowered = url.to_lowercase();
            if lowered.starts_with("http://") || lowered.starts_with("https://") {
                rows.push(ImportRow {
                    name: object.get("name").and_then(Value::as_str).unwrap_or_default().trim().to_string(),
                    url: url.to_string(),
                    categories: path.clone(),
                    ..ImportRow::default()
                });
            }
        }
        Some("folder") => {
            let name = object.get("name").and_then(Value::as_str).unwrap_or_default().trim();
            let named = !name.is_empty();
            if named {
                path.push(name.to_string());
            }
            if let Some(children) = object.get("children").and_then(Value::as_array) {
                for child in children {
                    walk_chromium(child, path, rows);
                }
            }
            if named {
                path.pop();
            }
        }
        _ => {}
    }
}

/// Chromium `Bookmarks` file. The root folders themselves are not
/// categories.
fn parse_chromium(roots: &Map<String, Value>) -> Vec<ImportRow> {
    let mut rows = Vec::new();
    for key in CHROMIUM_ROOT_FOLDERS {
        let Some(children) = roots
            .get(*key)
            .and_then(|root| root.get("children"))
            .and_then(Value::as_array)
        else {
            continue;
        };
        let mut path = Vec::new();
        for child in children {
            walk_chromium(child, &mut path, &mut rows);
        }
    }
    tracing::debug!(rows = rows.len(), "chromium bookmarks parsed");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Pricing;

    #[test]
    fn bare_array_with_synonyms() {
        let rows = parse(
            r#"[{"title": "GitHub", "link": "github.com", "categories": [{"name": "Dev"}], "tags": "code, git", "price": "free", "favorite": true}]"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "GitHub");
        assert_eq!(rows[0].url, "github.com");
        assert_eq!(rows[0].categories, vec!["Dev".to_string()]);
        assert_eq!(rows[0].tags, vec!["code".to_string(), "git".to_string()]);
        assert_eq!(rows[0].pricing, Some(Pricing::FullyFree));
        assert!(rows[0].is_favorite);
    }

    #[test]
    fn wrapped_in_sites_or_data() {
        assert_eq!(parse(r#"{"sites": [{"name": "A", "url": "a.io"}]}"#).unwrap().len(), 1);
        assert_eq!(parse(r#"{"data": [{"name": "B", "url": "b.io"}]}"#).unwrap().len(), 1);
    }

    #[test]
    fn chromium_bookmarks() {
        let rows = parse(
            r#"{"roots": {"bookmark_bar": {"type": "folder", "name": "Bookmarks bar", "children": [
                {"type": "folder", "name": "Design", "children": [
                    {"type": "url", "name": "Figma", "url": "https://figma.com"},
                    {"type": "url", "name": "Local", "url": "chrome://settings"}
                ]}
            ]}}}"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].categories, vec!["Design".to_string()]);
    }

    #[test]
    fn unsupported_shapes_are_rejected() {
        assert!(matches!(parse(r#"{"foo": 1}"#), Err(AppError::ImportParse(_))));
        assert!(matches!(parse("42"), Err(AppError::ImportParse(_))));
        assert!(matches!(parse("{not json"), Err(AppError::ImportParse(_))));
    }
}
