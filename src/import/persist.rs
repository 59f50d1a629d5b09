//! Writes parsed import rows through the regular site creation path

use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;

use crate::database::Catalog;
use crate::error::AppError;
use crate::import::{ImportFormat, ImportRow, ParsedImport};
use crate::model::{Warning, WithWarnings};
use crate::relation_maps::fold_name;
use crate::relation_sync::{create_site, CategoryInput, NewSite};
use crate::taxonomy::{ensure_named, new_category, new_tag};

/// Rows written per chunk
pub const IMPORT_CHUNK_SIZE: usize = 250;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub format: ImportFormat,
    pub imported: usize,
    /// Rows whose URL the owner already has
    pub skipped_existing: usize,
    pub discarded: usize,
    pub merged: usize,
}

fn names_in(rows: &[ImportRow], pick: impl Fn(&ImportRow) -> &Vec<String>) -> Vec<String> {
    rows.iter().flat_map(|row| pick(row).iter().cloned()).collect()
}

fn resolve(names: &[String], ids: &HashMap<String, String>) -> Vec<String> {
    names
        .iter()
        .filter_map(|name| ids.get(&fold_name(name)).cloned())
        .collect()
}

/// Persists `parsed` for `user_id`
///
/// Categories and tags are matched by case-insensitive name and created
/// when missing. A row whose URL is already in the collection is skipped.
/// Store failures other than URL conflicts abort the import; chunks
/// written before the failure stay written.
pub fn persist(
    catalog: &Catalog,
    user_id: &str,
    parsed: ParsedImport,
    batch_size: usize,
) -> Result<WithWarnings<ImportSummary>, AppError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::validation("user_id"));
    }

    let mut result = WithWarnings::new(ImportSummary {
        format: parsed.format,
        imported: 0,
        skipped_existing: 0,
        discarded: parsed.discarded,
        merged: parsed.merged,
    });
    let total = parsed.rows.len();
    let source = parsed.format.label();

    for (chunk_index, chunk) in parsed.rows.chunks(IMPORT_CHUNK_SIZE).enumerate() {
        let category_ids = ensure_named(catalog, user_id, &names_in(chunk, |r| &r.categories), |name| {
            new_category(user_id, name)
        })?;
        let tag_ids = ensure_named(catalog, user_id, &names_in(chunk, |r| &r.tags), |name| {
            new_tag(user_id, name)
        })?;

        for row in chunk {
            let new = NewSite {
                user_id: user_id.to_string(),
                name: row.name.clone(),
                url: row.url.clone(),
                pricing: row.pricing,
                description: row.description.clone(),
                use_case: row.use_case.clone(),
                is_favorite: row.is_favorite,
                is_needed: row.is_needed,
                is_pinned: row.is_pinned,
                import_source: Some(source.to_string()),
                categories: CategoryInput {
                    category_ids: Some(resolve(&row.categories, &category_ids)),
                    category_names: None,
                },
                tag_ids: resolve(&row.tags, &tag_ids),
            };

            match create_site(catalog, new, batch_size) {
                Ok(created) => {
                    result.value.imported += 1;
                    for warning in created.warnings {
                        result.push(warning);
                    }
                }
                Err(AppError::Conflict { .. }) => result.value.skipped_existing += 1,
                Err(AppError::Validation(fields)) => {
                    result.push(Warning::new(
                        "import_row",
                        "skipped",
                        json!({ "url": row.url, "errors": fields }),
                    ));
                }
                Err(err) => {
                    tracing::error!(chunk = chunk_index, error = %err, "import aborted");
                    return Err(err);
                }
            }
        }

        tracing::info!(
            chunk = chunk_index,
            done = ((chunk_index + 1) * IMPORT_CHUNK_SIZE).min(total),
            total,
            "import chunk written"
        );
    }

    tracing::info!(user_id, summary = ?result.value, "import finished");
    Ok(result)
}
