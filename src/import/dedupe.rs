use std::collections::HashMap;

use crate::import::ImportRow;
use crate::model::url_key;

/// Appends names not already present, comparing case-insensitively and
/// keeping the first spelling.
fn union_names(into: &mut Vec<String>, from: Vec<String>) {
    for name in from {
        let folded = name.to_lowercase();
        if !into.iter().any(|existing| existing.to_lowercase() == folded) {
            into.push(name);
        }
    }
}

fn merge(into: &mut ImportRow, row: ImportRow) {
    if into.name.trim().is_empty() {
        into.name = row.name;
    }
    if into.description.is_none() {
        into.description = row.description;
    }
    if into.use_case.is_none() {
        into.use_case = row.use_case;
    }
    if into.pricing.is_none() {
        into.pricing = row.pricing;
    }
    union_names(&mut into.categories, row.categories);
    union_names(&mut into.tags, row.tags);
    into.is_favorite |= row.is_favorite;
    into.is_pinned |= row.is_pinned;
    into.is_needed |= row.is_needed;
}

/// Merges rows that share a URL
///
/// The key is the lowercased URL without trailing slashes. The merged row
/// keeps the position of the first occurrence.
pub fn dedupe(rows: Vec<ImportRow>) -> Vec<ImportRow> {
    let mut out: Vec<ImportRow> = Vec::with_capacity(rows.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for mut row in rows {
        let key = url_key(&row.url);
        match positions.get(&key) {
            Some(&index) => merge(&mut out[index], row),
            None => {
                let categories = std::mem::take(&mut row.categories);
                let tags = std::mem::take(&mut row.tags);
                union_names(&mut row.categories, categories);
                union_names(&mut row.tags, tags);
                positions.insert(key, out.len());
                out.push(row);
            }
        }
    }
    out
}
