//! Category and tag lifecycle
//!
//! Creation, the pre-delete usage check, and the find-or-create step the
//! importer uses to turn folder and tag names into records.

use std::collections::HashMap;

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};

use crate::database::{generate_id, Catalog};
use crate::error::AppError;
use crate::model::{
    Category, CreateCategoryRequest, CreateTagRequest, RelationEntity, RelationKind, SiteSummary,
    Tag,
};
use crate::relation_maps::{fold_name, index_by_folded_name};

const PALETTE: [&str; 8] = [
    "#ef4444", "#f97316", "#eab308", "#22c55e", "#14b8a6", "#3b82f6", "#8b5cf6", "#ec4899",
];

/// Stable color for records created without one
pub fn palette_color(name: &str) -> String {
    let index = name.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    PALETTE[index % PALETTE.len()].to_string()
}

fn required(value: Option<String>, field: &str, missing: &mut Vec<String>) -> String {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(v) => v,
        None => {
            missing.push(field.to_string());
            String::new()
        }
    }
}

pub fn create_category(catalog: &Catalog, req: CreateCategoryRequest) -> Result<Category, AppError> {
    let mut missing = Vec::new();
    let user_id = required(req.user_id, "user_id", &mut missing);
    let name = required(req.name, "name", &mut missing);
    if !missing.is_empty() {
        return Err(AppError::Validation(missing));
    }

    let category = Category {
        id: generate_id(),
        color: req.color.or_else(|| Some(palette_color(&name))),
        user_id,
        name,
        created_at: Utc::now(),
    };
    catalog.insert_entities(std::slice::from_ref(&category))?;
    tracing::info!(id = %category.id, name = %category.name, "created category");

    Ok(category)
}

pub fn create_tag(catalog: &Catalog, req: CreateTagRequest) -> Result<Tag, AppError> {
    let mut missing = Vec::new();
    let user_id = required(req.user_id, "user_id", &mut missing);
    let name = required(req.name, "name", &mut missing);
    if !missing.is_empty() {
        return Err(AppError::Validation(missing));
    }

    let tag = Tag {
        id: generate_id(),
        color: req.color.or_else(|| Some(palette_color(&name))),
        is_needed: req.is_needed.unwrap_or(false),
        user_id,
        name,
        created_at: Utc::now(),
    };
    catalog.insert_entities(std::slice::from_ref(&tag))?;
    tracing::info!(id = %tag.id, name = %tag.name, "created tag");

    Ok(tag)
}

/// Every site that links to any of the given categories or tags
pub fn referencing_sites(
    catalog: &Catalog,
    kind: RelationKind,
    ids: &[String],
    batch_size: usize,
) -> Result<Vec<SiteSummary>, AppError> {
    let mut site_ids: Vec<String> = Vec::new();
    for chunk in ids.chunks(batch_size.max(1)) {
        for link in catalog.links_for_targets(kind, chunk)? {
            if !site_ids.contains(&link.site_id) {
                site_ids.push(link.site_id);
            }
        }
    }

    let mut sites = Vec::with_capacity(site_ids.len());
    for chunk in site_ids.chunks(batch_size.max(1)) {
        sites.extend(catalog.sites_by_ids(chunk)?.iter().map(SiteSummary::from));
    }
    Ok(sites)
}

/// Usage check: fails with [`AppError::InUse`] listing the referencing sites
pub fn ensure_unused(
    catalog: &Catalog,
    kind: RelationKind,
    ids: &[String],
    batch_size: usize,
) -> Result<(), AppError> {
    let sites = referencing_sites(catalog, kind, ids, batch_size)?;
    if sites.is_empty() {
        return Ok(());
    }

    tracing::info!(kind = kind.label(), ids = ?ids, sites = sites.len(), "delete rejected, still in use");
    let entity = match ids {
        [single] => format!("{} {single}", kind.label()),
        _ => format!("{} selection", kind.label()),
    };
    Err(AppError::InUse { entity, sites })
}

/// Deletes one category or tag after the usage check passes
pub fn delete_entity<T>(catalog: &Catalog, id: &str, batch_size: usize) -> Result<T, AppError>
where
    T: RelationEntity + DeserializeOwned,
{
    let record = catalog
        .get_entity::<T>(id)?
        .ok_or_else(|| AppError::NotFound(format!("{} {id}", T::KIND.label())))?;

    let ids = [id.to_string()];
    ensure_unused(catalog, T::KIND, &ids, batch_size)?;
    catalog.delete_entities(T::KIND, &ids)?;
    tracing::info!(kind = T::KIND.label(), id, "deleted");

    Ok(record)
}

/// Maps names to record ids, creating the records that do not exist yet
///
/// Matching is case-insensitive against the owner's existing records; all
/// missing names are created in a single store call. The returned map is
/// keyed by the folded name.
pub fn ensure_named<T>(
    catalog: &Catalog,
    user_id: &str,
    names: &[String],
    make: impl Fn(String) -> T,
) -> Result<HashMap<String, String>, AppError>
where
    T: RelationEntity + Serialize + DeserializeOwned,
{
    let existing = catalog.entities::<T>(Some(user_id))?;
    let index = index_by_folded_name(&existing);

    let mut resolved: HashMap<String, String> = HashMap::new();
    let mut created: Vec<T> = Vec::new();
    for name in names {
        let folded = fold_name(name);
        if folded.is_empty() || resolved.contains_key(&folded) {
            continue;
        }
        match index.get(&folded) {
            Some(record) => {
                resolved.insert(folded, record.id().to_string());
            }
            None => {
                let record = make(name.trim().to_string());
                resolved.insert(folded, record.id().to_string());
                created.push(record);
            }
        }
    }

    if !created.is_empty() {
        catalog.insert_entities(&created)?;
        tracing::info!(kind = T::KIND.label(), count = created.len(), "created on the fly");
    }

    Ok(resolved)
}

pub fn new_category(user_id: &str, name: String) -> Category {
    Category {
        id: generate_id(),
        user_id: user_id.to_string(),
        color: Some(palette_color(&name)),
        name,
        created_at: Utc::now(),
    }
}

pub fn new_tag(user_id: &str, name: String) -> Tag {
    Tag {
        id: generate_id(),
        user_id: user_id.to_string(),
        color: Some(palette_color(&name)),
        is_needed: false,
        name,
        created_at: Utc::now(),
    }
}
