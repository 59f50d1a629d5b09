//! Site creation, update, and category/tag membership
//!
//! A site insert and the inserts of its join records are separate store
//! calls. Once the site is written, relation failures no longer abort the
//! operation; they come back as [`Warning`]s next to the created site so the
//! caller can offer a "retry relations" action (`POST /sites/{id}/relations`).

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::database::{generate_id, Catalog};
use crate::error::AppError;
use crate::import::pricing::normalize_pricing;
use crate::list_query::shape_full;
use crate::model::{
    normalize_site_url, Category, CreateSiteRequest, Link, Pricing, RelationKind, RelationsRequest,
    Site, SiteView, UpdateSiteRequest, Warning, WithWarnings,
};

/// Validated input of the site creation path, shared by the HTTP handler
/// and the importer
#[derive(Debug, Clone, Default)]
pub struct NewSite {
    pub user_id: String,
    pub name: String,
    /// Raw URL; normalized by [`create_site`]
    pub url: String,
    pub pricing: Option<Pricing>,
    pub description: Option<String>,
    pub use_case: Option<String>,
    pub is_favorite: bool,
    pub is_needed: bool,
    pub is_pinned: bool,
    pub import_source: Option<String>,
    pub categories: CategoryInput,
    pub tag_ids: Vec<String>,
}

/// Category input: ids when the caller has them, names on the legacy path
#[derive(Debug, Clone, Default)]
pub struct CategoryInput {
    pub category_ids: Option<Vec<String>>,
    pub category_names: Option<Vec<String>>,
}

impl TryFrom<CreateSiteRequest> for NewSite {
    type Error = AppError;

    fn try_from(req: CreateSiteRequest) -> Result<Self, Self::Error> {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());

        let missing: Vec<String> = [
            ("name", present(&req.name)),
            ("url", present(&req.url)),
            ("pricing", present(&req.pricing)),
            ("user_id", present(&req.user_id)),
        ]
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(field, _)| field.to_string())
        .collect();
        if !missing.is_empty() {
            return Err(AppError::Validation(missing));
        }

        let raw_pricing = req.pricing.unwrap_or_default();
        let pricing = normalize_pricing(&raw_pricing).ok_or_else(|| {
            AppError::validation(format!("pricing: unrecognized value '{raw_pricing}'"))
        })?;

        Ok(NewSite {
            user_id: req.user_id.unwrap_or_default().trim().to_string(),
            name: req.name.unwrap_or_default().trim().to_string(),
            url: req.url.unwrap_or_default(),
            pricing: Some(pricing),
            description: req.description,
            use_case: req.use_case,
            is_favorite: req.is_favorite.unwrap_or(false),
            is_needed: req.is_needed.unwrap_or(false),
            is_pinned: req.is_pinned.unwrap_or(false),
            import_source: req.import_source,
            categories: CategoryInput {
                category_ids: req.category_ids,
                category_names: req.category_names,
            },
            tag_ids: req.tag_ids.unwrap_or_default(),
        })
    }
}

/// Counts of join records changed by [`reconcile_membership`]
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct MembershipChange {
    pub categories_added: usize,
    pub categories_removed: usize,
    pub tags_added: usize,
    pub tags_removed: usize,
}

/// Removes duplicates and blanks, keeping first occurrences in order
fn distinct(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .map(str::to_string)
        .collect()
}

fn link_stage(kind: RelationKind) -> &'static str {
    match kind {
        RelationKind::Category => "site_categories",
        RelationKind::Tag => "site_tags",
    }
}

/// Inserts `site_id → target_ids` join records in fixed-size batches
///
/// Each batch is idempotent: pairs that already exist are left alone, so a
/// retry after a partial failure only fills the gaps.
fn insert_links_batched(
    catalog: &Catalog,
    kind: RelationKind,
    site_id: &str,
    target_ids: &[String],
    batch_size: usize,
) -> WithWarnings<usize> {
    let mut result = WithWarnings::new(0);
    let targets = distinct(target_ids);

    for chunk in targets.chunks(batch_size.max(1)) {
        let links: Vec<Link> = chunk.iter().map(|target| Link::new(site_id, target.as_str())).collect();
        match catalog.insert_links(kind, &links) {
            Ok(inserted) => result.value += inserted,
            Err(err) => {
                tracing::warn!(site_id, kind = kind.label(), error = %err, "relation attach failed");
                result.push(Warning::new(
                    link_stage(kind),
                    "failed",
                    json!({ "site_id": site_id, "ids": chunk, "error": err.to_string() }),
                ));
            }
        }
    }

    result
}

/// Links a site to categories
///
/// Ids are inserted directly. When only names are supplied they are resolved
/// with an exact, case-sensitive batch lookup; names without a match are
/// dropped and reported in a `category_names`/`dropped` warning.
pub fn attach_categories(
    catalog: &Catalog,
    user_id: &str,
    site_id: &str,
    input: &CategoryInput,
    batch_size: usize,
) -> WithWarnings<usize> {
    let ids = input.category_ids.as_deref().unwrap_or_default();
    if !ids.is_empty() {
        return insert_links_batched(catalog, RelationKind::Category, site_id, ids, batch_size);
    }

    let names = distinct(input.category_names.as_deref().unwrap_or_default());
    if names.is_empty() {
        return WithWarnings::new(0);
    }

    let mut result = WithWarnings::new(0);
    let mut resolved: Vec<Category> = Vec::new();
    for chunk in names.chunks(batch_size.max(1)) {
        match catalog.entities_by_names::<Category>(user_id, chunk) {
            Ok(found) => resolved.extend(found),
            Err(err) => result.push(Warning::new(
                "category_lookup",
                "failed",
                json!({ "site_id": site_id, "names": chunk, "error": err.to_string() }),
            )),
        }
    }

    let matched: HashSet<&str> = resolved.iter().map(|c| c.name.as_str()).collect();
    let unmatched: Vec<&String> = names.iter().filter(|n| !matched.contains(n.as_str())).collect();
    if !unmatched.is_empty() && result.warnings.is_empty() {
        tracing::warn!(site_id, ?unmatched, "dropping unknown category names");
        result.push(Warning::new(
            "category_names",
            "dropped",
            json!({ "site_id": site_id, "unmatched": unmatched }),
        ));
    }

    let ids: Vec<String> = resolved.into_iter().map(|c| c.id).collect();
    let inserted = insert_links_batched(catalog, RelationKind::Category, site_id, &ids, batch_size);
    result.value = result.absorb(inserted);
    result
}

/// Links a site to tags. Identifier-only.
pub fn attach_tags(
    catalog: &Catalog,
    site_id: &str,
    tag_ids: &[String],
    batch_size: usize,
) -> WithWarnings<usize> {
    insert_links_batched(catalog, RelationKind::Tag, site_id, tag_ids, batch_size)
}

/// Converges one relation kind of a site to `desired`: removes the rows not
/// desired, then inserts the missing ones. Never empties the set first.
fn reconcile_kind(
    catalog: &Catalog,
    kind: RelationKind,
    site_id: &str,
    desired: &[String],
    batch_size: usize,
) -> WithWarnings<(usize, usize)> {
    let mut result = WithWarnings::new((0, 0));

    let current: Vec<String> = match catalog.links_for_sites(kind, &[site_id.to_string()]) {
        Ok(links) => links.into_iter().map(|link| link.target_id).collect(),
        Err(err) => {
            result.push(Warning::new(
                link_stage(kind),
                "failed",
                json!({ "site_id": site_id, "step": "read_current", "error": err.to_string() }),
            ));
            return result;
        }
    };

    let desired = distinct(desired);
    let desired_set: HashSet<&str> = desired.iter().map(String::as_str).collect();
    let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();

    let remove: Vec<Link> = current
        .iter()
        .filter(|id| !desired_set.contains(id.as_str()))
        .map(|id| Link::new(site_id, id.as_str()))
        .collect();
    let add: Vec<String> = desired
        .iter()
        .filter(|id| !current_set.contains(id.as_str()))
        .cloned()
        .collect();

    for chunk in remove.chunks(batch_size.max(1)) {
        match catalog.delete_links(kind, chunk) {
            Ok(removed) => result.value.1 += removed,
            Err(err) => result.push(Warning::new(
                link_stage(kind),
                "failed",
                json!({
                    "site_id": site_id,
                    "step": "remove",
                    "ids": chunk.iter().map(|l| &l.target_id).collect::<Vec<_>>(),
                    "error": err.to_string(),
                }),
            )),
        }
    }

    let inserted = insert_links_batched(catalog, kind, site_id, &add, batch_size);
    result.value.0 = result.absorb(inserted);

    tracing::debug!(site_id, kind = kind.label(), added = result.value.0, removed = result.value.1, "reconciled");
    result
}

/// Makes the site's live membership equal the desired id sets
///
/// `None` leaves that relation kind untouched.
pub fn reconcile_membership(
    catalog: &Catalog,
    site_id: &str,
    desired_category_ids: Option<&[String]>,
    desired_tag_ids: Option<&[String]>,
    batch_size: usize,
) -> WithWarnings<MembershipChange> {
    let mut result = WithWarnings::new(MembershipChange::default());

    if let Some(desired) = desired_category_ids {
        let change = reconcile_kind(catalog, RelationKind::Category, site_id, desired, batch_size);
        let (added, removed) = result.absorb(change);
        result.value.categories_added = added;
        result.value.categories_removed = removed;
    }
    if let Some(desired) = desired_tag_ids {
        let change = reconcile_kind(catalog, RelationKind::Tag, site_id, desired, batch_size);
        let (added, removed) = result.absorb(change);
        result.value.tags_added = added;
        result.value.tags_removed = removed;
    }

    result
}

/// Loads the full view of a freshly written site
///
/// A failed read-back is a warning; the site itself is already stored.
fn read_back(catalog: &Catalog, site: Site, batch_size: usize) -> WithWarnings<SiteView> {
    let fallback = SiteView {
        site: site.clone(),
        categories: Vec::new(),
        tags: Vec::new(),
    };

    match shape_full(catalog, vec![site], batch_size) {
        Ok((views, failures)) => {
            let warnings = failures
                .into_iter()
                .map(|failure| Warning::new("read_back", "partial", json!(failure)))
                .collect();
            WithWarnings::with_warnings(views.into_iter().next().unwrap_or(fallback), warnings)
        }
        Err(err) => WithWarnings::with_warnings(
            fallback,
            vec![Warning::new("read_back", "failed", json!({ "error": err.to_string() }))],
        ),
    }
}

/// Creates a site and attaches its categories and tags
///
/// Validation and URL conflicts abort before anything is written. Relation
/// failures after the insert are returned as warnings.
pub fn create_site(
    catalog: &Catalog,
    new: NewSite,
    batch_size: usize,
) -> Result<WithWarnings<SiteView>, AppError> {
    let url = normalize_site_url(&new.url)
        .ok_or_else(|| AppError::validation(format!("url: '{}' is not an http(s) URL", new.url.trim())))?;

    let now = Utc::now();
    let site = Site {
        id: generate_id(),
        user_id: new.user_id,
        name: new.name,
        url,
        pricing: new.pricing,
        is_favorite: new.is_favorite,
        is_needed: new.is_needed,
        is_pinned: new.is_pinned,
        description: new.description.filter(|d| !d.trim().is_empty()),
        use_case: new.use_case.filter(|u| !u.trim().is_empty()),
        import_source: new.import_source,
        legacy_categories: Vec::new(),
        legacy_tags: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    catalog.insert_site(&site)?;
    tracing::info!(id = %site.id, url = %site.url, "created site");

    let mut result = WithWarnings::new(());
    let categories = attach_categories(catalog, &site.user_id, &site.id, &new.categories, batch_size);
    result.absorb(categories);
    let tags = attach_tags(catalog, &site.id, &new.tag_ids, batch_size);
    result.absorb(tags);

    let view = read_back(catalog, site, batch_size);
    let view = result.absorb(view);
    Ok(result.map(|_| view))
}

/// Updates site fields and converges its membership to the submitted ids
pub fn update_site(
    catalog: &Catalog,
    site_id: &str,
    req: UpdateSiteRequest,
    batch_size: usize,
) -> Result<WithWarnings<SiteView>, AppError> {
    let mut site = catalog
        .get_site(site_id)?
        .ok_or_else(|| AppError::NotFound(format!("site {site_id}")))?;

    let mut invalid = Vec::new();
    if let Some(name) = req.name {
        match name.trim() {
            "" => invalid.push("name".to_string()),
            trimmed => site.name = trimmed.to_string(),
        }
    }
    if let Some(raw) = req.url {
        match normalize_site_url(&raw) {
            Some(url) => site.url = url,
            None => invalid.push(format!("url: '{}' is not an http(s) URL", raw.trim())),
        }
    }
    if let Some(raw) = req.pricing {
        match normalize_pricing(&raw) {
            Some(pricing) => site.pricing = Some(pricing),
            None => invalid.push(format!("pricing: unrecognized value '{raw}'")),
        }
    }
    if !invalid.is_empty() {
        return Err(AppError::Validation(invalid));
    }

    if let Some(description) = req.description {
        site.description = Some(description).filter(|d| !d.trim().is_empty());
    }
    if let Some(use_case) = req.use_case {
        site.use_case = Some(use_case).filter(|u| !u.trim().is_empty());
    }
    site.is_favorite = req.is_favorite.unwrap_or(site.is_favorite);
    site.is_needed = req.is_needed.unwrap_or(site.is_needed);
    site.is_pinned = req.is_pinned.unwrap_or(site.is_pinned);
    site.updated_at = Utc::now();

    catalog.update_site(&site)?;
    tracing::info!(id = %site.id, "updated site");

    let mut result = WithWarnings::new(());
    let change = reconcile_membership(
        catalog,
        &site.id,
        req.category_ids.as_deref(),
        req.tag_ids.as_deref(),
        batch_size,
    );
    result.absorb(change);

    let view = read_back(catalog, site, batch_size);
    let view = result.absorb(view);
    Ok(result.map(|_| view))
}

/// Re-runs relation attach for an existing site
///
/// Safe to repeat: existing pairs are not duplicated.
pub fn retry_relations(
    catalog: &Catalog,
    site_id: &str,
    req: RelationsRequest,
    batch_size: usize,
) -> Result<WithWarnings<SiteView>, AppError> {
    let site = catalog
        .get_site(site_id)?
        .ok_or_else(|| AppError::NotFound(format!("site {site_id}")))?;

    let mut result = WithWarnings::new(());
    let input = CategoryInput {
        category_ids: req.category_ids,
        category_names: req.category_names,
    };
    let categories = attach_categories(catalog, &site.user_id, &site.id, &input, batch_size);
    result.absorb(categories);
    let tags = attach_tags(catalog, &site.id, &req.tag_ids.unwrap_or_default(), batch_size);
    result.absorb(tags);

    let view = read_back(catalog, site, batch_size);
    let view = result.absorb(view);
    Ok(result.map(|_| view))
}
