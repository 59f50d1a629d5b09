//! Filtered, sorted, paginated site reads
//!
//! [`ListQuery::from_params`] turns raw query-string values into a validated
//! query; [`ListQuery::execute`] runs it. Secondary lookups keyed by site ids
//! go through [`fetch_relations_batched`], which chunks the id list and keeps
//! going when a chunk fails.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::database::Catalog;
use crate::error::AppError;
use crate::model::{
    Category, Link, ListParams, RelationKind, Site, SiteIdsView, SiteView, Tag,
};
use crate::relation_maps::{targets_by_site, RelationIndex};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 5000;
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Category or tag membership filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipFilter {
    Any,
    /// Inner-join semantics: the site has this category/tag
    Has(String),
    /// Left-join + null-check semantics: the site has none at all
    Missing,
}

impl MembershipFilter {
    fn parse(raw: Option<&str>, sentinel: &str) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => MembershipFilter::Any,
            Some(value) if value == sentinel => MembershipFilter::Missing,
            Some(value) => MembershipFilter::Has(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Name,
    Url,
    Pricing,
}

impl SortField {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("updated_at") => SortField::UpdatedAt,
            Some("name") => SortField::Name,
            Some("url") => SortField::Url,
            Some("pricing") => SortField::Pricing,
            _ => SortField::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }
}

/// How much relational detail a read resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldsMode {
    /// Raw site records, no relation lookups
    Minimal,
    /// Sites plus bare `category_ids`/`tag_ids`
    Ids,
    /// Sites with resolved `{id, name, color}` categories and tags
    Full,
}

impl FieldsMode {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("minimal") => FieldsMode::Minimal,
            Some("ids") => FieldsMode::Ids,
            _ => FieldsMode::Full,
        }
    }
}

/// Page size from a raw query value
///
/// Absent, non-numeric, zero or negative values give [`DEFAULT_LIMIT`];
/// anything above [`MAX_LIMIT`] is capped.
pub fn clamp_limit(raw: Option<&str>) -> usize {
    match raw.and_then(|value| value.trim().parse::<i64>().ok()) {
        Some(limit) if limit > 0 => (limit as u64).min(MAX_LIMIT as u64) as usize,
        Some(_) => DEFAULT_LIMIT,
        None if raw.is_some_and(|value| is_huge_number(value.trim())) => MAX_LIMIT,
        None => DEFAULT_LIMIT,
    }
}

/// Digit strings too long for `i64`
fn is_huge_number(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

fn parse_page(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|page| *page > 0)
        .map_or(1, |page| page as usize)
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "yes" | "on")
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub user_id: Option<String>,
    pub search: Option<String>,
    pub category: MembershipFilter,
    pub tag: MembershipFilter,
    pub favorites_only: bool,
    pub import_source: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub page: usize,
    pub limit: usize,
    pub fields: FieldsMode,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery::from_params(&ListParams::default())
    }
}

/// A chunk of a batched secondary fetch that failed
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub kind: RelationKind,
    pub batch_index: usize,
    pub batch_len: usize,
    pub error: String,
}

/// Diagnostics attached to a list response when something degraded
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct QueryDebug {
    pub failed_batches: Vec<BatchFailure>,
}

/// Page of sites in the shape selected by [`FieldsMode`]
#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum ShapedSites {
    Minimal(Vec<Site>),
    Ids(Vec<SiteIdsView>),
    Full(Vec<SiteView>),
}

impl ShapedSites {
    pub fn len(&self) -> usize {
        match self {
            ShapedSites::Minimal(sites) => sites.len(),
            ShapedSites::Ids(sites) => sites.len(),
            ShapedSites::Full(sites) => sites.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct ListResult {
    pub data: ShapedSites,
    /// Size of the filtered set before pagination
    pub total_count: usize,
    pub debug: Option<QueryDebug>,
}

/// `GET /sites` response body
#[derive(Serialize, Debug)]
pub struct ListResponse {
    pub success: bool,
    pub data: ShapedSites,
    #[serde(rename = "totalCount")]
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<QueryDebug>,
}

impl From<ListResult> for ListResponse {
    fn from(result: ListResult) -> Self {
        ListResponse {
            success: true,
            data: result.data,
            total_count: result.total_count,
            debug: result.debug,
        }
    }
}

impl ListQuery {
    pub fn from_params(params: &ListParams) -> Self {
        let text = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        ListQuery {
            user_id: text(&params.user_id),
            search: text(&params.q).map(|q| q.to_lowercase()),
            category: MembershipFilter::parse(params.category_id.as_deref(), "uncategorized"),
            tag: MembershipFilter::parse(params.tag_id.as_deref(), "untagged"),
            favorites_only: parse_flag(params.favorites.as_deref()),
            import_source: text(&params.import_source),
            sort_by: SortField::parse(params.sort_by.as_deref()),
            sort_order: SortOrder::parse(params.sort_order.as_deref()),
            page: parse_page(params.page.as_deref()),
            limit: clamp_limit(params.limit.as_deref()),
            fields: FieldsMode::parse(params.fields.as_deref()),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Filters, sorts and counts the owner's sites, returning the full
    /// filtered list in display order.
    fn select(&self, catalog: &Catalog) -> Result<Vec<Site>, AppError> {
        let mut sites = catalog.list_sites(self.user_id.as_deref())?;

        for (kind, filter) in [
            (RelationKind::Category, &self.category),
            (RelationKind::Tag, &self.tag),
        ] {
            match filter {
                MembershipFilter::Any => {}
                MembershipFilter::Has(target) => {
                    let members: HashSet<String> = catalog
                        .links_for_targets(kind, std::slice::from_ref(target))?
                        .into_iter()
                        .map(|link| link.site_id)
                        .collect();
                    sites.retain(|site| members.contains(&site.id));
                }
                MembershipFilter::Missing => {
                    let linked = catalog.linked_site_ids(kind)?;
                    sites.retain(|site| !linked.contains(&site.id));
                }
            }
        }

        if let Some(needle) = &self.search {
            sites.retain(|site| {
                site.name.to_lowercase().contains(needle) || site.url.to_lowercase().contains(needle)
            });
        }
        if self.favorites_only {
            sites.retain(|site| site.is_favorite);
        }
        if let Some(source) = &self.import_source {
            sites.retain(|site| site.import_source.as_deref() == Some(source.as_str()));
        }

        sites.sort_by(|a, b| self.compare(a, b));
        Ok(sites)
    }

    /// Pinned first, then the chosen field and direction, then id
    fn compare(&self, a: &Site, b: &Site) -> Ordering {
        let by_field = match self.sort_by {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::Url => a.url.to_lowercase().cmp(&b.url.to_lowercase()),
            SortField::Pricing => pricing_rank(a).cmp(&pricing_rank(b)),
        };
        let by_field = match self.sort_order {
            SortOrder::Asc => by_field,
            SortOrder::Desc => by_field.reverse(),
        };

        b.is_pinned
            .cmp(&a.is_pinned)
            .then(by_field)
            .then_with(|| a.id.cmp(&b.id))
    }

    pub fn execute(&self, catalog: &Catalog, batch_size: usize) -> Result<ListResult, AppError> {
        let filtered = self.select(catalog)?;
        let total_count = filtered.len();
        let page: Vec<Site> = filtered
            .into_iter()
            .skip(self.offset())
            .take(self.limit)
            .collect();

        let (data, failures) = match self.fields {
            FieldsMode::Minimal => (ShapedSites::Minimal(shape_minimal(page)), Vec::new()),
            FieldsMode::Ids => {
                let (sites, failures) = shape_ids(catalog, page, batch_size);
                (ShapedSites::Ids(sites), failures)
            }
            FieldsMode::Full => {
                let (sites, failures) = shape_full(catalog, page, batch_size)?;
                (ShapedSites::Full(sites), failures)
            }
        };

        tracing::debug!(
            total_count,
            returned = data.len(),
            failed_batches = failures.len(),
            "listed sites"
        );

        Ok(ListResult {
            data,
            total_count,
            debug: (!failures.is_empty()).then_some(QueryDebug {
                failed_batches: failures,
            }),
        })
    }
}

/// Unknown pricing sorts after every known value
fn pricing_rank(site: &Site) -> u8 {
    site.pricing.map_or(u8::MAX, |p| p.rank())
}

/// Result of a chunked secondary fetch
#[derive(Debug, Clone, Default)]
pub struct BatchedRelations {
    pub links: Vec<Link>,
    pub failures: Vec<BatchFailure>,
}

/// Fetches the join records of `site_ids` in chunks of `batch_size`
///
/// Chunks run one after another. A failing chunk is recorded and skipped;
/// its sites simply come back without links.
pub fn fetch_relations_batched(
    catalog: &Catalog,
    kind: RelationKind,
    site_ids: &[String],
    batch_size: usize,
) -> BatchedRelations {
    let mut result = BatchedRelations::default();

    for (batch_index, chunk) in site_ids.chunks(batch_size.max(1)).enumerate() {
        match catalog.links_for_sites(kind, chunk) {
            Ok(links) => result.links.extend(links),
            Err(err) => {
                tracing::warn!(
                    kind = kind.label(),
                    batch_index,
                    batch_len = chunk.len(),
                    error = %err,
                    "relation batch failed"
                );
                result.failures.push(BatchFailure {
                    kind,
                    batch_index,
                    batch_len: chunk.len(),
                    error: err.to_string(),
                });
            }
        }
    }

    result
}

/// "minimal" mode: stored fields only, legacy arrays trimmed of blanks
pub fn shape_minimal(sites: Vec<Site>) -> Vec<Site> {
    sites
        .into_iter()
        .map(|mut site| {
            site.legacy_categories.retain(|name| !name.trim().is_empty());
            site.legacy_tags.retain(|name| !name.trim().is_empty());
            site
        })
        .collect()
}

fn relation_maps(
    catalog: &Catalog,
    site_ids: &[String],
    batch_size: usize,
) -> (HashMap<String, Vec<String>>, HashMap<String, Vec<String>>, Vec<BatchFailure>) {
    let categories = fetch_relations_batched(catalog, RelationKind::Category, site_ids, batch_size);
    let tags = fetch_relations_batched(catalog, RelationKind::Tag, site_ids, batch_size);

    let mut failures = categories.failures;
    failures.extend(tags.failures);
    (
        targets_by_site(&categories.links),
        targets_by_site(&tags.links),
        failures,
    )
}

/// "ids" mode: sites plus their raw category and tag ids, no name resolution
pub fn shape_ids(
    catalog: &Catalog,
    sites: Vec<Site>,
    batch_size: usize,
) -> (Vec<SiteIdsView>, Vec<BatchFailure>) {
    let ids: Vec<String> = sites.iter().map(|site| site.id.clone()).collect();
    let (mut categories, mut tags, failures) = relation_maps(catalog, &ids, batch_size);

    let views = sites
        .into_iter()
        .map(|site| SiteIdsView {
            category_ids: categories.remove(&site.id).unwrap_or_default(),
            tag_ids: tags.remove(&site.id).unwrap_or_default(),
            site,
        })
        .collect();
    (views, failures)
}

/// "full" mode: sites with resolved category and tag objects
///
/// Join targets and legacy names both go through the id/name maps; a legacy
/// name with no matching record becomes a `{name}` stub.
pub fn shape_full(
    catalog: &Catalog,
    sites: Vec<Site>,
    batch_size: usize,
) -> Result<(Vec<SiteView>, Vec<BatchFailure>), AppError> {
    let ids: Vec<String> = sites.iter().map(|site| site.id.clone()).collect();
    let (categories_by_site, tags_by_site, failures) = relation_maps(catalog, &ids, batch_size);

    let owners: HashSet<String> = sites.iter().map(|site| site.user_id.clone()).collect();
    let mut records: HashMap<String, (Vec<Category>, Vec<Tag>)> = HashMap::with_capacity(owners.len());
    for owner in owners {
        let entities = (
            catalog.entities::<Category>(Some(&owner))?,
            catalog.entities::<Tag>(Some(&owner))?,
        );
        records.insert(owner, entities);
    }
    // Legacy names only ever resolve against the site owner's own records
    let indexes: HashMap<&str, (RelationIndex<Category>, RelationIndex<Tag>)> = records
        .iter()
        .map(|(owner, (categories, tags))| {
            (owner.as_str(), (RelationIndex::new(categories), RelationIndex::new(tags)))
        })
        .collect();

    let empty = Vec::new();
    let views = sites
        .into_iter()
        .map(|site| {
            let (categories, tags) = match indexes.get(site.user_id.as_str()) {
                Some((category_index, tag_index)) => (
                    category_index.resolve_all(
                        categories_by_site.get(&site.id).unwrap_or(&empty),
                        &site.legacy_categories,
                    ),
                    tag_index.resolve_all(tags_by_site.get(&site.id).unwrap_or(&empty), &site.legacy_tags),
                ),
                None => (Vec::new(), Vec::new()),
            };
            SiteView {
                site,
                categories,
                tags,
            }
        })
        .collect();

    Ok((views, failures))
}
