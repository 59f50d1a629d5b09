//! Data models for the site catalog
//!
//! This module defines the stored records (sites, categories, tags and the
//! join records between them), the request payloads accepted by the HTTP
//! layer, and the denormalized views returned to callers.
//!
//! Entities never hold references to each other. Membership lives only in
//! the join collections and is turned into lookup maps on every read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed pricing vocabulary for a site
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Pricing {
    FullyFree,
    Freemium,
    FreeTrial,
    Paid,
}

impl Pricing {
    pub fn as_str(self) -> &'static str {
        match self {
            Pricing::FullyFree => "fully_free",
            Pricing::Freemium => "freemium",
            Pricing::FreeTrial => "free_trial",
            Pricing::Paid => "paid",
        }
    }

    /// Position used when sorting by pricing, cheapest first.
    pub fn rank(self) -> u8 {
        match self {
            Pricing::FullyFree => 0,
            Pricing::Freemium => 1,
            Pricing::FreeTrial => 2,
            Pricing::Paid => 3,
        }
    }
}

/// A site record as stored in the database
///
/// Joined data (categories, tags) is never part of the stored record; it is
/// attached by the read path. Restore payloads deserialize into this type, so
/// any computed fields a client echoes back are dropped on the way in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Site {
    pub id: String,

    /// Owner of the site. URLs are unique per owner.
    pub user_id: String,

    pub name: String,

    pub url: String,

    /// `None` for imported rows whose pricing could not be recognized
    #[serde(default)]
    pub pricing: Option<Pricing>,

    #[serde(default)]
    pub is_favorite: bool,

    #[serde(default)]
    pub is_needed: bool,

    /// Pinned sites are listed before everything else regardless of sort
    #[serde(default)]
    pub is_pinned: bool,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub use_case: Option<String>,

    /// Origin of an imported site (`json`, `csv`, `html`, `bookmarks`)
    #[serde(default)]
    pub import_source: Option<String>,

    /// Category names carried by migrated records that predate join records
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub legacy_categories: Vec<String>,

    /// Tag names carried by migrated records that predate join records
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub legacy_tags: Vec<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Category {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_needed: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Shared access to categories and tags
///
/// `KIND` ties each record type to its store tables, so generic store calls
/// cannot mix up the two collections.
pub trait RelationEntity {
    const KIND: RelationKind;

    fn id(&self) -> &str;
    fn user_id(&self) -> &str;
    fn name(&self) -> &str;
    fn color(&self) -> Option<&str>;

    fn to_ref(&self) -> RelationRef {
        RelationRef {
            id: Some(self.id().to_string()),
            name: self.name().to_string(),
            color: self.color().map(str::to_string),
        }
    }
}

impl RelationEntity for Category {
    const KIND: RelationKind = RelationKind::Category;

    fn id(&self) -> &str {
        &self.id
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }
}

impl RelationEntity for Tag {
    const KIND: RelationKind = RelationKind::Tag;

    fn id(&self) -> &str {
        &self.id
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }
}

/// Which join collection a relation operation targets
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Category,
    Tag,
}

impl RelationKind {
    pub fn label(self) -> &'static str {
        match self {
            RelationKind::Category => "category",
            RelationKind::Tag => "tag",
        }
    }
}

/// A join record independent of its kind, as the store reads and writes it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link {
    pub site_id: String,
    pub target_id: String,
}

impl Link {
    pub fn new(site_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Link {
            site_id: site_id.into(),
            target_id: target_id.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteCategory {
    pub site_id: String,
    pub category_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteTag {
    pub site_id: String,
    pub tag_id: String,
}

impl From<Link> for SiteCategory {
    fn from(link: Link) -> Self {
        SiteCategory {
            site_id: link.site_id,
            category_id: link.target_id,
        }
    }
}

impl From<&SiteCategory> for Link {
    fn from(row: &SiteCategory) -> Self {
        Link::new(&row.site_id, &row.category_id)
    }
}

impl From<Link> for SiteTag {
    fn from(link: Link) -> Self {
        SiteTag {
            site_id: link.site_id,
            tag_id: link.target_id,
        }
    }
}

impl From<&SiteTag> for Link {
    fn from(row: &SiteTag) -> Self {
        Link::new(&row.site_id, &row.tag_id)
    }
}

/// A denormalized category or tag attached to a site in responses
///
/// A bare `{name}` stub (no id, no color) is emitted for legacy name
/// references that match no stored record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RelationRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl RelationRef {
    pub fn stub(name: impl Into<String>) -> Self {
        RelationRef {
            id: None,
            name: name.into(),
            color: None,
        }
    }
}

/// A site with its categories and tags resolved (the "full" read shape)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SiteView {
    #[serde(flatten)]
    pub site: Site,
    pub categories: Vec<RelationRef>,
    pub tags: Vec<RelationRef>,
}

/// A site with only the ids of its categories and tags (the "ids" read shape)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SiteIdsView {
    #[serde(flatten)]
    pub site: Site,
    pub category_ids: Vec<String>,
    pub tag_ids: Vec<String>,
}

/// Minimal site description attached to usage-check rejections
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SiteSummary {
    pub id: String,
    pub name: String,
    pub url: String,
}

impl From<&Site> for SiteSummary {
    fn from(site: &Site) -> Self {
        SiteSummary {
            id: site.id.clone(),
            name: site.name.clone(),
            url: site.url.clone(),
        }
    }
}

/// A non-fatal problem reported next to a successful result
///
/// Produced when a secondary step (relation attach, relation lookup, replay of
/// a conflicting record) fails after the primary entity was written.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Warning {
    pub stage: String,
    pub status: String,
    pub details: Value,
}

impl Warning {
    pub fn new(stage: impl Into<String>, status: impl Into<String>, details: Value) -> Self {
        Warning {
            stage: stage.into(),
            status: status.into(),
            details,
        }
    }
}

/// A value together with the warnings collected while producing it
#[derive(Debug, Clone, PartialEq)]
pub struct WithWarnings<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> WithWarnings<T> {
    pub fn new(value: T) -> Self {
        WithWarnings {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(value: T, warnings: Vec<Warning>) -> Self {
        WithWarnings { value, warnings }
    }

    pub fn push(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// Moves the warnings of `other` into `self` and hands back its value.
    pub fn absorb<U>(&mut self, other: WithWarnings<U>) -> U {
        self.warnings.extend(other.warnings);
        other.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WithWarnings<U> {
        WithWarnings {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

/// Uniform response envelope for every endpoint except the list read
#[derive(Serialize, Debug)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            warnings: Vec::new(),
        }
    }
}

impl<T: Serialize> From<WithWarnings<T>> for ApiResponse<T> {
    fn from(result: WithWarnings<T>) -> Self {
        ApiResponse {
            success: true,
            data: Some(result.value),
            warnings: result.warnings,
        }
    }
}

/// Request payload for creating a site
///
/// Every field is optional at the serde level so that missing required
/// fields are reported together as a validation error instead of a bare
/// deserialization failure.
///
/// # Example
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
#[derive(Deserialize, Debug, Default, Clone)]
pub struct CreateSiteRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub pricing: Option<String>,
    pub user_id: Option<String>,
    pub category_ids: Option<Vec<String>>,
    /// Legacy name-only category input, used when no ids are supplied
    pub category_names: Option<Vec<String>>,
    pub tag_ids: Option<Vec<String>>,
    pub description: Option<String>,
    pub use_case: Option<String>,
    pub is_favorite: Option<bool>,
    pub is_needed: Option<bool>,
    pub is_pinned: Option<bool>,
    pub import_source: Option<String>,
}

/// Request payload for updating a site
///
/// Absent fields are left untouched. When `category_ids` or `tag_ids` is
/// present, membership of that kind converges to exactly the submitted set.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct UpdateSiteRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub pricing: Option<String>,
    pub description: Option<String>,
    pub use_case: Option<String>,
    pub is_favorite: Option<bool>,
    pub is_needed: Option<bool>,
    pub is_pinned: Option<bool>,
    pub category_ids: Option<Vec<String>>,
    pub tag_ids: Option<Vec<String>>,
}

/// Request payload for re-running relation attach on an existing site
#[derive(Deserialize, Debug, Default, Clone)]
pub struct RelationsRequest {
    pub category_ids: Option<Vec<String>>,
    pub category_names: Option<Vec<String>>,
    pub tag_ids: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct CreateCategoryRequest {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct CreateTagRequest {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub color: Option<String>,
    pub is_needed: Option<bool>,
}

/// Query parameters of `GET /sites`
///
/// Kept as raw strings: invalid values fall back to defaults instead of
/// rejecting the request.
///
/// # Example
/// Query string: `?user_id=u1&category_id=uncategorized&sort_by=name&limit=50`
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ListParams {
    pub user_id: Option<String>,
    pub q: Option<String>,
    pub category_id: Option<String>,
    pub tag_id: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub favorites: Option<String>,
    pub import_source: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub fields: Option<String>,
}

/// Query parameters of the import endpoints
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ImportParams {
    pub user_id: Option<String>,
    pub filename: Option<String>,
}

/// Query parameters of `GET /export`
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ExportParams {
    pub user_id: Option<String>,
    pub format: Option<String>,
}

/// Turns user input into a canonical site URL
///
/// `http`/`https` URLs are kept as given. A bare host such as `github.com`
/// gets an `https://` scheme. Anything else (other schemes, text with
/// whitespace, hosts without a dot) yields `None`.
pub fn normalize_site_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    let (url, rest, explicit_scheme) = if let Some(rest) = lower.strip_prefix("https://") {
        (trimmed.to_string(), rest, true)
    } else if let Some(rest) = lower.strip_prefix("http://") {
        (trimmed.to_string(), rest, true)
    } else if lower.contains("://") || has_foreign_scheme(&lower) {
        return None;
    } else if let Some(rest) = lower.strip_prefix("//") {
        (format!("https:{trimmed}"), rest, false)
    } else {
        (format!("https://{trimmed}"), lower.as_str(), false)
    };

    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .rsplit('@')
        .next()
        .unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();

    let valid_host = !host.is_empty()
        && (host.contains('.') || (explicit_scheme && host == "localhost"))
        && !host.starts_with('.')
        && !host.ends_with('.')
        && host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');

    valid_host.then_some(url)
}

/// Schemes such as `javascript:`, `mailto:` or `place:` that carry no `//`
fn has_foreign_scheme(lower: &str) -> bool {
    match lower.split_once(':') {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphabetic() || c == '+' || c == '-' || c == '.')
                && !rest.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Key used for URL uniqueness and import deduplication
///
/// Case-insensitive, trailing slashes removed.
pub fn url_key(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}
