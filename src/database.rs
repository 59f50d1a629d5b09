//! Database initialization, table definitions and the store API
//!
//! This module handles the setup of the embedded redb database and exposes
//! [`Catalog`], the backing store the rest of the crate talks to.
//!
//! Every public `Catalog` method runs in its own transaction. Nothing spans
//! two calls, so a site insert followed by its relation inserts is not
//! atomic. Id-list lookups also refuse lists longer than
//! `max_ids_per_request`, the way a remote backend rejects oversized
//! requests; callers chunk their lookups accordingly.

use std::collections::HashSet;
use std::sync::Arc;

use rand::{distr::Alphanumeric, Rng};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use crate::bulk::BulkCoordinator;
use crate::config::Config;
use crate::error::AppError;
use crate::model::{url_key, Link, RelationEntity, RelationKind, Site};

/// Main table for site records
///
/// Key: site id
/// Value: JSON-serialized [`Site`]
pub const TABLE_SITES: TableDefinition<&str, &str> = TableDefinition::new("sites_v1");

/// Unique index enforcing one URL per owner
///
/// Key: `(user_id, url_key)` where `url_key` is the lowercased URL without
/// trailing slashes
/// Value: site id
pub const TABLE_SITE_URLS: TableDefinition<(&str, &str), &str> =
    TableDefinition::new("site_urls_v1");

/// Key: category id, Value: JSON-serialized `Category`
pub const TABLE_CATEGORIES: TableDefinition<&str, &str> = TableDefinition::new("categories_v1");

/// Key: tag id, Value: JSON-serialized `Tag`
pub const TABLE_TAGS: TableDefinition<&str, &str> = TableDefinition::new("tags_v1");

/// Join records keyed by the `(site_id, category_id)` pair
///
/// The pair is the whole key, so inserting an existing pair is a no-op.
/// This is what makes relation-attach retries safe.
pub const TABLE_SITE_CATEGORIES: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("site_categories_v1");

/// Reverse of [`TABLE_SITE_CATEGORIES`], keyed `(category_id, site_id)`
pub const TABLE_CATEGORY_SITES: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("category_sites_v1");

/// Join records keyed by the `(site_id, tag_id)` pair
pub const TABLE_SITE_TAGS: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("site_tags_v1");

/// Reverse of [`TABLE_SITE_TAGS`], keyed `(tag_id, site_id)`
pub const TABLE_TAG_SITES: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("tag_sites_v1");

type PairTable = TableDefinition<'static, (&'static str, &'static str), ()>;
type RecordTable = TableDefinition<'static, &'static str, &'static str>;

fn entity_table(kind: RelationKind) -> RecordTable {
    match kind {
        RelationKind::Category => TABLE_CATEGORIES,
        RelationKind::Tag => TABLE_TAGS,
    }
}

/// `(site_id, target_id)` table for the relation kind
fn forward_table(kind: RelationKind) -> PairTable {
    match kind {
        RelationKind::Category => TABLE_SITE_CATEGORIES,
        RelationKind::Tag => TABLE_SITE_TAGS,
    }
}

/// `(target_id, site_id)` table for the relation kind
fn reverse_table(kind: RelationKind) -> PairTable {
    match kind {
        RelationKind::Category => TABLE_CATEGORY_SITES,
        RelationKind::Tag => TABLE_TAG_SITES,
    }
}

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,

    /// Pending undo windows, one per view
    pub bulk: Arc<BulkCoordinator>,

    /// Chunk size for id-keyed secondary fetches
    pub batch_size: usize,
}

impl AppState {
    pub fn new(db: Database, config: &Config) -> Self {
        AppState {
            catalog: Catalog::new(db, config.max_ids_per_request),
            bulk: Arc::new(BulkCoordinator::new(config.undo_window)),
            batch_size: config.relation_batch_size,
        }
    }
}

/// Initializes the embedded database and creates required tables
///
/// # Example
///
/// ```no_run
/// # use site_catalog::database::init_db;
/// let db = init_db("catalog.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_SITES)?;
        write_txn.open_table(TABLE_SITE_URLS)?;
        write_txn.open_table(TABLE_CATEGORIES)?;
        write_txn.open_table(TABLE_TAGS)?;
        write_txn.open_table(TABLE_SITE_CATEGORIES)?;
        write_txn.open_table(TABLE_CATEGORY_SITES)?;
        write_txn.open_table(TABLE_SITE_TAGS)?;
        write_txn.open_table(TABLE_TAG_SITES)?;
    }
    write_txn.commit()?;

    Ok(db)
}

/// Generates a random 12-character record id
pub fn generate_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

/// Second components of all pair keys whose first component is `prefix`
fn scan_pairs<T>(table: &T, prefix: &str) -> Result<Vec<String>, redb::StorageError>
where
    T: ReadableTable<(&'static str, &'static str), ()>,
{
    let start: (&str, &str) = (prefix, "");
    let mut out = Vec::new();
    for entry in table.range(start..)? {
        let (key, _) = entry?;
        let (first, second) = key.value();
        if first != prefix {
            break;
        }
        out.push(second.to_string());
    }
    Ok(out)
}

/// Owner field shared by every stored record
#[derive(Deserialize)]
struct Owned {
    user_id: String,
}

fn decode<T: DeserializeOwned>(raw: &str, table: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::warn!(table, error = %err, "skipping undecodable record");
            None
        }
    }
}

/// The backing store
#[derive(Clone)]
pub struct Catalog {
    db: Arc<Database>,
    max_ids_per_request: usize,
}

impl Catalog {
    pub fn new(db: Database, max_ids_per_request: usize) -> Self {
        Catalog {
            db: Arc::new(db),
            max_ids_per_request: max_ids_per_request.max(1),
        }
    }

    pub fn max_ids_per_request(&self) -> usize {
        self.max_ids_per_request
    }

    fn check_request_size(&self, what: &str, len: usize) -> Result<(), AppError> {
        if len > self.max_ids_per_request {
            return Err(AppError::Upstream(format!(
                "request too large: {what} with {len} ids exceeds the limit of {}",
                self.max_ids_per_request
            )));
        }
        Ok(())
    }

    // --- Sites ---

    /// Inserts a site, enforcing URL uniqueness within the owner's collection
    ///
    /// Returns [`AppError::Conflict`] carrying the existing record when
    /// another site of the same owner already uses the URL.
    pub fn insert_site(&self, site: &Site) -> Result<(), AppError> {
        let key = url_key(&site.url);
        let record = serde_json::to_string(site)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut urls = write_txn.open_table(TABLE_SITE_URLS)?;
            let mut sites = write_txn.open_table(TABLE_SITES)?;

            let holder = urls
                .get((site.user_id.as_str(), key.as_str()))?
                .map(|guard| guard.value().to_string());
            if let Some(holder) = holder.filter(|holder| holder != &site.id) {
                let existing = sites
                    .get(holder.as_str())?
                    .and_then(|guard| decode::<Site>(guard.value(), "sites_v1"));
                return Err(conflict(&site.url, existing));
            }

            // Re-inserting an id (restore) must not leave its old URL indexed.
            let previous = sites
                .get(site.id.as_str())?
                .and_then(|guard| decode::<Site>(guard.value(), "sites_v1"));
            if let Some(previous) = previous {
                urls.remove((previous.user_id.as_str(), url_key(&previous.url).as_str()))?;
            }

            urls.insert((site.user_id.as_str(), key.as_str()), site.id.as_str())?;
            sites.insert(site.id.as_str(), record.as_str())?;
        }
        write_txn.commit()?;

        Ok(())
    }

    /// Replaces a stored site, moving its URL index entry when the URL changed
    pub fn update_site(&self, site: &Site) -> Result<(), AppError> {
        let record = serde_json::to_string(site)?;
        let new_key = url_key(&site.url);

        let write_txn = self.db.begin_write()?;
        {
            let mut urls = write_txn.open_table(TABLE_SITE_URLS)?;
            let mut sites = write_txn.open_table(TABLE_SITES)?;

            let previous = sites
                .get(site.id.as_str())?
                .and_then(|guard| decode::<Site>(guard.value(), "sites_v1"))
                .ok_or_else(|| AppError::NotFound(format!("site {}", site.id)))?;
            let old_key = url_key(&previous.url);

            if old_key != new_key || previous.user_id != site.user_id {
                let holder = urls
                    .get((site.user_id.as_str(), new_key.as_str()))?
                    .map(|guard| guard.value().to_string());
                if let Some(holder) = holder.filter(|holder| holder != &site.id) {
                    let existing = sites
                        .get(holder.as_str())?
                        .and_then(|guard| decode::<Site>(guard.value(), "sites_v1"));
                    return Err(conflict(&site.url, existing));
                }
                urls.remove((previous.user_id.as_str(), old_key.as_str()))?;
                urls.insert((site.user_id.as_str(), new_key.as_str()), site.id.as_str())?;
            }

            sites.insert(site.id.as_str(), record.as_str())?;
        }
        write_txn.commit()?;

        Ok(())
    }

    pub fn get_site(&self, id: &str) -> Result<Option<Site>, AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE_SITES)?;
        let site = table
            .get(id)?
            .and_then(|guard| decode::<Site>(guard.value(), "sites_v1"));
        Ok(site)
    }

    pub fn find_site_by_url(&self, user_id: &str, url: &str) -> Result<Option<Site>, AppError> {
        let key = url_key(url);
        let read_txn = self.db.begin_read()?;
        let urls = read_txn.open_table(TABLE_SITE_URLS)?;
        let Some(id) = urls
            .get((user_id, key.as_str()))?
            .map(|guard| guard.value().to_string())
        else {
            return Ok(None);
        };
        let sites = read_txn.open_table(TABLE_SITES)?;
        let site = sites
            .get(id.as_str())?
            .and_then(|guard| decode::<Site>(guard.value(), "sites_v1"));
        Ok(site)
    }

    /// Sites for the given ids, in input order; unknown ids are skipped
    pub fn sites_by_ids(&self, ids: &[String]) -> Result<Vec<Site>, AppError> {
        self.check_request_size("site lookup", ids.len())?;

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE_SITES)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(site) = table
                .get(id.as_str())?
                .and_then(|guard| decode::<Site>(guard.value(), "sites_v1"))
            {
                out.push(site);
            }
        }
        Ok(out)
    }

    /// All sites, optionally restricted to one owner
    ///
    /// WARNING: full table scan
    pub fn list_sites(&self, user_id: Option<&str>) -> Result<Vec<Site>, AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE_SITES)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            if let Some(site) = decode::<Site>(value.value(), "sites_v1") {
                if user_id.is_none_or(|owner| owner == site.user_id) {
                    out.push(site);
                }
            }
        }
        Ok(out)
    }

    /// Deletes sites and every join record referencing them in one transaction
    ///
    /// Returns the number of sites that existed and were removed.
    pub fn delete_sites(&self, ids: &[String]) -> Result<usize, AppError> {
        let write_txn = self.db.begin_write()?;
        let mut deleted = 0;
        {
            let mut sites = write_txn.open_table(TABLE_SITES)?;
            let mut urls = write_txn.open_table(TABLE_SITE_URLS)?;

            for id in ids {
                let removed = sites
                    .remove(id.as_str())?
                    .and_then(|guard| decode::<Site>(guard.value(), "sites_v1"));
                let Some(site) = removed else { continue };
                urls.remove((site.user_id.as_str(), url_key(&site.url).as_str()))?;
                deleted += 1;
            }

            for kind in [RelationKind::Category, RelationKind::Tag] {
                let mut forward = write_txn.open_table(forward_table(kind))?;
                let mut reverse = write_txn.open_table(reverse_table(kind))?;
                for id in ids {
                    for target in scan_pairs(&forward, id)? {
                        forward.remove((id.as_str(), target.as_str()))?;
                        reverse.remove((target.as_str(), id.as_str()))?;
                    }
                }
            }
        }
        write_txn.commit()?;

        tracing::debug!(requested = ids.len(), deleted, "deleted sites");
        Ok(deleted)
    }

    // --- Categories and tags ---

    /// Inserts or replaces category/tag records in one transaction
    pub fn insert_entities<T>(&self, records: &[T]) -> Result<(), AppError>
    where
        T: RelationEntity + Serialize,
    {
        let encoded = records
            .iter()
            .map(|record| Ok((record.id().to_string(), serde_json::to_string(record)?)))
            .collect::<Result<Vec<_>, AppError>>()?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(entity_table(T::KIND))?;
            for (id, json) in &encoded {
                table.insert(id.as_str(), json.as_str())?;
            }
        }
        write_txn.commit()?;

        Ok(())
    }

    /// All categories or tags, optionally for one owner, sorted by name
    pub fn entities<T>(&self, user_id: Option<&str>) -> Result<Vec<T>, AppError>
    where
        T: RelationEntity + DeserializeOwned,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(entity_table(T::KIND))?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            if let Some(record) = decode::<T>(value.value(), T::KIND.label()) {
                if user_id.is_none_or(|owner| owner == record.user_id()) {
                    out.push(record);
                }
            }
        }
        out.sort_by_key(|record| record.name().to_lowercase());
        Ok(out)
    }

    pub fn get_entity<T>(&self, id: &str) -> Result<Option<T>, AppError>
    where
        T: RelationEntity + DeserializeOwned,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(entity_table(T::KIND))?;
        let record = table
            .get(id)?
            .and_then(|guard| decode::<T>(guard.value(), T::KIND.label()));
        Ok(record)
    }

    /// Records for the given ids, in input order; unknown ids are skipped
    pub fn entities_by_ids<T>(&self, ids: &[String]) -> Result<Vec<T>, AppError>
    where
        T: RelationEntity + DeserializeOwned,
    {
        self.check_request_size(&format!("{} lookup", T::KIND.label()), ids.len())?;

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(entity_table(T::KIND))?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = table
                .get(id.as_str())?
                .and_then(|guard| decode::<T>(guard.value(), T::KIND.label()))
            {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Exact, case-sensitive batch lookup by name within one owner
    pub fn entities_by_names<T>(&self, user_id: &str, names: &[String]) -> Result<Vec<T>, AppError>
    where
        T: RelationEntity + DeserializeOwned,
    {
        self.check_request_size(&format!("{} name lookup", T::KIND.label()), names.len())?;

        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        let all = self.entities::<T>(Some(user_id))?;
        Ok(all
            .into_iter()
            .filter(|record| wanted.contains(record.name()))
            .collect())
    }

    /// Deletes categories or tags together with every join record that
    /// references them, in one transaction
    ///
    /// Callers run the usage check first unless a cascading delete was
    /// explicitly requested.
    pub fn delete_entities(&self, kind: RelationKind, ids: &[String]) -> Result<usize, AppError> {
        let write_txn = self.db.begin_write()?;
        let mut deleted = 0;
        {
            let mut table = write_txn.open_table(entity_table(kind))?;
            let mut forward = write_txn.open_table(forward_table(kind))?;
            let mut reverse = write_txn.open_table(reverse_table(kind))?;

            for id in ids {
                if table.remove(id.as_str())?.is_some() {
                    deleted += 1;
                }
                for site_id in scan_pairs(&reverse, id)? {
                    reverse.remove((id.as_str(), site_id.as_str()))?;
                    forward.remove((site_id.as_str(), id.as_str()))?;
                }
            }
        }
        write_txn.commit()?;

        tracing::debug!(kind = kind.label(), requested = ids.len(), deleted, "deleted entities");
        Ok(deleted)
    }

    // --- Join records ---

    /// Inserts join records in one transaction
    ///
    /// The whole batch is rejected when any link references a missing site or
    /// target, or a target owned by someone other than the site's owner. Pairs already present are left as they are. Returns the
    /// number of pairs that were new.
    pub fn insert_links(&self, kind: RelationKind, links: &[Link]) -> Result<usize, AppError> {
        self.check_request_size(&format!("{} link insert", kind.label()), links.len())?;
        if links.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        let mut inserted = 0;
        {
            let sites = write_txn.open_table(TABLE_SITES)?;
            let targets = write_txn.open_table(entity_table(kind))?;

            for link in links {
                let Some(site) = sites.get(link.site_id.as_str())? else {
                    return Err(AppError::Upstream(format!(
                        "foreign key violation: site {} does not exist",
                        link.site_id
                    )));
                };
                let Some(target) = targets.get(link.target_id.as_str())? else {
                    return Err(AppError::Upstream(format!(
                        "foreign key violation: {} {} does not exist",
                        kind.label(),
                        link.target_id
                    )));
                };

                let site_owner = decode::<Owned>(site.value(), "sites_v1").map(|o| o.user_id);
                let target_owner = decode::<Owned>(target.value(), kind.label()).map(|o| o.user_id);
                if site_owner.is_none() || site_owner != target_owner {
                    return Err(AppError::Validation(vec![format!(
                        "{} {} does not belong to the owner of site {}",
                        kind.label(),
                        link.target_id,
                        link.site_id
                    )]));
                }
            }

            let mut forward = write_txn.open_table(forward_table(kind))?;
            let mut reverse = write_txn.open_table(reverse_table(kind))?;
            for link in links {
                let site = link.site_id.as_str();
                let target = link.target_id.as_str();
                if forward.insert((site, target), ())?.is_none() {
                    inserted += 1;
                }
                reverse.insert((target, site), ())?;
            }
        }
        write_txn.commit()?;

        Ok(inserted)
    }

    /// Removes join records in one transaction, returning how many existed
    pub fn delete_links(&self, kind: RelationKind, links: &[Link]) -> Result<usize, AppError> {
        self.check_request_size(&format!("{} link delete", kind.label()), links.len())?;
        if links.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        let mut removed = 0;
        {
            let mut forward = write_txn.open_table(forward_table(kind))?;
            let mut reverse = write_txn.open_table(reverse_table(kind))?;
            for link in links {
                let site = link.site_id.as_str();
                let target = link.target_id.as_str();
                if forward.remove((site, target))?.is_some() {
                    removed += 1;
                }
                reverse.remove((target, site))?;
            }
        }
        write_txn.commit()?;

        Ok(removed)
    }

    /// Join records of the given sites
    pub fn links_for_sites(&self, kind: RelationKind, site_ids: &[String]) -> Result<Vec<Link>, AppError> {
        self.check_request_size(&format!("{} link lookup", kind.label()), site_ids.len())?;

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(forward_table(kind))?;
        let mut out = Vec::new();
        for site_id in site_ids {
            for target in scan_pairs(&table, site_id)? {
                out.push(Link::new(site_id.as_str(), target));
            }
        }
        Ok(out)
    }

    /// Join records pointing at the given categories or tags
    pub fn links_for_targets(
        &self,
        kind: RelationKind,
        target_ids: &[String],
    ) -> Result<Vec<Link>, AppError> {
        self.check_request_size(&format!("{} usage lookup", kind.label()), target_ids.len())?;

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(reverse_table(kind))?;
        let mut out = Vec::new();
        for target_id in target_ids {
            for site_id in scan_pairs(&table, target_id)? {
                out.push(Link::new(site_id, target_id.as_str()));
            }
        }
        Ok(out)
    }

    /// Ids of every site with at least one link of the given kind
    pub fn linked_site_ids(&self, kind: RelationKind) -> Result<HashSet<String>, AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(forward_table(kind))?;
        let mut out = HashSet::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            let (site_id, _) = key.value();
            out.insert(site_id.to_string());
        }
        Ok(out)
    }
}

fn conflict(url: &str, existing: Option<Site>) -> AppError {
    AppError::Conflict {
        message: format!("A site with URL {url} already exists"),
        existing: Box::new(existing.map_or(json!(null), |site| json!(site))),
    }
}
