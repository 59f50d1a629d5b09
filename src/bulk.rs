//! Bulk delete with a time-boxed, single-shot undo
//!
//! A bulk delete first captures a [`RestorePayload`] (the stripped records
//! plus every join record that references them), then issues one batched
//! store delete. The payload is returned to the caller and also parked in a
//! per-view undo slot for the configured window. Replaying it re-inserts the
//! entities and then their join records.
//!
//! Replay is best-effort, not transactional: an upstream failure part-way
//! leaves the delete in effect and is reported as an error.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::database::Catalog;
use crate::error::AppError;
use crate::model::{
    Category, Link, RelationKind, Site, SiteCategory, SiteTag, Tag, Warning, WithWarnings,
};
use crate::taxonomy::ensure_unused;

/// What a bulk delete targets
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[serde(alias = "site")]
    Sites,
    #[serde(alias = "category")]
    Categories,
    #[serde(alias = "tag")]
    Tags,
}

impl EntityKind {
    fn relation(self) -> Option<RelationKind> {
        match self {
            EntityKind::Sites => None,
            EntityKind::Categories => Some(RelationKind::Category),
            EntityKind::Tags => Some(RelationKind::Tag),
        }
    }
}

/// Request payload of `POST /bulk-delete`
#[derive(Deserialize, Debug, Clone)]
pub struct BulkDeleteRequest {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub ids: Vec<String>,
    /// View (tab/session) the undo window belongs to
    #[serde(default)]
    pub view_id: Option<String>,
    /// Delete categories/tags even when sites still use them, removing the
    /// links too. Ignored for sites.
    #[serde(default)]
    pub force: bool,
}

/// Request payload of `POST /bulk-delete/undo`
#[derive(Deserialize, Debug, Clone)]
pub struct UndoRequest {
    #[serde(default)]
    pub view_id: Option<String>,
}

/// Snapshot that reverses a bulk delete
///
/// Also the body accepted by `POST /restore`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RestorePayload {
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub site_categories: Vec<SiteCategory>,
    #[serde(default)]
    pub site_tags: Vec<SiteTag>,
}

impl RestorePayload {
    pub fn entity_count(&self) -> usize {
        self.sites.len() + self.categories.len() + self.tags.len()
    }
}

/// Response data of a bulk delete
#[derive(Serialize, Debug, Clone)]
pub struct BulkDeleteOutcome {
    pub kind: EntityKind,
    pub deleted: usize,
    pub restore_payload: RestorePayload,
    pub undo_expires_at: DateTime<Utc>,
    /// Clients clear their selection and reload from the server
    pub reload: bool,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct RestoreSummary {
    pub sites: usize,
    pub categories: usize,
    pub tags: usize,
    pub site_categories: usize,
    pub site_tags: usize,
}

#[derive(Debug, Clone)]
struct PendingUndo {
    payload: RestorePayload,
    expires_at: DateTime<Utc>,
}

const DEFAULT_VIEW: &str = "default";

fn view_key(view_id: Option<&str>) -> String {
    view_id
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_VIEW)
        .to_string()
}

/// Holds at most one pending undo per view
pub struct BulkCoordinator {
    pending: DashMap<String, PendingUndo>,
    window: chrono::Duration,
}

impl BulkCoordinator {
    pub fn new(window: Duration) -> Self {
        BulkCoordinator {
            pending: DashMap::new(),
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::seconds(8)),
        }
    }

    /// Captures the restore payload, deletes in one batched call, then opens
    /// the undo window for the view, replacing any earlier one.
    pub fn bulk_delete(
        &self,
        catalog: &Catalog,
        req: BulkDeleteRequest,
        batch_size: usize,
    ) -> Result<BulkDeleteOutcome, AppError> {
        let ids = distinct(&req.ids);
        if ids.is_empty() {
            return Err(AppError::validation("ids"));
        }

        if let Some(kind) = req.kind.relation() {
            if !req.force {
                ensure_unused(catalog, kind, &ids, batch_size)?;
            }
        }

        let payload = capture_restore_payload(catalog, req.kind, &ids, batch_size)?;

        let deleted = match req.kind.relation() {
            None => catalog.delete_sites(&ids)?,
            Some(kind) => catalog.delete_entities(kind, &ids)?,
        };

        let now = Utc::now();
        self.evict_expired(now);

        let key = view_key(req.view_id.as_deref());
        let expires_at = now + self.window;
        let previous = self.pending.insert(
            key.clone(),
            PendingUndo {
                payload: payload.clone(),
                expires_at,
            },
        );
        if previous.is_some() {
            tracing::info!(view = %key, "earlier undo forfeited by a new bulk delete");
        }
        tracing::info!(view = %key, kind = ?req.kind, deleted, "bulk delete committed");

        Ok(BulkDeleteOutcome {
            kind: req.kind,
            deleted,
            restore_payload: payload,
            undo_expires_at: expires_at,
            reload: true,
        })
    }

    /// Replays the pending payload of the view if its window is still open
    ///
    /// Single-shot: the slot is consumed whether or not the replay succeeds.
    pub fn undo(
        &self,
        catalog: &Catalog,
        view_id: Option<&str>,
        batch_size: usize,
    ) -> Result<WithWarnings<RestoreSummary>, AppError> {
        let key = view_key(view_id);
        let (_, pending) = self
            .pending
            .remove(&key)
            .ok_or_else(|| AppError::UndoUnavailable(format!("no pending undo for view {key}")))?;

        let now = Utc::now();
        self.evict_expired(now);
        if now > pending.expires_at {
            return Err(AppError::UndoUnavailable(format!(
                "undo window for view {key} closed at {}",
                pending.expires_at
            )));
        }

        tracing::info!(view = %key, entities = pending.payload.entity_count(), "undoing bulk delete");
        replay(catalog, &pending.payload, batch_size)
    }

    /// Number of views whose undo window is still held
    pub fn pending_views(&self) -> usize {
        self.pending.len()
    }

    /// Drops slots whose window closed before `now`
    fn evict_expired(&self, now: DateTime<Utc>) {
        let before = self.pending.len();
        self.pending.retain(|_, pending| pending.expires_at >= now);
        let evicted = before.saturating_sub(self.pending.len());
        if evicted > 0 {
            tracing::debug!(evicted, "expired undo slots dropped");
        }
    }
}

fn distinct(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

fn links_batched(
    catalog: &Catalog,
    kind: RelationKind,
    ids: &[String],
    by_target: bool,
    batch_size: usize,
) -> Result<Vec<Link>, AppError> {
    let mut out = Vec::new();
    for chunk in ids.chunks(batch_size.max(1)) {
        let links = if by_target {
            catalog.links_for_targets(kind, chunk)?
        } else {
            catalog.links_for_sites(kind, chunk)?
        };
        out.extend(links);
    }
    Ok(out)
}

/// Builds the snapshot needed to reverse deleting `ids`
///
/// Sites carry their own category and tag links; categories and tags carry
/// every link that currently points at them. Must run before the delete.
pub fn capture_restore_payload(
    catalog: &Catalog,
    kind: EntityKind,
    ids: &[String],
    batch_size: usize,
) -> Result<RestorePayload, AppError> {
    let mut payload = RestorePayload::default();

    match kind {
        EntityKind::Sites => {
            for chunk in ids.chunks(batch_size.max(1)) {
                payload.sites.extend(catalog.sites_by_ids(chunk)?);
            }
            let found: Vec<String> = payload.sites.iter().map(|s| s.id.clone()).collect();
            payload.site_categories = links_batched(catalog, RelationKind::Category, &found, false, batch_size)?
                .into_iter()
                .map(SiteCategory::from)
                .collect();
            payload.site_tags = links_batched(catalog, RelationKind::Tag, &found, false, batch_size)?
                .into_iter()
                .map(SiteTag::from)
                .collect();
        }
        EntityKind::Categories => {
            for chunk in ids.chunks(batch_size.max(1)) {
                payload.categories.extend(catalog.entities_by_ids::<Category>(chunk)?);
            }
            let found: Vec<String> = payload.categories.iter().map(|c| c.id.clone()).collect();
            payload.site_categories = links_batched(catalog, RelationKind::Category, &found, true, batch_size)?
                .into_iter()
                .map(SiteCategory::from)
                .collect();
        }
        EntityKind::Tags => {
            for chunk in ids.chunks(batch_size.max(1)) {
                payload.tags.extend(catalog.entities_by_ids::<Tag>(chunk)?);
            }
            let found: Vec<String> = payload.tags.iter().map(|t| t.id.clone()).collect();
            payload.site_tags = links_batched(catalog, RelationKind::Tag, &found, true, batch_size)?
                .into_iter()
                .map(SiteTag::from)
                .collect();
        }
    }

    tracing::debug!(
        sites = payload.sites.len(),
        categories = payload.categories.len(),
        tags = payload.tags.len(),
        site_categories = payload.site_categories.len(),
        site_tags = payload.site_tags.len(),
        "captured restore payload"
    );
    Ok(payload)
}

/// Re-inserts a restore payload: entities first, then join records
///
/// A site whose URL was taken by another site in the meantime is skipped
/// together with its links and reported as a warning.
pub fn replay(
    catalog: &Catalog,
    payload: &RestorePayload,
    batch_size: usize,
) -> Result<WithWarnings<RestoreSummary>, AppError> {
    let mut result = WithWarnings::new(RestoreSummary::default());
    let mut skipped: HashSet<&str> = HashSet::new();

    for site in &payload.sites {
        match catalog.insert_site(site) {
            Ok(()) => result.value.sites += 1,
            Err(AppError::Conflict { existing, .. }) => {
                tracing::warn!(id = %site.id, url = %site.url, "restore skipped, URL reclaimed");
                skipped.insert(site.id.as_str());
                result.push(Warning::new(
                    "restore_sites",
                    "conflict",
                    json!({ "site_id": site.id, "url": site.url, "existing": existing }),
                ));
            }
            Err(err) => return Err(err),
        }
    }

    if !payload.categories.is_empty() {
        catalog.insert_entities(&payload.categories)?;
        result.value.categories = payload.categories.len();
    }
    if !payload.tags.is_empty() {
        catalog.insert_entities(&payload.tags)?;
        result.value.tags = payload.tags.len();
    }

    let category_links: Vec<Link> = payload
        .site_categories
        .iter()
        .map(Link::from)
        .filter(|link| !skipped.contains(link.site_id.as_str()))
        .collect();
    for chunk in category_links.chunks(batch_size.max(1)) {
        result.value.site_categories += catalog.insert_links(RelationKind::Category, chunk)?;
    }

    let tag_links: Vec<Link> = payload
        .site_tags
        .iter()
        .map(Link::from)
        .filter(|link| !skipped.contains(link.site_id.as_str()))
        .collect();
    for chunk in tag_links.chunks(batch_size.max(1)) {
        result.value.site_tags += catalog.insert_links(RelationKind::Tag, chunk)?;
    }

    tracing::info!(summary = ?result.value, warnings = result.warnings.len(), "restore replayed");
    Ok(result)
}
