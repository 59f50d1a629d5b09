//! Lookup tables built from join records and entity lists
//!
//! Pure functions with no I/O. They are rebuilt on every read so that entity
//! records never need to carry references to each other.

use std::collections::{HashMap, HashSet};

use crate::model::{Link, RelationEntity, RelationRef};

/// site id → target ids, in link order with duplicates removed
pub fn targets_by_site(links: &[Link]) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    for link in links {
        if seen.insert((link.site_id.as_str(), link.target_id.as_str())) {
            map.entry(link.site_id.clone())
                .or_default()
                .push(link.target_id.clone());
        }
    }
    map
}

pub fn index_by_id<T: RelationEntity>(records: &[T]) -> HashMap<&str, &T> {
    records.iter().map(|record| (record.id(), record)).collect()
}

/// Exact-name index. When two records share a name the first one wins.
pub fn index_by_name<T: RelationEntity>(records: &[T]) -> HashMap<&str, &T> {
    let mut map = HashMap::with_capacity(records.len());
    for record in records {
        map.entry(record.name()).or_insert(record);
    }
    map
}

/// Case-insensitive name index, first record wins
pub fn index_by_folded_name<T: RelationEntity>(records: &[T]) -> HashMap<String, &T> {
    let mut map = HashMap::with_capacity(records.len());
    for record in records {
        map.entry(fold_name(record.name())).or_insert(record);
    }
    map
}

pub fn fold_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Resolved lookups for one relation kind
pub struct RelationIndex<'a, T: RelationEntity> {
    by_id: HashMap<&'a str, &'a T>,
    by_name: HashMap<&'a str, &'a T>,
}

impl<'a, T: RelationEntity> RelationIndex<'a, T> {
    pub fn new(records: &'a [T]) -> Self {
        RelationIndex {
            by_id: index_by_id(records),
            by_name: index_by_name(records),
        }
    }

    /// Resolves a reference that is normally an id but may be a plain name
    /// left behind by migrated data. Unmatched names become a `{name}` stub.
    pub fn resolve(&self, reference: &str) -> RelationRef {
        self.by_id
            .get(reference)
            .or_else(|| self.by_name.get(reference))
            .map(|record| record.to_ref())
            .unwrap_or_else(|| RelationRef::stub(reference))
    }

    /// Resolves join-record targets followed by legacy names, dropping
    /// duplicates (same id, or same name for stubs).
    pub fn resolve_all<'r>(
        &self,
        target_ids: impl IntoIterator<Item = &'r String>,
        legacy_names: impl IntoIterator<Item = &'r String>,
    ) -> Vec<RelationRef> {
        let mut out: Vec<RelationRef> = Vec::new();
        for reference in target_ids.into_iter().chain(legacy_names) {
            let resolved = self.resolve(reference);
            let duplicate = out.iter().any(|existing| match (&existing.id, &resolved.id) {
                (Some(a), Some(b)) => a == b,
                (None, None) => existing.name == resolved.name,
                _ => false,
            });
            if !duplicate {
                out.push(resolved);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::new_tag;

    #[test]
    fn targets_keep_link_order_without_duplicates() {
        let links = vec![
            Link::new("s1", "t2"),
            Link::new("s1", "t1"),
            Link::new("s1", "t2"),
            Link::new("s2", "t1"),
        ];
        let map = targets_by_site(&links);
        assert_eq!(map["s1"], vec!["t2".to_string(), "t1".to_string()]);
        assert_eq!(map["s2"], vec!["t1".to_string()]);
    }

    #[test]
    fn resolve_all_merges_ids_and_legacy_names() {
        let tags = vec![new_tag("u1", "rust".into()), new_tag("u1", "web".into())];
        let index = RelationIndex::new(&tags);

        let ids = vec![tags[0].id.clone()];
        let legacy = vec!["rust".to_string(), "gone".to_string(), "gone".to_string()];
        let refs = index.resolve_all(&ids, &legacy);

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].id.as_deref(), Some(tags[0].id.as_str()));
        assert_eq!(refs[1].name, "gone");
        assert!(refs[1].id.is_none());
    }

    #[test]
    fn folded_index_ignores_case_and_padding() {
        let tags = vec![new_tag("u1", "Design".into())];
        let index = index_by_folded_name(&tags);
        assert!(index.contains_key(&fold_name("  design ")));
    }
}
