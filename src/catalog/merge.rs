//! Base + custom merge.

use super::{CatalogRecord, EntitySource};
use serde::Serialize;
use std::collections::HashSet;

/// Merge a base and a custom sequence.
///
/// Output is every base entity in order, then every custom entity whose id
/// is not already present, in order. A custom entity colliding with a base
/// id is dropped; within either list the first occurrence of an id wins.
pub fn merge<E>(base: &[E], custom: &[E]) -> Vec<E>
where
    E: CatalogRecord + Clone,
{
    merge_tagged(base, custom)
        .into_iter()
        .map(|sourced| sourced.item)
        .collect()
}

/// Merged entity with its origin and toggle flag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sourced<E> {
    pub source: EntitySource,
    pub enabled: bool,
    #[serde(flatten)]
    pub item: E,
}

/// Same ordering as [`merge`], with each entity tagged by source.
/// Every entity starts enabled.
pub fn merge_tagged<E>(base: &[E], custom: &[E]) -> Vec<Sourced<E>>
where
    E: CatalogRecord + Clone,
{
    let mut seen: HashSet<&str> = HashSet::with_capacity(base.len() + custom.len());
    let mut merged = Vec::with_capacity(base.len() + custom.len());

    let tagged = base
        .iter()
        .map(|item| (EntitySource::Base, item))
        .chain(custom.iter().map(|item| (EntitySource::Custom, item)));
    for (source, item) in tagged {
        if seen.insert(item.id()) {
            merged.push(Sourced {
                source,
                enabled: true,
                item: item.clone(),
            });
        }
    }
    merged
}
