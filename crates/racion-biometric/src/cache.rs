//! In-memory template cache with copy-on-write snapshots.

use racion_core::Identity;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Immutable view of the enrolled templates, sorted by identity.
pub type TemplateSnapshot = Arc<BTreeMap<Identity, Arc<[u8]>>>;

/// Shared template cache.
///
/// Readers take a [`TemplateSnapshot`] and scan it without holding any lock,
/// so an identification pass never observes a half-applied update. Writers
/// copy the map, modify the copy and publish it atomically.
///
/// # Examples
///
/// ```
/// use racion_biometric::TemplateCache;
/// use racion_core::Identity;
///
/// let cache = TemplateCache::new();
/// let before = cache.snapshot();
///
/// cache.insert(Identity::new("123").unwrap(), vec![1, 2, 3]);
///
/// assert!(before.is_empty());
/// assert_eq!(cache.snapshot().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct TemplateCache {
    current: RwLock<TemplateSnapshot>,
}

impl TemplateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache from templates loaded out of storage.
    pub fn from_templates(templates: BTreeMap<Identity, Vec<u8>>) -> Self {
        let cache = Self::new();
        cache.replace(templates);
        cache
    }

    /// Current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> TemplateSnapshot {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the whole cache, e.g. after a bulk reload.
    pub fn replace(&self, templates: BTreeMap<Identity, Vec<u8>>) {
        let map = templates
            .into_iter()
            .map(|(identity, template)| (identity, Arc::from(template)))
            .collect();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(map);
    }

    /// Add or overwrite one template.
    pub fn insert(&self, identity: Identity, template: impl Into<Arc<[u8]>>) {
        let template = template.into();
        self.update(|map| {
            map.insert(identity, template);
        });
    }

    /// Remove one template. Returns whether it was present.
    pub fn remove(&self, identity: &Identity) -> bool {
        let mut removed = false;
        self.update(|map| removed = map.remove(identity).is_some());
        removed
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.snapshot().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<Identity, Arc<[u8]>>)) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = BTreeMap::clone(&current);
        apply(&mut next);
        *current = Arc::new(next);
    }
}
