//! Namespaced, bounded key-value cache shared by the resource fetchers.

use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Process-wide cache with one insertion-ordered LRU per namespace.
///
/// Lookups use `peek`, so reads never refresh an entry: the oldest insert is
/// evicted first once a namespace exceeds its capacity. Namespaces start
/// unbounded until [`BoundedCache::set_capacity`] is called.
#[derive(Default)]
pub struct BoundedCache {
    namespaces: DashMap<String, LruCache<String, String>>,
}

impl BoundedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<String> {
        let hit = self
            .namespaces
            .get(namespace)
            .and_then(|cache| cache.peek(key).cloned());
        tracing::debug!(namespace, key, hit = hit.is_some(), "Cache lookup");
        hit
    }

    pub fn set(&self, namespace: &str, key: &str, value: String) {
        self.namespaces
            .entry(namespace.to_string())
            .or_insert_with(LruCache::unbounded)
            .put(key.to_string(), value);
    }

    /// Bound a namespace, evicting its oldest entries beyond `capacity`.
    pub fn set_capacity(&self, namespace: &str, capacity: usize) {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        self.namespaces
            .entry(namespace.to_string())
            .or_insert_with(LruCache::unbounded)
            .resize(capacity);
    }

    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map_or(0, |cache| cache.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn evicts_oldest_insert_beyond_capacity() {
        let cache = BoundedCache::new();
        cache.set_capacity("pdf", 2);
        cache.set("pdf", "a", "1".into());
        cache.set("pdf", "b", "2".into());
        // reads do not refresh
        assert_eq!(cache.get("pdf", "a").as_deref(), Some("1"));
        cache.set("pdf", "c", "3".into());

        assert_eq!(cache.get("pdf", "a"), None);
        assert_eq!(cache.get("pdf", "b").as_deref(), Some("2"));
        assert_eq!(cache.get("pdf", "c").as_deref(), Some("3"));
        assert_eq!(cache.len("pdf"), 2);
    }

    #[test]
    fn shrinking_capacity_drops_oldest() {
        let cache = BoundedCache::new();
        for i in 0..5 {
            cache.set("web", &i.to_string(), i.to_string());
        }
        assert_eq!(cache.len("web"), 5);

        cache.set_capacity("web", 2);
        assert_eq!(cache.len("web"), 2);
        assert!(cache.get("web", "2").is_none());
        assert!(cache.get("web", "4").is_some());
    }

    #[test]
    fn namespaces_are_independent() {
        let cache = BoundedCache::new();
        cache.set_capacity("text", 1);
        cache.set("text", "k", "text".into());
        cache.set("youtube", "k", "video".into());

        assert_eq!(cache.get("text", "k").as_deref(), Some("text"));
        assert_eq!(cache.get("youtube", "k").as_deref(), Some("video"));
        assert_eq!(cache.get("missing", "k"), None);
    }

    #[tokio::test]
    async fn concurrent_writers() {
        let cache = Arc::new(BoundedCache::new());
        cache.set_capacity("web", 10);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for i in 0..50 {
                        cache.set("web", &format!("{t}-{i}"), i.to_string());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len("web"), 10);
    }
}
