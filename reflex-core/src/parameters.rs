//! Configuration resolver: parameter store client fronted by an explicit cache.
//!
//! The cache is a plain object shared by `Arc`, injected into the resolver.
//! Entries live for the lifetime of the process and are never refreshed; a
//! changed parameter is only picked up after a restart, or after `clear()`.

use crate::error::ParameterError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Backing key-value configuration store.
#[async_trait]
pub trait ParameterSource: Send + Sync {
    /// Fetch a parameter value. Fails with `ParameterError::NotFound` when the
    /// store has no parameter with that name.
    async fn get_parameter(&self, name: &str) -> Result<String, ParameterError>;
}

/// Process-wide parameter cache.
#[derive(Debug, Default)]
pub struct ParameterCache {
    entries: RwLock<HashMap<String, String>>,
}

impl ParameterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached value.
    pub async fn get(&self, name: &str) -> Option<String> {
        self.entries.read().await.get(name).cloned()
    }

    /// Store a resolved value.
    pub async fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.write().await.insert(name.into(), value.into());
    }

    /// Whether a value is cached for `name`.
    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Number of cached parameters.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every cached value.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Resolves named parameters, fetching each one from the source at most once
/// per cache lifetime.
#[derive(Clone)]
pub struct ConfigResolver {
    source: Arc<dyn ParameterSource>,
    cache: Arc<ParameterCache>,
}

impl ConfigResolver {
    pub fn new(source: Arc<dyn ParameterSource>, cache: Arc<ParameterCache>) -> Self {
        Self { source, cache }
    }

    /// The cache backing this resolver.
    pub fn cache(&self) -> &Arc<ParameterCache> {
        &self.cache
    }

    /// Resolve a parameter, hitting the backing store only on a cache miss.
    ///
    /// Failed lookups are not cached, so a `NotFound` is retried on the next
    /// call.
    pub async fn get_parameter(&self, name: &str) -> Result<String, ParameterError> {
        if let Some(value) = self.cache.get(name).await {
            tracing::debug!(parameter = name, "Parameter served from cache");
            return Ok(value);
        }

        tracing::debug!(parameter = name, "Fetching parameter from store");
        let value = self.source.get_parameter(name).await.map_err(|e| {
            tracing::error!(parameter = name, error = %e, "Parameter lookup failed");
            e
        })?;

        self.cache.insert(name, value.clone()).await;
        Ok(value)
    }
}

/// In-memory parameter source.
///
/// Used by the invocation shim (fed from the `parameters` config table) and by
/// tests, which rely on `fetch_count()` to observe cache behaviour.
#[derive(Debug, Default)]
pub struct StaticParameterSource {
    values: RwLock<HashMap<String, String>>,
    fetches: AtomicUsize,
}

impl StaticParameterSource {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self {
            values: RwLock::new(values),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Builder-style helper for a single entry.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.get_mut().insert(name.into(), value.into());
        self
    }

    /// Replace or add a value after construction.
    pub async fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.values.write().await.insert(name.into(), value.into());
    }

    /// Total number of `get_parameter` calls served, hits and misses alike.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParameterSource for StaticParameterSource {
    async fn get_parameter(&self, name: &str) -> Result<String, ParameterError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.values
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ParameterError::NotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with(source: Arc<StaticParameterSource>) -> ConfigResolver {
        ConfigResolver::new(source, Arc::new(ParameterCache::new()))
    }

    #[tokio::test]
    async fn test_first_lookup_fetches_and_caches() {
        let source = Arc::new(StaticParameterSource::default().with("/test/param", "secret_value"));
        let resolver = resolver_with(source.clone());

        let value = resolver.get_parameter("/test/param").await.unwrap();
        assert_eq!(value, "secret_value");
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(
            resolver.cache().get("/test/param").await.as_deref(),
            Some("secret_value")
        );
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let source =
            Arc::new(StaticParameterSource::default().with("/test/cached_param", "cached_value"));
        let resolver = resolver_with(source.clone());

        let first = resolver.get_parameter("/test/cached_param").await.unwrap();
        let second = resolver.get_parameter("/test/cached_param").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_cached_value_survives_store_change() {
        let source = Arc::new(StaticParameterSource::default().with("/sg", "sg-old"));
        let resolver = resolver_with(source.clone());

        assert_eq!(resolver.get_parameter("/sg").await.unwrap(), "sg-old");
        source.set("/sg", "sg-new").await;
        assert_eq!(resolver.get_parameter("/sg").await.unwrap(), "sg-old");
    }

    #[tokio::test]
    async fn test_clear_forces_one_new_fetch() {
        let source = Arc::new(StaticParameterSource::default().with("/sg", "sg-1"));
        let resolver = resolver_with(source.clone());

        resolver.get_parameter("/sg").await.unwrap();
        resolver.get_parameter("/sg").await.unwrap();
        assert_eq!(source.fetch_count(), 1);

        resolver.cache().clear().await;
        assert!(resolver.cache().is_empty().await);

        resolver.get_parameter("/sg").await.unwrap();
        resolver.get_parameter("/sg").await.unwrap();
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let source = Arc::new(StaticParameterSource::default());
        let resolver = resolver_with(source.clone());

        let err = resolver.get_parameter("/test/not_found").await.unwrap_err();
        assert!(err.to_string().contains("Parameter /test/not_found is not found"));
        assert!(!resolver.cache().contains("/test/not_found").await);

        resolver.get_parameter("/test/not_found").await.unwrap_err();
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_shared_cache_across_resolvers() {
        let source = Arc::new(StaticParameterSource::default().with("/topic", "arn:topic"));
        let cache = Arc::new(ParameterCache::new());
        let a = ConfigResolver::new(source.clone(), cache.clone());
        let b = ConfigResolver::new(source.clone(), cache.clone());

        a.get_parameter("/topic").await.unwrap();
        b.get_parameter("/topic").await.unwrap();
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(cache.len().await, 1);
    }
}
