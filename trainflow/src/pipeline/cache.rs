//! Output caching for cacheable stages.
//!
//! Entries are keyed by [`CacheKey`], which is derived from a stage's command
//! and the content of its resolved inputs. A hit lets a runner skip the stage
//! and reuse the recorded outputs.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::ArtifactValue;
use crate::stages::CacheKey;

/// Cached stage outputs with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedOutputs {
    /// The stage that produced the outputs.
    pub stage: String,
    /// The cached outputs, by port.
    pub outputs: BTreeMap<String, ArtifactValue>,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
    /// When the entry expires, if ever.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedOutputs {
    /// Creates a new cache entry.
    #[must_use]
    pub fn new(stage: impl Into<String>, outputs: BTreeMap<String, ArtifactValue>) -> Self {
        Self {
            stage: stage.into(),
            outputs,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Sets the expiration time relative to creation.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(self.created_at + ttl);
        self
    }

    /// Returns true if the entry has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

/// Storage backend for cached stage outputs.
#[async_trait]
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    /// Gets a live entry by key.
    async fn get(&self, key: &CacheKey) -> Option<CachedOutputs>;

    /// Stores an entry, replacing any previous one.
    async fn set(&self, key: &CacheKey, entry: CachedOutputs);

    /// Deletes an entry.
    async fn delete(&self, key: &CacheKey);

    /// Clears all entries.
    async fn clear(&self);
}

/// In-memory cache store.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, CachedOutputs>,
}

impl InMemoryCacheStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Option<CachedOutputs> {
        if self
            .entries
            .remove_if(key.as_str(), |_, entry| entry.is_expired())
            .is_some()
        {
            return None;
        }
        self.entries.get(key.as_str()).map(|entry| entry.clone())
    }

    async fn set(&self, key: &CacheKey, entry: CachedOutputs) {
        self.entries.insert(key.as_str().to_string(), entry);
    }

    async fn delete(&self, key: &CacheKey) {
        self.entries.remove(key.as_str());
    }

    async fn clear(&self) {
        self.entries.clear();
    }
}
