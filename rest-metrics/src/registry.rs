use crate::check::CheckData;
use crate::children::{self, Children};
use crate::version::VersionCache;
use anyhow::Result;
use log::{debug, info};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionKey {
    pub application_id: String,
    pub application_version: String,
}

impl VersionKey {
    pub fn new(application_id: impl Into<String>, application_version: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            application_version: application_version.into(),
        }
    }
}

/// Routes incoming samples to the cache of their application version.
pub struct VersionRegistry {
    stale_threshold: Duration,
    versions: Children<VersionKey, VersionCache>,
}

impl VersionRegistry {
    pub fn new(stale_threshold: Duration) -> Self {
        Self {
            stale_threshold,
            versions: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn version(&self, application_id: &str, application_version: &str) -> Arc<VersionCache> {
        let key = VersionKey::new(application_id, application_version);
        children::find_or_create(&self.versions, &key, || {
            info!("tracking new version {}/{}", application_id, application_version);
            (
                key.clone(),
                VersionCache::with_stale_threshold(
                    application_id,
                    application_version,
                    self.stale_threshold,
                ),
            )
        })
    }

    pub fn get(&self, application_id: &str, application_version: &str) -> Option<Arc<VersionCache>> {
        let key = VersionKey::new(application_id, application_version);
        self.versions.read().get(&key).cloned()
    }

    pub fn versions(&self) -> Vec<VersionKey> {
        self.versions.read().keys().cloned().collect()
    }

    /// Stores every REST sample carried by `check`. Returns how many were
    /// stored; records that are not REST metrics store nothing.
    pub fn ingest(&self, check: &CheckData) -> Result<usize> {
        let Some(rest) = check.rest_check()? else {
            debug!("ignoring check {} for {}", check.check_id, check.entity_id);
            return Ok(0);
        };

        let cache = self.version(&rest.application_id, &rest.application_version);
        for s in &rest.samples {
            cache.add_data_point(&rest.instance_id, &s.path, &s.method, s.status_code, s.sample);
        }
        Ok(rest.samples.len())
    }

    /// Evicts stale instances from every version, then forgets versions
    /// with no instances left. Returns the number of evicted instances.
    pub fn evict_stale(&self, now_ms: i64) -> usize {
        let evicted = children::snapshot(&self.versions)
            .iter()
            .map(|cache| cache.evict_stale_instances(now_ms).len())
            .sum();

        // a cache still referenced elsewhere may be about to receive samples
        self.versions.write().retain(|key, cache| {
            let keep = !cache.is_empty() || Arc::strong_count(cache) > 1;
            if !keep {
                info!(
                    "dropping version {}/{} with no live instances",
                    key.application_id, key.application_version
                );
            }
            keep
        });
        evicted
    }
}
