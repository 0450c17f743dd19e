use crate::children::{self, Children};
use crate::endpoint::EndpointKey;
use crate::instance::InstanceRecord;
use crate::series::Sample;
use log::info;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Instances that have not reported for this long are dropped by eviction.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(240 * 60);

/// REST metrics of every instance running one version of an application.
#[derive(Debug)]
pub struct VersionCache {
    application_id: String,
    application_version: String,
    stale_threshold_ms: i64,
    instances: Children<String, InstanceRecord>,
}

impl VersionCache {
    pub fn new(application_id: impl Into<String>, application_version: impl Into<String>) -> Self {
        Self::with_stale_threshold(application_id, application_version, DEFAULT_STALE_THRESHOLD)
    }

    pub fn with_stale_threshold(
        application_id: impl Into<String>,
        application_version: impl Into<String>,
        stale_threshold: Duration,
    ) -> Self {
        Self {
            application_id: application_id.into(),
            application_version: application_version.into(),
            stale_threshold_ms: i64::try_from(stale_threshold.as_millis()).unwrap_or(i64::MAX),
            instances: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn application_version(&self) -> &str {
        &self.application_version
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms as u64)
    }

    /// Stores one sample, creating the instance, endpoint and status code
    /// series on first sight.
    pub fn add_data_point(
        &self,
        instance_id: &str,
        path: &str,
        method: &str,
        status_code: u16,
        sample: Sample,
    ) {
        let instance = children::find_or_create(&self.instances, instance_id, || {
            (
                instance_id.to_string(),
                InstanceRecord::new(instance_id, sample.timestamp_ms),
            )
        });
        instance.record(&EndpointKey::new(path, method), status_code, sample);
    }

    /// Drops every instance whose latest sample is older than the stale
    /// threshold relative to `now_ms`. Returns the dropped instance ids.
    pub fn evict_stale_instances(&self, now_ms: i64) -> Vec<String> {
        let mut evicted = Vec::new();
        self.instances.write().retain(|instance_id, instance| {
            let idle_ms = instance.idle_ms(now_ms);
            if idle_ms > self.stale_threshold_ms {
                info!(
                    "removing stale instance {} of {}/{} (idle {}ms)",
                    instance_id, self.application_id, self.application_version, idle_ms
                );
                evicted.push(instance_id.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Distinct `path|method` identifiers across all instances.
    pub fn list_tracked_endpoints(&self) -> BTreeSet<String> {
        self.instances()
            .iter()
            .flat_map(|instance| instance.endpoints())
            .map(|endpoint| endpoint.key().to_string())
            .collect()
    }

    pub fn instance_ids(&self) -> Vec<String> {
        self.instances.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    pub(crate) fn instances(&self) -> Vec<Arc<InstanceRecord>> {
        children::snapshot(&self.instances)
    }
}
