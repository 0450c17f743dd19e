use crate::children::{self, Children};
use crate::endpoint::{EndpointKey, EndpointRecord};
use crate::series::Sample;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Everything one reporting instance has sent for an application version.
#[derive(Debug)]
pub struct InstanceRecord {
    instance_id: String,
    endpoints: Children<EndpointKey, EndpointRecord>,
    max_timestamp: AtomicI64,
}

impl InstanceRecord {
    /// `first_seen_ms` seeds the recency used for eviction, so an instance
    /// that was created but not yet written to is not considered idle.
    pub fn new(instance_id: impl Into<String>, first_seen_ms: i64) -> Self {
        Self {
            instance_id: instance_id.into(),
            endpoints: RwLock::new(BTreeMap::new()),
            max_timestamp: AtomicI64::new(first_seen_ms),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn find_or_create_endpoint(&self, key: &EndpointKey) -> Arc<EndpointRecord> {
        children::find_or_create(&self.endpoints, key, || {
            (key.clone(), EndpointRecord::new(key.clone()))
        })
    }

    pub fn endpoints(&self) -> Vec<Arc<EndpointRecord>> {
        children::snapshot(&self.endpoints)
    }

    /// Routes a sample to its endpoint and status code series.
    pub fn record(&self, key: &EndpointKey, status_code: u16, sample: Sample) {
        self.find_or_create_endpoint(key)
            .find_or_create_series(status_code)
            .record(sample);
        self.max_timestamp.fetch_max(sample.timestamp_ms, Ordering::AcqRel);
    }

    /// Latest sample timestamp written to any of this instance's series.
    pub fn max_timestamp(&self) -> i64 {
        self.max_timestamp.load(Ordering::Acquire)
    }

    pub fn idle_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.max_timestamp())
    }
}
