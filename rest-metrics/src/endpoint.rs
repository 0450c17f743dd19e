use crate::children::{self, Children};
use crate::series::BucketedSeries;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Identity of a REST endpoint, rendered as `path|method`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointKey {
    pub path: String,
    pub method: String,
}

impl EndpointKey {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.path, self.method)
    }
}

/// All series observed for one endpoint on one instance, one per status code.
/// Series are never removed.
#[derive(Debug)]
pub struct EndpointRecord {
    key: EndpointKey,
    series: Children<u16, BucketedSeries>,
}

impl EndpointRecord {
    pub fn new(key: EndpointKey) -> Self {
        Self {
            key,
            series: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn key(&self) -> &EndpointKey {
        &self.key
    }

    pub fn path(&self) -> &str {
        &self.key.path
    }

    pub fn method(&self) -> &str {
        &self.key.method
    }

    pub fn find_or_create_series(&self, status_code: u16) -> Arc<BucketedSeries> {
        children::find_or_create(&self.series, &status_code, || {
            (status_code, BucketedSeries::new(status_code))
        })
    }

    pub fn series(&self, status_code: u16) -> Option<Arc<BucketedSeries>> {
        self.series.read().get(&status_code).cloned()
    }

    pub fn status_codes(&self) -> Vec<u16> {
        self.series.read().keys().copied().collect()
    }

    pub fn all_series(&self) -> Vec<Arc<BucketedSeries>> {
        children::snapshot(&self.series)
    }
}
