//! Rolling two hour cache of REST endpoint metrics reported by application
//! instances, aggregated per application version.

mod check;
mod children;
mod endpoint;
mod instance;
mod query;
mod registry;
mod series;
mod version;

pub use check::{CheckData, RestCheck, RestSample};
pub use endpoint::{EndpointKey, EndpointRecord};
pub use instance::InstanceRecord;
pub use query::{EndpointPoint, EndpointResult, VersionResult};
pub use registry::{VersionKey, VersionRegistry};
pub use series::{BUCKET_WIDTH_MS, BUCKETS, BucketedSeries, EMPTY_TIMESTAMP, Sample, WINDOW_MS, bucket_index};
pub use version::{DEFAULT_STALE_THRESHOLD, VersionCache};
