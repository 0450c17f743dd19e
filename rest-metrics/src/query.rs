use crate::endpoint::{EndpointKey, EndpointRecord};
use crate::series::{BUCKETS, BucketedSeries, Sample, WINDOW_MS};
use crate::version::VersionCache;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One minute of an endpoint/status code fused across instances.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPoint {
    pub timestamp_ms: i64,
    pub total_rate: f64,
    pub avg_latency_99th: f64,
    pub avg_latency_75th: f64,
    pub avg_latency_median: f64,
    pub max_rate: f64,
    pub max_latency: f64,
    pub min_latency: f64,
    /// Set when at least one instance tracking this series had no fresh
    /// sample for the minute.
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointResult {
    pub path: String,
    pub method: String,
    /// Points per status code, ordered by timestamp.
    pub points: BTreeMap<u16, Vec<EndpointPoint>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResult {
    pub application_id: String,
    pub application_version: String,
    /// Keyed by `path|method`.
    pub endpoints: BTreeMap<String, EndpointResult>,
}

struct PointAccumulator {
    contributors: usize,
    partial: bool,
    timestamp_ms: i64,
    rate: f64,
    latency_99th: f64,
    latency_75th: f64,
    latency_median: f64,
    max_rate: f64,
    max_latency: f64,
    min_latency: f64,
}

impl PointAccumulator {
    fn new() -> Self {
        Self {
            contributors: 0,
            partial: false,
            timestamp_ms: i64::MIN,
            rate: 0.0,
            latency_99th: 0.0,
            latency_75th: 0.0,
            latency_median: 0.0,
            max_rate: f64::NEG_INFINITY,
            max_latency: f64::NEG_INFINITY,
            min_latency: f64::INFINITY,
        }
    }

    fn add(&mut self, sample: &Sample) {
        self.contributors += 1;
        self.timestamp_ms = self.timestamp_ms.max(sample.timestamp_ms);
        self.rate += sample.rate;
        self.latency_99th += sample.latency_99th;
        self.latency_75th += sample.latency_75th;
        self.latency_median += sample.latency_median;
        self.max_rate = self.max_rate.max(sample.rate);
        self.max_latency = self.max_latency.max(sample.latency_99th);
        self.min_latency = self.min_latency.min(sample.latency_99th);
    }

    fn finish(self) -> Option<EndpointPoint> {
        if self.contributors == 0 {
            return None;
        }
        let n = self.contributors as f64;
        Some(EndpointPoint {
            timestamp_ms: self.timestamp_ms,
            total_rate: self.rate,
            avg_latency_99th: self.latency_99th / n,
            avg_latency_75th: self.latency_75th / n,
            avg_latency_median: self.latency_median / n,
            max_rate: self.max_rate,
            max_latency: self.max_latency,
            min_latency: self.min_latency,
            partial: self.partial,
        })
    }
}

/// Fuses the same series from several instances bucket by bucket. Rates are
/// summed, latency percentiles are averaged over the instances that had a
/// fresh sample, and buckets nobody reported are left out.
fn fuse(series: &[Arc<BucketedSeries>], cutoff_ms: i64) -> Vec<EndpointPoint> {
    let mut points: Vec<EndpointPoint> = (0..BUCKETS)
        .filter_map(|bucket| {
            let mut acc = PointAccumulator::new();
            for s in series {
                let sample = s.sample_at(bucket);
                if sample.is_fresh(cutoff_ms) {
                    acc.add(&sample);
                } else {
                    acc.partial = true;
                }
            }
            acc.finish()
        })
        .collect();
    // bucket order follows wall-clock minutes modulo the window
    points.sort_by_key(|p| p.timestamp_ms);
    points
}

impl VersionCache {
    /// Aggregates every endpoint and status code across all instances.
    ///
    /// Only samples newer than `max_age_cutoff_ms` minus the 120 minute
    /// window are used. Every endpoint is reported for every status code
    /// seen anywhere in the version, so an endpoint may carry an empty
    /// series for a code it never returned.
    pub fn get_data(&self, max_age_cutoff_ms: i64) -> VersionResult {
        let cutoff_ms = max_age_cutoff_ms.saturating_sub(WINDOW_MS);
        let records: Vec<Arc<EndpointRecord>> = self
            .instances()
            .iter()
            .flat_map(|instance| instance.endpoints())
            .collect();

        let keys: BTreeSet<&EndpointKey> = records.iter().map(|e| e.key()).collect();
        let codes: BTreeSet<u16> = records.iter().flat_map(|e| e.status_codes()).collect();

        let endpoints = keys
            .into_iter()
            .map(|key| {
                let matching: Vec<&Arc<EndpointRecord>> =
                    records.iter().filter(|e| e.key() == key).collect();
                let points = codes
                    .iter()
                    .map(|&code| {
                        let series: Vec<Arc<BucketedSeries>> =
                            matching.iter().filter_map(|e| e.series(code)).collect();
                        (code, fuse(&series, cutoff_ms))
                    })
                    .collect();
                let result = EndpointResult {
                    path: key.path.clone(),
                    method: key.method.clone(),
                    points,
                };
                (key.to_string(), result)
            })
            .collect();

        VersionResult {
            application_id: self.application_id().to_string(),
            application_version: self.application_version().to_string(),
            endpoints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::BUCKET_WIDTH_MS;
    use pretty_assertions::assert_eq;

    /// Smallest query cutoff that still treats `timestamp_ms` as fresh.
    fn cutoff_keeping(timestamp_ms: i64) -> i64 {
        timestamp_ms - 1 + WINDOW_MS
    }

    fn points(result: &VersionResult, endpoint: &str, code: u16) -> Vec<EndpointPoint> {
        result.endpoints[endpoint].points[&code].clone()
    }

    #[test]
    fn fuses_two_instances_into_one_point() {
        let cache = VersionCache::new("shop", "1.0");
        cache.add_data_point("i1", "/x", "GET", 200, Sample::new(60_000, 1.0, 10.0, 20.0, 30.0));
        cache.add_data_point("i2", "/x", "GET", 200, Sample::new(60_000, 3.0, 30.0, 30.0, 30.0));

        let result = cache.get_data(cutoff_keeping(60_000));
        assert_eq!(
            points(&result, "/x|GET", 200),
            vec![EndpointPoint {
                timestamp_ms: 60_000,
                total_rate: 4.0,
                avg_latency_99th: 30.0,
                avg_latency_75th: 25.0,
                avg_latency_median: 20.0,
                max_rate: 3.0,
                max_latency: 30.0,
                min_latency: 30.0,
                partial: false,
            }]
        );
        assert_eq!(result.endpoints["/x|GET"].path, "/x");
        assert_eq!(result.endpoints["/x|GET"].method, "GET");
    }

    #[test]
    fn missing_instance_marks_point_partial() {
        let cache = VersionCache::new("shop", "1.0");
        cache.add_data_point("i1", "/x", "GET", 200, Sample::new(60_000, 1.0, 10.0, 20.0, 30.0));
        cache.add_data_point("i1", "/x", "GET", 200, Sample::new(120_000, 2.0, 10.0, 20.0, 40.0));
        cache.add_data_point("i2", "/x", "GET", 200, Sample::new(60_000, 3.0, 30.0, 30.0, 30.0));

        let series = points(&cache.get_data(cutoff_keeping(60_000)), "/x|GET", 200);
        assert_eq!(series.len(), 2);
        assert!(!series[0].partial);
        assert_eq!(series[1].timestamp_ms, 120_000);
        assert!(series[1].partial);
        assert_eq!(series[1].total_rate, 2.0);
        assert_eq!(series[1].avg_latency_99th, 40.0);
    }

    #[test]
    fn extrema_follow_contributing_instances() {
        let cache = VersionCache::new("shop", "1.0");
        let t = 10 * BUCKET_WIDTH_MS;
        cache.add_data_point("i1", "/x", "GET", 200, Sample::new(t, 5.0, 1.0, 2.0, 90.0));
        cache.add_data_point("i2", "/x", "GET", 200, Sample::new(t + 500, 1.0, 1.0, 2.0, 10.0));
        cache.add_data_point("i3", "/x", "GET", 200, Sample::new(t + 100, 3.0, 4.0, 5.0, 50.0));

        let point = points(&cache.get_data(cutoff_keeping(t)), "/x|GET", 200).remove(0);
        assert_eq!(point.timestamp_ms, t + 500);
        assert_eq!(point.total_rate, 9.0);
        assert_eq!(point.max_rate, 5.0);
        assert_eq!(point.max_latency, 90.0);
        assert_eq!(point.min_latency, 10.0);
        assert_eq!(point.avg_latency_99th, 50.0);
        assert_eq!(point.avg_latency_median, 2.0);
        assert_eq!(point.avg_latency_75th, 3.0);
    }

    #[test]
    fn stale_buckets_are_dropped() {
        let cache = VersionCache::new("shop", "1.0");
        let old = 5 * BUCKET_WIDTH_MS;
        let recent = old + WINDOW_MS / 2;
        cache.add_data_point("i1", "/x", "GET", 200, Sample::new(old, 1.0, 1.0, 1.0, 1.0));
        cache.add_data_point("i1", "/x", "GET", 200, Sample::new(recent, 2.0, 1.0, 1.0, 1.0));

        let max_age_cutoff = old + WINDOW_MS;
        let series = points(&cache.get_data(max_age_cutoff), "/x|GET", 200);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].timestamp_ms, recent);
        assert!(series.iter().all(|p| p.timestamp_ms > max_age_cutoff - WINDOW_MS));
    }

    #[test]
    fn nothing_fresh_emits_no_points() {
        let cache = VersionCache::new("shop", "1.0");
        cache.add_data_point("i1", "/x", "GET", 200, Sample::new(60_000, 1.0, 1.0, 1.0, 1.0));

        let series = points(&cache.get_data(60_000 + WINDOW_MS), "/x|GET", 200);
        assert!(series.is_empty());
    }

    #[test]
    fn points_sorted_across_ring_wrap() {
        let cache = VersionCache::new("shop", "1.0");
        // minutes 118 and 119 of the first window, then 0 and 1 of the next
        let start = 118 * BUCKET_WIDTH_MS;
        for minute in 0..4 {
            let ts = start + minute * BUCKET_WIDTH_MS;
            cache.add_data_point("i1", "/x", "GET", 200, Sample::new(ts, minute as f64, 1.0, 1.0, 1.0));
        }

        let series = points(&cache.get_data(cutoff_keeping(start)), "/x|GET", 200);
        let timestamps: Vec<i64> = series.iter().map(|p| p.timestamp_ms).collect();
        assert_eq!(
            timestamps,
            vec![start, start + 60_000, start + 120_000, start + 180_000]
        );
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn status_codes_cross_join_every_endpoint() {
        let cache = VersionCache::new("shop", "1.0");
        cache.add_data_point("i1", "/x", "GET", 200, Sample::new(60_000, 1.0, 1.0, 1.0, 1.0));
        cache.add_data_point("i2", "/y", "POST", 503, Sample::new(60_000, 1.0, 1.0, 1.0, 1.0));

        let result = cache.get_data(cutoff_keeping(60_000));
        let x = &result.endpoints["/x|GET"].points;
        assert_eq!(x.keys().copied().collect::<Vec<_>>(), vec![200, 503]);
        assert_eq!(x[&200].len(), 1);
        assert!(x[&503].is_empty());
        assert!(result.endpoints["/y|POST"].points[&200].is_empty());
    }

    #[test]
    fn evicted_instances_leave_results() {
        let t = 3_600_000;
        let cache = VersionCache::with_stale_threshold("shop", "1.0", std::time::Duration::from_secs(60));
        cache.add_data_point("i1", "/x", "GET", 200, Sample::new(t, 1.0, 1.0, 1.0, 1.0));
        cache.add_data_point("i2", "/y", "GET", 200, Sample::new(t + 120_000, 1.0, 1.0, 1.0, 1.0));

        cache.evict_stale_instances(t + 120_000);
        let result = cache.get_data(cutoff_keeping(t));
        assert_eq!(result.endpoints.keys().collect::<Vec<_>>(), vec!["/y|GET"]);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let cache = VersionCache::new("shop", "1.0");
        cache.add_data_point("i1", "/x", "GET", 200, Sample::new(60_000, 1.0, 10.0, 20.0, 30.0));

        let json = serde_json::to_value(cache.get_data(cutoff_keeping(60_000))).unwrap();
        let point = &json["endpoints"]["/x|GET"]["points"]["200"][0];
        assert_eq!(json["applicationId"], "shop");
        assert_eq!(point["timestampMs"], 60_000);
        assert_eq!(point["totalRate"], 1.0);
        assert_eq!(point["avgLatency99th"], 30.0);
        assert_eq!(point["avgLatencyMedian"], 10.0);
        assert_eq!(point["partial"], false);
    }
}
