use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Number of one-minute buckets kept per series.
pub const BUCKETS: usize = 120;

/// Width of a single bucket in milliseconds.
pub const BUCKET_WIDTH_MS: i64 = 60_000;

/// Span covered by the whole ring, 120 minutes.
pub const WINDOW_MS: i64 = BUCKETS as i64 * BUCKET_WIDTH_MS;

/// Timestamp of a bucket that was never written.
pub const EMPTY_TIMESTAMP: i64 = 0;

/// One summarized measurement for a minute of traffic.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub rate: f64,
    pub latency_median: f64,
    pub latency_75th: f64,
    pub latency_99th: f64,
}

impl Sample {
    pub fn new(
        timestamp_ms: i64,
        rate: f64,
        latency_median: f64,
        latency_75th: f64,
        latency_99th: f64,
    ) -> Self {
        Self {
            timestamp_ms,
            rate,
            latency_median,
            latency_75th,
            latency_99th,
        }
    }

    /// A sample is fresh when it was written and is newer than `cutoff_ms`.
    pub fn is_fresh(&self, cutoff_ms: i64) -> bool {
        self.timestamp_ms != EMPTY_TIMESTAMP && self.timestamp_ms > cutoff_ms
    }
}

/// Returns the ring slot a timestamp maps to.
pub fn bucket_index(timestamp_ms: i64) -> usize {
    timestamp_ms
        .div_euclid(BUCKET_WIDTH_MS)
        .rem_euclid(BUCKETS as i64) as usize
}

#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct Slot {
    timestamp_ms: AtomicI64,
    rate: AtomicF64,
    latency_median: AtomicF64,
    latency_75th: AtomicF64,
    latency_99th: AtomicF64,
}

/// Rolling 120 minute window of samples for one status code of one endpoint
/// on one instance.
///
/// Writes never lock. A reader racing a writer on the same slot may observe
/// a mix of old and new metrics; dashboards tolerate that. Samples whose
/// timestamps are a multiple of the window apart share a slot and the later
/// write wins.
#[derive(Debug)]
pub struct BucketedSeries {
    status_code: u16,
    slots: Box<[Slot]>,
}

impl BucketedSeries {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            slots: (0..BUCKETS).map(|_| Slot::default()).collect(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Overwrites the slot for the sample's minute.
    pub fn record(&self, sample: Sample) {
        let slot = &self.slots[bucket_index(sample.timestamp_ms)];
        slot.rate.store(sample.rate);
        slot.latency_median.store(sample.latency_median);
        slot.latency_75th.store(sample.latency_75th);
        slot.latency_99th.store(sample.latency_99th);
        // published last so readers that see the timestamp see the metrics too
        slot.timestamp_ms.store(sample.timestamp_ms, Ordering::Release);
    }

    /// Reads slot `index`. Unwritten slots come back with `EMPTY_TIMESTAMP`.
    pub fn sample_at(&self, index: usize) -> Sample {
        let slot = &self.slots[index % BUCKETS];
        let timestamp_ms = slot.timestamp_ms.load(Ordering::Acquire);
        Sample {
            timestamp_ms,
            rate: slot.rate.load(),
            latency_median: slot.latency_median.load(),
            latency_75th: slot.latency_75th.load(),
            latency_99th: slot.latency_99th.load(),
        }
    }
}
