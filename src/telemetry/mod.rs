//! Telemetry sinks and bounded statistics buffers
//!
//! The engine reports scalar and distribution-valued summaries tagged by
//! name and indexed by the global step counter. Summaries are buffered in
//! fixed-capacity ring buffers between flushes; when a buffer fills, the
//! training loop aggregates its contents into one summary and clears it.
//! Eviction of the oldest entry, rather than blocking, is the backpressure
//! mechanism.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tensorboard_rs::summary_writer::SummaryWriter;

/// Destination for training summaries
pub trait TelemetrySink {
    /// Record a scalar summary
    fn scalar(&mut self, tag: &str, value: f32, step: u64);

    /// Record a distribution summary
    fn histogram(&mut self, tag: &str, values: &[f32], step: u64);
}

/// Sink that discards everything
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn scalar(&mut self, _tag: &str, _value: f32, _step: u64) {}

    fn histogram(&mut self, _tag: &str, _values: &[f32], _step: u64) {}
}

/// TensorBoard-backed sink
///
/// Writes event files readable by `tensorboard --logdir <dir>`.
pub struct TensorBoardSink {
    writer: SummaryWriter,
}

impl TensorBoardSink {
    /// Create a sink writing event files under `logdir`
    pub fn new(logdir: &str) -> Self {
        Self { writer: SummaryWriter::new(logdir) }
    }
}

impl TelemetrySink for TensorBoardSink {
    fn scalar(&mut self, tag: &str, value: f32, step: u64) {
        self.writer.add_scalar(tag, value, step as usize);
        self.writer.flush();
    }

    fn histogram(&mut self, tag: &str, values: &[f32], step: u64) {
        if values.is_empty() {
            return;
        }
        let h = HistogramData::from_values(values);
        self.writer.add_histogram_raw(
            tag,
            h.min,
            h.max,
            h.num,
            h.sum,
            h.sum_squares,
            &h.bucket_limits,
            &h.bucket_counts,
            step as usize,
        );
        self.writer.flush();
    }
}

/// Pre-bucketed histogram statistics for the raw TensorBoard API
struct HistogramData {
    min: f64,
    max: f64,
    num: f64,
    sum: f64,
    sum_squares: f64,
    bucket_limits: Vec<f64>,
    bucket_counts: Vec<f64>,
}

impl HistogramData {
    const BUCKETS: usize = 30;

    fn from_values(values: &[f32]) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut sum_squares = 0.0;
        for &v in values {
            let v = v as f64;
            min = min.min(v);
            max = max.max(v);
            sum += v;
            sum_squares += v * v;
        }
        // Degenerate distributions still need a non-empty bucket range.
        let span = if max > min { max - min } else { 1.0 };

        let mut bucket_limits = Vec::with_capacity(Self::BUCKETS);
        let mut bucket_counts = vec![0.0; Self::BUCKETS];
        for b in 1..=Self::BUCKETS {
            bucket_limits.push(min + span * b as f64 / Self::BUCKETS as f64);
        }
        for &v in values {
            let idx = (((v as f64 - min) / span * Self::BUCKETS as f64) as usize)
                .min(Self::BUCKETS - 1);
            bucket_counts[idx] += 1.0;
        }

        Self { min, max, num: values.len() as f64, sum, sum_squares, bucket_limits, bucket_counts }
    }
}

/// In-memory sink for tests
///
/// Clones share the same recorded data, so a test can hand one clone to the
/// engine and inspect another.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recorded>>,
}

/// Everything a [`RecordingSink`] has been asked to record
#[derive(Default)]
pub struct Recorded {
    /// `(tag, value, step)` triples in arrival order
    pub scalars: Vec<(String, f32, u64)>,

    /// `(tag, values, step)` triples in arrival order
    pub histograms: Vec<(String, Vec<f32>, u64)>,
}

impl RecordingSink {
    /// Create an empty recording sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All scalars recorded so far
    pub fn scalars(&self) -> Vec<(String, f32, u64)> {
        self.inner.lock().unwrap().scalars.clone()
    }

    /// All histograms recorded so far
    pub fn histograms(&self) -> Vec<(String, Vec<f32>, u64)> {
        self.inner.lock().unwrap().histograms.clone()
    }

    /// Scalar values recorded under `tag`
    pub fn scalar_values(&self, tag: &str) -> Vec<f32> {
        self.scalars().into_iter().filter(|(t, _, _)| t == tag).map(|(_, v, _)| v).collect()
    }
}

impl TelemetrySink for RecordingSink {
    fn scalar(&mut self, tag: &str, value: f32, step: u64) {
        self.inner.lock().unwrap().scalars.push((tag.to_string(), value, step));
    }

    fn histogram(&mut self, tag: &str, values: &[f32], step: u64) {
        self.inner.lock().unwrap().histograms.push((tag.to_string(), values.to_vec(), step));
    }
}

/// Fixed-capacity ring buffer with oldest-entry eviction
#[derive(Debug)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    /// Create a buffer holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { items: VecDeque::with_capacity(capacity), capacity }
    }

    /// Append an entry, evicting the oldest one if the buffer is full
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Number of buffered entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the buffer holds no entries
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the buffer has reached its capacity
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take every buffered entry, leaving the buffer empty
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }
}
