//! Metrics.
//!
//! [`MetricsRegistry`] is a [`metrics::Recorder`] that keeps every registered series in memory and can render them in
//! the Prometheus text exposition format. It is never installed as the global recorder: components create their
//! handles against an explicit registry (via [`MetricsRegistry::scoped`]) so that the registry can be handed to the
//! scrape route and, in tests, inspected directly.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Write as _,
    sync::{atomic::Ordering, Arc, Mutex},
};

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Label, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};

/// Default latency buckets, in seconds.
const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

struct CumulativeHistogram {
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl CumulativeHistogram {
    fn new(bucket_len: usize) -> Self {
        Self {
            bucket_counts: vec![0; bucket_len],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, bounds: &[f64], value: f64) {
        for (bound, count) in bounds.iter().zip(self.bucket_counts.iter_mut()) {
            if value <= *bound {
                *count += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

struct Inner {
    registry: Registry<Key, AtomicStorage>,
    descriptions: Mutex<HashMap<String, String>>,
    histograms: Mutex<HashMap<Key, CumulativeHistogram>>,
    buckets: Vec<f64>,
}

/// An in-memory metrics registry with Prometheus rendering.
///
/// Cloning is cheap, and all clones share the same underlying series.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<Inner>,
}

impl MetricsRegistry {
    /// Creates an empty registry using the default latency buckets for histograms.
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS.to_vec())
    }

    /// Creates an empty registry using the given histogram bucket upper bounds.
    ///
    /// Bounds are sorted and deduplicated; the implicit `+Inf` bucket is always rendered.
    pub fn with_buckets(mut buckets: Vec<f64>) -> Self {
        buckets.retain(|b| b.is_finite());
        buckets.sort_by(|a, b| a.total_cmp(b));
        buckets.dedup();

        Self {
            inner: Arc::new(Inner {
                registry: Registry::new(AtomicStorage {}),
                descriptions: Mutex::new(HashMap::new()),
                histograms: Mutex::new(HashMap::new()),
                buckets,
            }),
        }
    }

    /// Runs `f` with this registry acting as the recorder for the current thread.
    ///
    /// Any `counter!`, `gauge!` or `histogram!` invoked inside `f` registers its series here. The handles returned
    /// remain bound to this registry after `f` returns.
    pub fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        metrics::with_local_recorder(self, f)
    }

    /// Returns the current value of the counter with the given name and labels, if it exists.
    ///
    /// Label order does not matter.
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        self.inner
            .registry
            .get_counter_handles()
            .into_iter()
            .find(|(key, _)| key_matches(key, name, labels))
            .map(|(_, counter)| counter.load(Ordering::Acquire))
    }

    /// Returns the current value of the gauge with the given name and labels, if it exists.
    ///
    /// Label order does not matter.
    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.inner
            .registry
            .get_gauge_handles()
            .into_iter()
            .find(|(key, _)| key_matches(key, name, labels))
            .map(|(_, gauge)| f64::from_bits(gauge.load(Ordering::Acquire)))
    }

    /// Returns the number of observations recorded by the histogram with the given name and labels, if it exists.
    pub fn histogram_count(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        self.drain_histograms();

        let histograms = self.inner.histograms.lock().unwrap_or_else(|e| e.into_inner());
        histograms
            .iter()
            .find(|(key, _)| key_matches(key, name, labels))
            .map(|(_, histogram)| histogram.count)
    }

    /// Renders every registered series in the Prometheus text exposition format.
    ///
    /// Series are grouped by metric name, and both groups and series are emitted in sorted order.
    pub fn render(&self) -> String {
        self.drain_histograms();

        let descriptions = self.inner.descriptions.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let mut output = String::new();

        let mut counters: BTreeMap<String, Vec<(String, u64)>> = BTreeMap::new();
        for (key, counter) in self.inner.registry.get_counter_handles() {
            counters
                .entry(key.name().to_string())
                .or_default()
                .push((render_labels(&key, None), counter.load(Ordering::Acquire)));
        }

        for (name, mut series) in counters {
            series.sort();
            write_header(&mut output, &name, "counter", descriptions.get(&name));
            for (labels, value) in series {
                let _ = writeln!(output, "{}{} {}", name, labels, value);
            }
        }

        let mut gauges: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
        for (key, gauge) in self.inner.registry.get_gauge_handles() {
            gauges
                .entry(key.name().to_string())
                .or_default()
                .push((render_labels(&key, None), f64::from_bits(gauge.load(Ordering::Acquire))));
        }

        for (name, mut series) in gauges {
            series.sort_by(|a, b| a.0.cmp(&b.0));
            write_header(&mut output, &name, "gauge", descriptions.get(&name));
            for (labels, value) in series {
                let _ = writeln!(output, "{}{} {}", name, labels, value);
            }
        }

        let histograms = self.inner.histograms.lock().unwrap_or_else(|e| e.into_inner());
        let mut grouped: BTreeMap<String, Vec<(&Key, &CumulativeHistogram)>> = BTreeMap::new();
        for (key, histogram) in histograms.iter() {
            grouped.entry(key.name().to_string()).or_default().push((key, histogram));
        }

        for (name, mut series) in grouped {
            series.sort_by_key(|(key, _)| render_labels(key, None));
            write_header(&mut output, &name, "histogram", descriptions.get(&name));
            for (key, histogram) in series {
                for (bound, count) in self.inner.buckets.iter().zip(&histogram.bucket_counts) {
                    let le = bound.to_string();
                    let _ = writeln!(
                        output,
                        "{}_bucket{} {}",
                        name,
                        render_labels(key, Some(&le)),
                        count
                    );
                }
                let _ = writeln!(
                    output,
                    "{}_bucket{} {}",
                    name,
                    render_labels(key, Some("+Inf")),
                    histogram.count
                );
                let _ = writeln!(output, "{}_sum{} {}", name, render_labels(key, None), histogram.sum);
                let _ = writeln!(output, "{}_count{} {}", name, render_labels(key, None), histogram.count);
            }
        }

        output
    }

    /// Moves pending histogram samples out of the atomic buckets and into the cumulative state.
    fn drain_histograms(&self) {
        let mut histograms = self.inner.histograms.lock().unwrap_or_else(|e| e.into_inner());
        let bounds = &self.inner.buckets;

        for (key, bucket) in self.inner.registry.get_histogram_handles() {
            let state = histograms
                .entry(key)
                .or_insert_with(|| CumulativeHistogram::new(bounds.len()));
            bucket.clear_with(|samples| {
                for sample in samples {
                    state.observe(bounds, *sample);
                }
            });
        }
    }

    fn describe(&self, key: KeyName, description: SharedString) {
        if description.is_empty() {
            return;
        }

        let mut descriptions = self.inner.descriptions.lock().unwrap_or_else(|e| e.into_inner());
        descriptions.insert(key.as_str().to_string(), String::from(&*description));
    }
}

impl Recorder for MetricsRegistry {
    fn describe_counter(&self, key: KeyName, _: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_gauge(&self, key: KeyName, _: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_histogram(&self, key: KeyName, _: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        self.inner
            .registry
            .get_or_create_counter(key, |c| c.clone().into())
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        self.inner.registry.get_or_create_gauge(key, |g| g.clone().into())
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        self.inner
            .registry
            .get_or_create_histogram(key, |h| h.clone().into())
    }
}

fn key_matches(key: &Key, name: &str, labels: &[(&str, &str)]) -> bool {
    if key.name() != name || key.labels().len() != labels.len() {
        return false;
    }

    labels
        .iter()
        .all(|(k, v)| key.labels().any(|label| label.key() == *k && label.value() == *v))
}

fn write_header(output: &mut String, name: &str, ty: &str, description: Option<&String>) {
    if let Some(description) = description {
        let _ = writeln!(output, "# HELP {} {}", name, description);
    }
    let _ = writeln!(output, "# TYPE {} {}", name, ty);
}

fn render_labels(key: &Key, le: Option<&str>) -> String {
    let mut labels: Vec<&Label> = key.labels().collect();
    labels.sort_by(|a, b| a.key().cmp(b.key()));

    if labels.is_empty() && le.is_none() {
        return String::new();
    }

    let mut rendered = String::from("{");
    let mut first = true;
    for label in labels {
        if !first {
            rendered.push(',');
        }
        first = false;
        let _ = write!(rendered, "{}=\"{}\"", label.key(), escape_label_value(label.value()));
    }

    if let Some(le) = le {
        if !first {
            rendered.push(',');
        }
        let _ = write!(rendered, "le=\"{}\"", le);
    }

    rendered.push('}');
    rendered
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
