//! Topology metrics
//!
//! Prometheus-compatible counters and gauges for placement, growth,
//! node health and sequence persistence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counter for tracking event counts
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge for tracking current values
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Metrics registry for the topology core
#[derive(Debug)]
pub struct TopologyMetrics {
    pub assign_requests: Counter,
    pub assign_failures: Counter,
    pub file_ids_granted: Counter,
    pub volumes_grown: Counter,
    pub nodes_registered: Counter,
    pub nodes_unregistered: Counter,
    pub nodes_dead: Counter,
    pub nodes_recovered: Counter,
    pub volumes_full: Counter,
    pub sequence_persists: Counter,

    /// Highest volume id seen in the cluster
    pub max_volume_id: Gauge,

    start_time: Instant,
}

impl TopologyMetrics {
    pub fn new() -> Self {
        Self {
            assign_requests: Counter::new(),
            assign_failures: Counter::new(),
            file_ids_granted: Counter::new(),
            volumes_grown: Counter::new(),
            nodes_registered: Counter::new(),
            nodes_unregistered: Counter::new(),
            nodes_dead: Counter::new(),
            nodes_recovered: Counter::new(),
            volumes_full: Counter::new(),
            sequence_persists: Counter::new(),
            max_volume_id: Gauge::new(),
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        use std::fmt::Write;

        let series: [(&str, &str, &str, u64); 12] = [
            (
                "assign_requests_total",
                "counter",
                "Write assignments requested",
                self.assign_requests.get(),
            ),
            (
                "assign_failures_total",
                "counter",
                "Write assignments that failed",
                self.assign_failures.get(),
            ),
            (
                "file_ids_granted_total",
                "counter",
                "File ids handed out",
                self.file_ids_granted.get(),
            ),
            (
                "volumes_grown_total",
                "counter",
                "Volumes allocated by growth",
                self.volumes_grown.get(),
            ),
            (
                "nodes_registered_total",
                "counter",
                "Data nodes created",
                self.nodes_registered.get(),
            ),
            (
                "nodes_unregistered_total",
                "counter",
                "Data nodes evicted",
                self.nodes_unregistered.get(),
            ),
            (
                "nodes_dead_total",
                "counter",
                "Dead data node transitions",
                self.nodes_dead.get(),
            ),
            (
                "nodes_recovered_total",
                "counter",
                "Recovered data node transitions",
                self.nodes_recovered.get(),
            ),
            (
                "volumes_full_total",
                "counter",
                "Volumes marked full",
                self.volumes_full.get(),
            ),
            (
                "sequence_persists_total",
                "counter",
                "Durable sequence writes",
                self.sequence_persists.get(),
            ),
            (
                "max_volume_id",
                "gauge",
                "Highest volume id seen",
                self.max_volume_id.get(),
            ),
            (
                "uptime_seconds",
                "gauge",
                "Master uptime in seconds",
                self.uptime_seconds(),
            ),
        ];

        let mut out = String::new();
        for (name, kind, help, value) in series {
            let _ = writeln!(out, "# HELP blobmaster_{} {}", name, help);
            let _ = writeln!(out, "# TYPE blobmaster_{} {}", name, kind);
            let _ = writeln!(out, "blobmaster_{} {}", name, value);
        }
        out
    }
}

impl Default for TopologyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance
pub static METRICS: once_cell::sync::Lazy<TopologyMetrics> =
    once_cell::sync::Lazy::new(TopologyMetrics::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();

        assert_eq!(counter.get(), 0);
        counter.inc();
        assert_eq!(counter.get(), 1);
        counter.add(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new();
        gauge.set(10);
        assert_eq!(gauge.get(), 10);
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = TopologyMetrics::new();
        metrics.assign_requests.add(3);
        metrics.max_volume_id.set(42);

        let out = metrics.to_prometheus();
        assert!(out.contains("# TYPE blobmaster_assign_requests_total counter"));
        assert!(out.contains("blobmaster_assign_requests_total 3"));
        assert!(out.contains("blobmaster_max_volume_id 42"));
    }
}
