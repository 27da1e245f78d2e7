//! Desktop app detector.
//!
//! Runs first in every coordinator cycle. Classifies processes against the
//! `ai_apps` catalog, claims their PIDs, credits foreground dwell time and
//! cost, and sets CPU/memory gauges per app.

use costscope_core::metrics::{app_labels, Counter, Gauge};
use costscope_core::models::catalog::CatalogEntry;
use costscope_core::models::platform::HostOs;
use costscope_core::models::process::ProcessInfo;
use costscope_core::ports::metrics::MetricSink;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::dedup::DedupRegistry;
use crate::matcher::MatchIndex;
use crate::running::{RunningSet, Snapshot};
use crate::state::DetectorState;

#[derive(Debug, Default, Clone, Copy)]
struct Usage {
    cpu_percent: f64,
    memory_mb: f64,
}

/// Detector for GUI and background AI apps.
pub struct DesktopDetector {
    apps: Vec<CatalogEntry>,
    index: MatchIndex,
    os: HostOs,
    sink: Arc<dyn MetricSink>,
    states: BTreeMap<usize, DetectorState>,
    /// PIDs whose first CPU sample has been discarded
    primed: HashSet<u32>,
    running: RunningSet,
}

impl DesktopDetector {
    pub fn new(apps: Vec<CatalogEntry>, os: HostOs, sink: Arc<dyn MetricSink>) -> Self {
        let index = MatchIndex::new(&apps, os);
        Self {
            apps,
            index,
            os,
            sink,
            states: BTreeMap::new(),
            primed: HashSet::new(),
            running: RunningSet::new(),
        }
    }

    /// Handle to the running-app snapshot for the gauge observer
    pub fn running_set(&self) -> RunningSet {
        self.running.clone()
    }

    /// Run one cycle and return the PIDs claimed by desktop apps.
    pub fn scan(
        &mut self,
        processes: &[ProcessInfo],
        foreground: Option<&str>,
        now: Instant,
    ) -> DedupRegistry {
        let mut found: BTreeMap<usize, HashSet<u32>> = BTreeMap::new();
        let mut usage: BTreeMap<usize, Usage> = BTreeMap::new();

        for process in processes {
            if process.name.is_empty() {
                continue;
            }
            let Some(hit) = self.index.classify(process) else {
                continue;
            };
            found.entry(hit.index).or_default().insert(process.pid);

            // first sample of a PID has no baseline
            let cpu = if self.primed.insert(process.pid) {
                0.0
            } else {
                f64::from(process.cpu_percent)
            };
            let entry = usage.entry(hit.index).or_default();
            entry.cpu_percent += cpu;
            entry.memory_mb += process.memory_mb();
        }

        let registry: DedupRegistry = found.values().flatten().copied().collect();
        self.primed.retain(|pid| registry.is_claimed(*pid));

        let mut known: BTreeSet<usize> = self.states.keys().copied().collect();
        known.extend(found.keys().copied());

        let mut snapshot = Snapshot::new();
        for index in known {
            let app = &self.apps[index];
            let labels = app_labels(app);
            let pids = found.remove(&index);
            let is_running = pids.is_some();
            let state = self.states.entry(index).or_default();

            if is_running && !state.was_running {
                info!("AI app detected: {} (pids {:?})", app.name, pids);
            } else if !is_running && state.was_running {
                info!("AI app stopped: {}", app.name);
            }

            let is_foreground = is_running
                && foreground.is_some_and(|fg| {
                    app.rule
                        .process_names
                        .for_os(self.os)
                        .iter()
                        .any(|name| name.eq_ignore_ascii_case(fg))
                });

            if is_foreground {
                if let Some(elapsed) = state.elapsed_since_last(now) {
                    self.sink.add(Counter::AppActiveDuration, elapsed, &labels);
                    if app.cost_per_hour > 0.0 {
                        let cost = app.cost_per_hour * (elapsed / 3600.0);
                        self.sink.add(Counter::AppEstimatedCost, cost, &labels);
                    }
                    debug!("{} foreground for {elapsed:.1}s", app.name);
                }
            }

            if let Some(u) = usage.get(&index) {
                self.sink.set(Gauge::AppCpuUsage, u.cpu_percent, &labels);
                self.sink.set(Gauge::AppMemoryUsage, u.memory_mb, &labels);
            }

            if is_running {
                snapshot.insert(app.name.clone(), labels);
            }

            state.pids = pids.unwrap_or_default();
            state.was_running = is_running;
            state.was_foreground = is_foreground;
            state.last_scan = Some(now);
        }

        self.running.replace(snapshot);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::tests::entry;
    use costscope_core::metrics::InMemorySink;
    use std::time::Duration;

    fn process(pid: u32, name: &str, cpu: f32) -> ProcessInfo {
        ProcessInfo {
            pid,
            name: name.to_string(),
            cpu_percent: cpu,
            memory_bytes: 100 * 1024 * 1024,
            ..ProcessInfo::default()
        }
    }

    fn detector() -> (DesktopDetector, Arc<InMemorySink>) {
        let sink = Arc::new(InMemorySink::new());
        let apps = vec![
            entry("Cursor", &["Cursor"], &[], &[]),
            entry("ChatGPT", &["ChatGPT"], &[], &[]),
        ];
        (
            DesktopDetector::new(apps, HostOs::Macos, sink.clone()),
            sink,
        )
    }

    #[test]
    fn claims_every_matched_pid() {
        let (mut det, _) = detector();
        let procs = vec![
            process(10, "Cursor", 1.0),
            process(11, "Cursor", 1.0),
            process(12, "bash", 1.0),
        ];
        let registry = det.scan(&procs, None, Instant::now());
        assert!(registry.is_claimed(10));
        assert!(registry.is_claimed(11));
        assert!(!registry.is_claimed(12));
        assert!(det.running_set().contains("Cursor"));
    }

    #[test]
    fn foreground_dwell_needs_a_previous_scan() {
        let (mut det, sink) = detector();
        let labels = app_labels(&entry("Cursor", &["Cursor"], &[], &[]));
        let t0 = Instant::now();
        let procs = vec![process(10, "Cursor", 0.0)];

        det.scan(&procs, Some("cursor"), t0);
        assert_eq!(sink.counter(Counter::AppActiveDuration, &labels), 0.0);

        det.scan(&procs, Some("cursor"), t0 + Duration::from_secs(15));
        assert_eq!(sink.counter(Counter::AppActiveDuration, &labels), 15.0);
        let expected_cost = 0.36 * 15.0 / 3600.0;
        assert!((sink.counter(Counter::AppEstimatedCost, &labels) - expected_cost).abs() < 1e-12);
    }

    #[test]
    fn background_app_gets_no_dwell() {
        let (mut det, sink) = detector();
        let t0 = Instant::now();
        let procs = vec![process(10, "Cursor", 0.0)];
        det.scan(&procs, Some("Terminal"), t0);
        det.scan(&procs, Some("Terminal"), t0 + Duration::from_secs(15));
        assert_eq!(sink.counter_total(Counter::AppActiveDuration), 0.0);
    }

    #[test]
    fn first_cpu_sample_is_discarded() {
        let (mut det, sink) = detector();
        let labels = app_labels(&entry("Cursor", &["Cursor"], &[], &[]));
        let procs = vec![process(10, "Cursor", 40.0)];

        det.scan(&procs, None, Instant::now());
        assert_eq!(sink.gauge(Gauge::AppCpuUsage, &labels), Some(0.0));
        assert_eq!(sink.gauge(Gauge::AppMemoryUsage, &labels), Some(100.0));

        det.scan(&procs, None, Instant::now());
        assert_eq!(sink.gauge(Gauge::AppCpuUsage, &labels), Some(40.0));
    }

    #[test]
    fn primed_pids_follow_claims() {
        let (mut det, _) = detector();
        det.scan(&[process(10, "Cursor", 5.0)], None, Instant::now());
        det.scan(&[], None, Instant::now());
        assert!(det.primed.is_empty());
    }

    #[test]
    fn stopped_app_leaves_running_set() {
        let (mut det, _) = detector();
        det.scan(&[process(10, "ChatGPT", 0.0)], None, Instant::now());
        assert!(det.running_set().contains("ChatGPT"));
        det.scan(&[], None, Instant::now());
        assert!(det.running_set().is_empty());
        assert!(!det.states[&1].was_running);
    }
}
