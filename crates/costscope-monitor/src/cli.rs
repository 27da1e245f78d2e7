//! CLI tool detector.
//!
//! Runs after the desktop detector in the same cycle. Every PID claimed by
//! the desktop detector is skipped before matching; without a registry the
//! detector falls back to refusing processes named like a desktop app.

use costscope_core::metrics::{cli_labels, cli_running_labels, Counter};
use costscope_core::models::catalog::CatalogEntry;
use costscope_core::models::platform::HostOs;
use costscope_core::models::process::ProcessInfo;
use costscope_core::ports::metrics::MetricSink;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::dedup::Dedup;
use crate::matcher::MatchIndex;
use crate::running::{RunningSet, Snapshot};
use crate::state::DetectorState;

/// Detector for AI command-line tools.
pub struct CliDetector {
    tools: Vec<CatalogEntry>,
    index: MatchIndex,
    /// Lowercased desktop process names for name-based dedup
    desktop_names: HashSet<String>,
    sink: Arc<dyn MetricSink>,
    states: BTreeMap<usize, DetectorState>,
    running: RunningSet,
}

impl CliDetector {
    /// `desktop_names` is only consulted under [`Dedup::Names`].
    pub fn new(
        tools: Vec<CatalogEntry>,
        desktop_names: HashSet<String>,
        os: HostOs,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        let index = MatchIndex::new(&tools, os);
        Self {
            tools,
            index,
            desktop_names,
            sink,
            states: BTreeMap::new(),
            running: RunningSet::new(),
        }
    }

    /// Handle to the running-tool snapshot for the gauge observer
    pub fn running_set(&self) -> RunningSet {
        self.running.clone()
    }

    /// Run one cycle. Returns the PIDs attributed to each tool name.
    pub fn scan(
        &mut self,
        processes: &[ProcessInfo],
        dedup: Dedup<'_>,
        now: Instant,
    ) -> BTreeMap<String, HashSet<u32>> {
        let mut found: BTreeMap<usize, HashSet<u32>> = BTreeMap::new();

        for process in processes {
            if process.name.is_empty() {
                continue;
            }
            let skip = match dedup {
                Dedup::Pids(registry) => registry.is_claimed(process.pid),
                Dedup::Names => self.desktop_names.contains(&process.name.to_lowercase()),
            };
            if skip {
                continue;
            }
            if let Some(hit) = self.index.classify(process) {
                found.entry(hit.index).or_default().insert(process.pid);
            }
        }

        let mut known: BTreeSet<usize> = self.states.keys().copied().collect();
        known.extend(found.keys().copied());

        let mut snapshot = Snapshot::new();
        let mut attributed = BTreeMap::new();

        for index in known {
            let tool = &self.tools[index];
            let labels = cli_labels(tool);
            let pids = found.remove(&index);
            let is_running = pids.is_some();
            let state = self.states.entry(index).or_default();

            if is_running && !state.was_running {
                info!("AI CLI tool detected: {} (pids {:?})", tool.name, pids);
            } else if !is_running && state.was_running {
                info!("AI CLI tool stopped: {}", tool.name);
            }

            if is_running {
                if let Some(elapsed) = state.elapsed_since_last(now) {
                    self.sink.add(Counter::CliActiveDuration, elapsed, &labels);
                    if tool.cost_per_hour > 0.0 {
                        let cost = tool.cost_per_hour * (elapsed / 3600.0);
                        self.sink.add(Counter::CliEstimatedCost, cost, &labels);
                    }
                }
                snapshot.insert(tool.name.clone(), cli_running_labels(tool, None));
            }

            let pids = pids.unwrap_or_default();
            if is_running {
                attributed.insert(tool.name.clone(), pids.clone());
            }
            state.pids = pids;
            state.was_running = is_running;
            state.last_scan = Some(now);
        }

        self.running.replace(snapshot);
        attributed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DedupRegistry;
    use crate::matcher::tests::entry;
    use costscope_core::metrics::InMemorySink;
    use std::time::Duration;

    fn detector(desktop_names: &[&str]) -> (CliDetector, Arc<InMemorySink>) {
        let sink = Arc::new(InMemorySink::new());
        let tools = vec![
            entry("ollama", &["ollama"], &[], &[]),
            entry("aider", &[], &[], &["aider"]),
        ];
        let names = desktop_names.iter().map(|s| s.to_lowercase()).collect();
        (
            CliDetector::new(tools, names, HostOs::Macos, sink.clone()),
            sink,
        )
    }

    #[test]
    fn claimed_pids_are_never_attributed() {
        let (mut det, _) = detector(&[]);
        let procs = vec![
            ProcessInfo::named(100, "ollama"),
            ProcessInfo::named(200, "ollama"),
        ];
        let registry: DedupRegistry = [100].into_iter().collect();

        let result = det.scan(&procs, Dedup::Pids(&registry), Instant::now());
        let pids = &result["ollama"];
        assert!(!pids.contains(&100));
        assert!(pids.contains(&200));
    }

    #[test]
    fn pid_dedup_keeps_same_named_cli_binary() {
        // desktop app and CLI share the literal name "ollama"
        let (mut det, _) = detector(&["Ollama"]);
        let procs = vec![ProcessInfo::named(200, "ollama")];
        let registry = DedupRegistry::new();

        let result = det.scan(&procs, Dedup::Pids(&registry), Instant::now());
        assert!(result.contains_key("ollama"));
    }

    #[test]
    fn name_fallback_refuses_desktop_names_case_insensitively() {
        let (mut det, _) = detector(&["Ollama"]);
        let procs = vec![ProcessInfo::named(200, "ollama")];

        let result = det.scan(&procs, Dedup::Names, Instant::now());
        assert!(result.is_empty());
        assert!(det.running_set().is_empty());
    }

    #[test]
    fn name_fallback_guards_every_tier() {
        let (mut det, _) = detector(&["python3"]);
        let mut script = ProcessInfo::named(300, "python3");
        script.cmdline = vec!["python3".into(), "/usr/bin/aider".into()];

        assert!(det.scan(&[script.clone()], Dedup::Names, Instant::now()).is_empty());

        let registry = DedupRegistry::new();
        let result = det.scan(&[script], Dedup::Pids(&registry), Instant::now());
        assert!(result.contains_key("aider"));
    }

    #[test]
    fn duration_accrues_while_running() {
        let (mut det, sink) = detector(&[]);
        let labels = cli_labels(&entry("ollama", &["ollama"], &[], &[]));
        let registry = DedupRegistry::new();
        let procs = vec![ProcessInfo::named(1, "ollama")];
        let t0 = Instant::now();

        det.scan(&procs, Dedup::Pids(&registry), t0);
        det.scan(&procs, Dedup::Pids(&registry), t0 + Duration::from_secs(15));
        det.scan(&[], Dedup::Pids(&registry), t0 + Duration::from_secs(30));

        assert_eq!(sink.counter(Counter::CliActiveDuration, &labels), 15.0);
        assert_eq!(sink.counter_adds(Counter::CliEstimatedCost).len(), 1);
        assert!(det.running_set().is_empty());
    }

    #[test]
    fn running_labels_mark_native_environment() {
        let (mut det, _) = detector(&[]);
        let registry = DedupRegistry::new();
        det.scan(
            &[ProcessInfo::named(1, "ollama")],
            Dedup::Pids(&registry),
            Instant::now(),
        );
        let snapshot = det.running_set().snapshot();
        assert_eq!(snapshot["ollama"]["runtime_environment"], "");
    }
}
