//! Browser history scanner.
//!
//! Reads each browser's history database for visits to tracked AI domains
//! since the previous successful read, estimates dwell time per domain with
//! the session model, and emits visit, duration and cost counters.
//!
//! # Modules
//! - `epoch`: per-family timestamp normalization
//! - `session`: session-based duration estimate
//! - `domain`: URL to catalog domain matching
//! - `sources`: database discovery and private-copy reads

pub mod domain;
pub mod epoch;
pub mod session;
pub mod sources;

use costscope_core::metrics::{browser_labels, domain_cost_labels, Counter};
use costscope_core::models::catalog::DomainEntry;
use costscope_core::ports::clock::Clock;
use costscope_core::ports::metrics::MetricSink;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::source::SourceRead;
use domain::match_domain;
use session::estimate_duration;
use sources::{read_visits, BrowserSource, Visit};

/// `usage_source` label value for history-derived series
pub const HISTORY_USAGE_SOURCE: &str = "history_parser";

/// Incremental browser history scanner.
pub struct BrowserHistoryScanner {
    domains: Vec<DomainEntry>,
    sources: Vec<BrowserSource>,
    sink: Arc<dyn MetricSink>,
    clock: Arc<dyn Clock>,
    /// Cursor for browsers that have not been read successfully yet
    default_since: f64,
    /// Per-browser cursor in Unix seconds
    cursors: HashMap<String, f64>,
}

impl BrowserHistoryScanner {
    /// Cursors start at the current time, so history from before the
    /// process started is never counted.
    pub fn new(
        domains: Vec<DomainEntry>,
        sources: Vec<BrowserSource>,
        sink: Arc<dyn MetricSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let default_since = clock.now_unix();
        Self {
            domains,
            sources,
            sink,
            clock,
            default_since,
            cursors: HashMap::new(),
        }
    }

    pub fn cursor(&self, browser: &str) -> f64 {
        self.cursors
            .get(browser)
            .copied()
            .unwrap_or(self.default_since)
    }

    /// Read every browser once. Returns the number of matched visits.
    pub fn scan(&mut self) -> usize {
        let mut matched = 0;

        for source in &self.sources {
            let since = self
                .cursors
                .get(&source.name)
                .copied()
                .unwrap_or(self.default_since);
            let started = self.clock.now_unix();

            match read_visits(source, since) {
                SourceRead::Rows(visits) => {
                    matched += self.record(&visits, &source.name);
                    self.cursors.insert(source.name.clone(), started);
                }
                SourceRead::Skipped(reason) if reason.is_transient() => {
                    warn!("{} history skipped: {reason}", source.name);
                }
                SourceRead::Skipped(reason) => {
                    debug!("{} history skipped: {reason}", source.name);
                }
            }
        }
        matched
    }

    fn record(&self, visits: &[Visit], browser: &str) -> usize {
        let mut by_domain: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
        for visit in visits {
            if let Some(index) = match_domain(&visit.url, &self.domains) {
                by_domain.entry(index).or_default().push(visit.visited_at);
            }
        }

        let mut matched = 0;
        for (index, timestamps) in by_domain {
            let entry = &self.domains[index];
            let labels = browser_labels(entry, browser, HISTORY_USAGE_SOURCE);
            self.sink
                .add(Counter::BrowserVisitCount, timestamps.len() as f64, &labels);

            let duration = estimate_duration(&timestamps);
            if duration > 0.0 {
                self.sink
                    .add(Counter::BrowserActiveDuration, duration, &labels);
                if entry.cost_per_hour > 0.0 {
                    let cost = entry.cost_per_hour * (duration / 3600.0);
                    self.sink
                        .add(Counter::BrowserEstimatedCost, cost, &domain_cost_labels(entry));
                }
            }
            debug!(
                "browser history: {} {} visits, {duration:.0}s estimated ({browser})",
                entry.domain,
                timestamps.len()
            );
            matched += timestamps.len();
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costscope_core::metrics::InMemorySink;
    use epoch::BrowserFamily;
    use std::sync::Mutex;
    use std::time::Instant;
    use tempfile::TempDir;

    struct FixedClock(Mutex<f64>);

    impl Clock for FixedClock {
        fn now_unix(&self) -> f64 {
            *self.0.lock().unwrap()
        }

        fn now(&self) -> Instant {
            Instant::now()
        }
    }

    fn domain(domain: &str, rate: f64) -> DomainEntry {
        DomainEntry {
            domain: domain.to_string(),
            name: domain.to_string(),
            category: "chat".to_string(),
            cost_per_hour: rate,
        }
    }

    #[test]
    fn counts_visits_duration_and_cost() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("History");
        sources::tests::chromium_db(
            &db,
            &[
                ("https://claude.ai/chat/1", 10_000.0),
                ("https://claude.ai/chat/2", 10_120.0),
                ("https://example.com/", 10_130.0),
            ],
        );

        let sink = Arc::new(InMemorySink::new());
        let clock = Arc::new(FixedClock(Mutex::new(9_000.0)));
        let mut scanner = BrowserHistoryScanner::new(
            vec![domain("claude.ai", 3.6)],
            vec![BrowserSource::new("chrome", &db, BrowserFamily::Chromium)],
            sink.clone(),
            clock.clone(),
        );

        assert_eq!(scanner.scan(), 2);
        let entry = domain("claude.ai", 3.6);
        let labels = browser_labels(&entry, "chrome", HISTORY_USAGE_SOURCE);
        assert_eq!(sink.counter(Counter::BrowserVisitCount, &labels), 2.0);
        let duration = sink.counter(Counter::BrowserActiveDuration, &labels);
        assert!((duration - 420.0).abs() < 1.0);
        let cost = sink.counter(Counter::BrowserEstimatedCost, &domain_cost_labels(&entry));
        assert!((cost - 0.42).abs() < 0.01);
    }

    #[test]
    fn cursor_advances_only_on_success() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("History");
        let sink = Arc::new(InMemorySink::new());
        let clock = Arc::new(FixedClock(Mutex::new(5_000.0)));
        let mut scanner = BrowserHistoryScanner::new(
            vec![domain("claude.ai", 0.0)],
            vec![BrowserSource::new("chrome", &db, BrowserFamily::Chromium)],
            sink.clone(),
            clock.clone(),
        );

        // database missing: cursor stays at process start
        *clock.0.lock().unwrap() = 6_000.0;
        scanner.scan();
        assert_eq!(scanner.cursor("chrome"), 5_000.0);

        sources::tests::chromium_db(&db, &[("https://claude.ai/", 5_500.0)]);
        *clock.0.lock().unwrap() = 7_000.0;
        assert_eq!(scanner.scan(), 1);
        assert_eq!(scanner.cursor("chrome"), 7_000.0);

        // the same visit is not counted twice
        assert_eq!(scanner.scan(), 0);
        assert_eq!(sink.counter_total(Counter::BrowserVisitCount), 1.0);
    }

    #[test]
    fn history_before_start_is_ignored() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("History");
        sources::tests::chromium_db(&db, &[("https://claude.ai/", 100.0)]);
        let sink = Arc::new(InMemorySink::new());
        let mut scanner = BrowserHistoryScanner::new(
            vec![domain("claude.ai", 1.0)],
            vec![BrowserSource::new("chrome", &db, BrowserFamily::Chromium)],
            sink.clone(),
            Arc::new(FixedClock(Mutex::new(200.0))),
        );
        assert_eq!(scanner.scan(), 0);
        assert_eq!(sink.add_count(), 0);
    }
}
