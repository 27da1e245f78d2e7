//! Crash-safe running-state gauges.
//!
//! Detectors publish only what is running right now into a [`RunningSet`].
//! The sink calls [`RunningStateGauge::observe`] at export time, which
//! reports `1` for every current entity and a single `0` for entities that
//! disappeared since the previous export. Nothing is accumulated, so a
//! restart re-converges on the next scan.

use costscope_core::metrics::Labels;
use costscope_core::ports::metrics::{GaugeObserver, Observation};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Snapshot key to label set
pub type Snapshot = BTreeMap<String, Labels>;

/// Shared handle to one detector's current-cycle snapshot.
#[derive(Debug, Clone, Default)]
pub struct RunningSet {
    inner: Arc<RwLock<Snapshot>>,
}

impl RunningSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot wholesale with this cycle's result
    pub fn replace(&self, snapshot: Snapshot) {
        *self.inner.write() = snapshot;
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Observer merging one or more [`RunningSet`]s into a single gauge.
pub struct RunningStateGauge {
    sources: Vec<RunningSet>,
    previous: Mutex<Snapshot>,
}

impl RunningStateGauge {
    pub fn new(sources: Vec<RunningSet>) -> Self {
        Self {
            sources,
            previous: Mutex::new(Snapshot::new()),
        }
    }
}

impl GaugeObserver for RunningStateGauge {
    fn observe(&self) -> Vec<Observation> {
        let mut current = Snapshot::new();
        for source in &self.sources {
            current.extend(source.snapshot());
        }

        let mut previous = self.previous.lock();
        let mut observations: Vec<Observation> = current
            .values()
            .map(|labels| Observation {
                labels: labels.clone(),
                value: 1.0,
            })
            .collect();
        observations.extend(
            previous
                .iter()
                .filter(|(key, _)| !current.contains_key(*key))
                .map(|(_, labels)| Observation {
                    labels: labels.clone(),
                    value: 0.0,
                }),
        );

        *previous = current;
        observations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costscope_core::metrics::label;

    fn labels(name: &str) -> Labels {
        Labels::from([(label::CLI_NAME, name.to_string())])
    }

    fn snapshot(names: &[&str]) -> Snapshot {
        names
            .iter()
            .map(|n| (n.to_string(), labels(n)))
            .collect()
    }

    fn values(obs: &[Observation], name: &str) -> Vec<f64> {
        obs.iter()
            .filter(|o| o.labels[label::CLI_NAME] == name)
            .map(|o| o.value)
            .collect()
    }

    #[test]
    fn running_entities_report_one() {
        let set = RunningSet::new();
        set.replace(snapshot(&["ollama", "aider"]));
        let gauge = RunningStateGauge::new(vec![set]);

        let obs = gauge.observe();
        assert_eq!(values(&obs, "ollama"), vec![1.0]);
        assert_eq!(values(&obs, "aider"), vec![1.0]);
    }

    #[test]
    fn disappearance_emits_exactly_one_zero() {
        let set = RunningSet::new();
        let gauge = RunningStateGauge::new(vec![set.clone()]);

        set.replace(snapshot(&["ollama"]));
        assert_eq!(values(&gauge.observe(), "ollama"), vec![1.0]);

        set.replace(Snapshot::new());
        assert_eq!(values(&gauge.observe(), "ollama"), vec![0.0]);

        // no repeated zero afterwards
        assert!(gauge.observe().is_empty());
        assert!(gauge.observe().is_empty());
    }

    #[test]
    fn merges_multiple_sources() {
        let native = RunningSet::new();
        let wsl = RunningSet::new();
        native.replace(snapshot(&["claude"]));
        wsl.replace(snapshot(&["claude:wsl:Ubuntu"]));
        let gauge = RunningStateGauge::new(vec![native, wsl.clone()]);

        assert_eq!(gauge.observe().len(), 2);

        wsl.replace(Snapshot::new());
        let obs = gauge.observe();
        assert_eq!(obs.iter().filter(|o| o.value == 1.0).count(), 1);
        assert_eq!(obs.iter().filter(|o| o.value == 0.0).count(), 1);
    }

    #[test]
    fn fresh_gauge_has_nothing_to_replay() {
        let set = RunningSet::new();
        let gauge = RunningStateGauge::new(vec![set]);
        assert!(gauge.observe().is_empty());
    }
}
