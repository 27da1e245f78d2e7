//! Prometheus-backed [`MetricSink`].
//!
//! Counters and gauges are plain prometheus vectors. Running-state gauges
//! have no stored value: their observers are invoked on every render, so a
//! scrape is the export point that drives the stop-transition zeros.

use costscope_core::metrics::{Counter, Gauge, Labels, RunningGauge};
use costscope_core::ports::metrics::{GaugeObserver, MetricSink};
use parking_lot::Mutex;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Registry of every costscope instrument.
pub struct PrometheusSink {
    registry: Registry,
    counters: HashMap<Counter, CounterVec>,
    gauges: HashMap<Gauge, GaugeVec>,
    running: HashMap<RunningGauge, GaugeVec>,
    observers: Mutex<Vec<(RunningGauge, Arc<dyn GaugeObserver>)>>,
    /// Serializes reset, observe and gather across concurrent scrapes
    render_lock: Mutex<()>,
}

impl PrometheusSink {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let mut counters = HashMap::new();
        for counter in Counter::ALL {
            let vec = CounterVec::new(
                Opts::new(counter.name(), counter.help()),
                counter.label_keys(),
            )?;
            registry.register(Box::new(vec.clone()))?;
            counters.insert(counter, vec);
        }

        let mut gauges = HashMap::new();
        for gauge in Gauge::ALL {
            let vec = GaugeVec::new(Opts::new(gauge.name(), gauge.help()), gauge.label_keys())?;
            registry.register(Box::new(vec.clone()))?;
            gauges.insert(gauge, vec);
        }

        let mut running = HashMap::new();
        for gauge in RunningGauge::ALL {
            let vec = GaugeVec::new(Opts::new(gauge.name(), gauge.help()), gauge.label_keys())?;
            registry.register(Box::new(vec.clone()))?;
            running.insert(gauge, vec);
        }

        Ok(Self {
            registry,
            counters,
            gauges,
            running,
            observers: Mutex::new(Vec::new()),
            render_lock: Mutex::new(()),
        })
    }

    /// Run every observer, then encode the registry in the text exposition
    /// format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let _render = self.render_lock.lock();
        for vec in self.running.values() {
            vec.reset();
        }
        let observers = self.observers.lock().clone();
        for (gauge, observer) in observers {
            let Some(vec) = self.running.get(&gauge) else {
                continue;
            };
            for obs in observer.observe() {
                let values = label_values(gauge.label_keys(), &obs.labels);
                match vec.get_metric_with_label_values(&values) {
                    Ok(series) => series.set(obs.value),
                    Err(e) => warn!("{}: {e}", gauge.name()),
                }
            }
        }

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl MetricSink for PrometheusSink {
    fn add(&self, counter: Counter, value: f64, labels: &Labels) {
        if !value.is_finite() || value < 0.0 {
            warn!("{}: dropping invalid increment {value}", counter.name());
            return;
        }
        let Some(vec) = self.counters.get(&counter) else {
            return;
        };
        match vec.get_metric_with_label_values(&label_values(counter.label_keys(), labels)) {
            Ok(series) => series.inc_by(value),
            Err(e) => warn!("{}: {e}", counter.name()),
        }
    }

    fn set(&self, gauge: Gauge, value: f64, labels: &Labels) {
        let Some(vec) = self.gauges.get(&gauge) else {
            return;
        };
        match vec.get_metric_with_label_values(&label_values(gauge.label_keys(), labels)) {
            Ok(series) => series.set(value),
            Err(e) => warn!("{}: {e}", gauge.name()),
        }
    }

    fn register_observer(&self, gauge: RunningGauge, observer: Arc<dyn GaugeObserver>) {
        self.observers.lock().push((gauge, observer));
    }
}

/// Values in `keys` order; absent labels render as the empty string.
fn label_values<'a>(keys: &[&str], labels: &'a Labels) -> Vec<&'a str> {
    keys.iter()
        .map(|key| labels.get(*key).map_or("", String::as_str))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use costscope_core::metrics::{label, token_labels};
    use costscope_core::ports::metrics::Observation;

    struct Flip(Mutex<Vec<Vec<Observation>>>);

    impl GaugeObserver for Flip {
        fn observe(&self) -> Vec<Observation> {
            self.0.lock().pop().unwrap_or_default()
        }
    }

    fn cli_obs(name: &str, value: f64) -> Observation {
        Observation {
            labels: Labels::from([
                (label::CLI_NAME, name.to_string()),
                (label::CLI_CATEGORY, "code".to_string()),
            ]),
            value,
        }
    }

    #[test]
    fn counters_render_with_labels() {
        let sink = PrometheusSink::new().unwrap();
        sink.add(Counter::TokensInput, 100.0, &token_labels("claude-code", "claude-sonnet-4"));
        sink.add(Counter::TokensInput, 50.0, &token_labels("claude-code", "claude-sonnet-4"));

        let text = sink.render().unwrap();
        assert!(text.contains(Counter::TokensInput.name()));
        assert!(text.contains(r#"model_name="claude-sonnet-4""#));
        assert!(text.contains(" 150"));
    }

    #[test]
    fn negative_increment_is_dropped() {
        let sink = PrometheusSink::new().unwrap();
        sink.add(Counter::TokensCost, -1.0, &token_labels("a", "b"));
        sink.add(Counter::TokensCost, f64::NAN, &token_labels("a", "b"));
        assert!(!sink.render().unwrap().contains(r#"tool_name="a""#));
    }

    #[test]
    fn running_gauge_is_observed_per_render() {
        let sink = PrometheusSink::new().unwrap();
        // popped from the back: first render sees running, second the stop
        let observer = Arc::new(Flip(Mutex::new(vec![
            vec![cli_obs("ollama", 0.0)],
            vec![cli_obs("ollama", 1.0)],
        ])));
        sink.register_observer(RunningGauge::Cli, observer);

        let first = sink.render().unwrap();
        assert_eq!(ollama_line(&first).as_deref().map(|l| l.ends_with(" 1")), Some(true));

        let second = sink.render().unwrap();
        assert_eq!(ollama_line(&second).as_deref().map(|l| l.ends_with(" 0")), Some(true));

        let third = sink.render().unwrap();
        assert_eq!(ollama_line(&third), None);
    }

    struct Steady;

    impl GaugeObserver for Steady {
        fn observe(&self) -> Vec<Observation> {
            vec![cli_obs("ollama", 1.0)]
        }
    }

    #[test]
    fn concurrent_renders_each_see_observed_series() {
        let sink = Arc::new(PrometheusSink::new().unwrap());
        sink.register_observer(RunningGauge::Cli, Arc::new(Steady));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let text = sink.render().unwrap();
                        let line = ollama_line(&text);
                        assert_eq!(line.as_deref().map(|l| l.ends_with(" 1")), Some(true));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn label_values_follow_key_order_and_fill_gaps() {
        let labels = Labels::from([(label::CLI_NAME, "aider".to_string())]);
        let keys = [label::CLI_CATEGORY, label::CLI_NAME];
        assert_eq!(label_values(&keys, &labels), vec!["", "aider"]);
    }

    fn ollama_line(text: &str) -> Option<String> {
        text.lines()
            .find(|l| l.starts_with("ai_cli_running{") && l.contains(r#"cli_name="ollama""#))
            .map(str::to_string)
    }
}
