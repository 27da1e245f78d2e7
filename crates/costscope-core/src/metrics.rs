//! Metric instruments and label sets.
//!
//! The instrument names and label keys below are the contract with the
//! metrics backend. Every series of an instrument carries the full label
//! key set; optional labels are the empty string.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::catalog::{CatalogEntry, DomainEntry};
use crate::ports::metrics::{GaugeObserver, MetricSink, Observation};

/// Label keys.
pub mod label {
    pub const APP_NAME: &str = "app_name";
    pub const APP_CATEGORY: &str = "app_category";
    pub const APP_REQUIRES_PLUGIN: &str = "app_requires_plugin";
    pub const CLI_NAME: &str = "cli_name";
    pub const CLI_CATEGORY: &str = "cli_category";
    pub const RUNTIME_ENVIRONMENT: &str = "runtime_environment";
    pub const WSL_DISTRO: &str = "wsl_distro";
    pub const AI_DOMAIN: &str = "ai_domain";
    pub const AI_CATEGORY: &str = "ai_category";
    pub const BROWSER_NAME: &str = "browser_name";
    pub const USAGE_SOURCE: &str = "usage_source";
    pub const TOOL_NAME: &str = "tool_name";
    pub const MODEL_NAME: &str = "model_name";
    pub const SOURCE: &str = "source";
}

/// Ordered label set. Keys are the constants in [`label`].
pub type Labels = BTreeMap<&'static str, String>;

const APP_KEYS: &[&str] = &[
    label::APP_NAME,
    label::APP_CATEGORY,
    label::APP_REQUIRES_PLUGIN,
];
const CLI_KEYS: &[&str] = &[label::CLI_NAME, label::CLI_CATEGORY];
const CLI_RUNNING_KEYS: &[&str] = &[
    label::CLI_NAME,
    label::CLI_CATEGORY,
    label::RUNTIME_ENVIRONMENT,
    label::WSL_DISTRO,
];
const BROWSER_KEYS: &[&str] = &[
    label::AI_DOMAIN,
    label::AI_CATEGORY,
    label::BROWSER_NAME,
    label::USAGE_SOURCE,
];
const DOMAIN_COST_KEYS: &[&str] = &[label::AI_DOMAIN, label::AI_CATEGORY];
const TOKEN_KEYS: &[&str] = &[label::TOOL_NAME, label::MODEL_NAME];
const PROMPT_KEYS: &[&str] = &[label::TOOL_NAME, label::SOURCE];

/// Monotonic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Counter {
    AppActiveDuration,
    AppEstimatedCost,
    CliActiveDuration,
    CliEstimatedCost,
    CliCommandCount,
    BrowserVisitCount,
    BrowserActiveDuration,
    BrowserEstimatedCost,
    TokensInput,
    TokensOutput,
    TokensCost,
    PromptCount,
}

impl Counter {
    pub const ALL: [Counter; 12] = [
        Counter::AppActiveDuration,
        Counter::AppEstimatedCost,
        Counter::CliActiveDuration,
        Counter::CliEstimatedCost,
        Counter::CliCommandCount,
        Counter::BrowserVisitCount,
        Counter::BrowserActiveDuration,
        Counter::BrowserEstimatedCost,
        Counter::TokensInput,
        Counter::TokensOutput,
        Counter::TokensCost,
        Counter::PromptCount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::AppActiveDuration => "ai_app_active_duration_seconds",
            Counter::AppEstimatedCost => "ai_app_estimated_cost_usd",
            Counter::CliActiveDuration => "ai_cli_active_duration_seconds",
            Counter::CliEstimatedCost => "ai_cli_estimated_cost_usd",
            Counter::CliCommandCount => "ai_cli_command_count",
            Counter::BrowserVisitCount => "ai_browser_domain_visit_count",
            Counter::BrowserActiveDuration => "ai_browser_domain_active_duration_seconds",
            Counter::BrowserEstimatedCost => "ai_browser_domain_estimated_cost_usd",
            Counter::TokensInput => "ai_tokens_input",
            Counter::TokensOutput => "ai_tokens_output",
            Counter::TokensCost => "ai_tokens_cost_usd",
            Counter::PromptCount => "ai_prompt_count",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Counter::AppActiveDuration => "Foreground time of AI desktop apps in seconds",
            Counter::AppEstimatedCost => "Estimated cost of AI desktop app usage in USD",
            Counter::CliActiveDuration => "Run time of AI CLI tools in seconds",
            Counter::CliEstimatedCost => "Estimated cost of AI CLI tool usage in USD",
            Counter::CliCommandCount => "AI CLI commands found in shell history",
            Counter::BrowserVisitCount => "Visits to AI web domains",
            Counter::BrowserActiveDuration => "Estimated active time on AI web domains in seconds",
            Counter::BrowserEstimatedCost => "Estimated cost of AI web domain usage in USD",
            Counter::TokensInput => "Input tokens consumed",
            Counter::TokensOutput => "Output tokens produced",
            Counter::TokensCost => "Estimated token cost in USD",
            Counter::PromptCount => "Prompts sent to AI models",
        }
    }

    pub fn label_keys(self) -> &'static [&'static str] {
        match self {
            Counter::AppActiveDuration | Counter::AppEstimatedCost => APP_KEYS,
            Counter::CliActiveDuration | Counter::CliEstimatedCost | Counter::CliCommandCount => {
                CLI_KEYS
            }
            Counter::BrowserVisitCount | Counter::BrowserActiveDuration => BROWSER_KEYS,
            Counter::BrowserEstimatedCost => DOMAIN_COST_KEYS,
            Counter::TokensInput | Counter::TokensOutput | Counter::TokensCost => TOKEN_KEYS,
            Counter::PromptCount => PROMPT_KEYS,
        }
    }
}

/// Instantaneous gauges set by the detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gauge {
    AppCpuUsage,
    AppMemoryUsage,
}

impl Gauge {
    pub const ALL: [Gauge; 2] = [Gauge::AppCpuUsage, Gauge::AppMemoryUsage];

    pub fn name(self) -> &'static str {
        match self {
            Gauge::AppCpuUsage => "ai_app_cpu_usage_percent",
            Gauge::AppMemoryUsage => "ai_app_memory_usage_mb",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Gauge::AppCpuUsage => "CPU usage of AI desktop apps in percent",
            Gauge::AppMemoryUsage => "Resident memory of AI desktop apps in MiB",
        }
    }

    pub fn label_keys(self) -> &'static [&'static str] {
        APP_KEYS
    }
}

/// "Is running" gauges whose value is computed by a [`GaugeObserver`] at
/// export time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RunningGauge {
    App,
    Cli,
}

impl RunningGauge {
    pub const ALL: [RunningGauge; 2] = [RunningGauge::App, RunningGauge::Cli];

    pub fn name(self) -> &'static str {
        match self {
            RunningGauge::App => "ai_app_running",
            RunningGauge::Cli => "ai_cli_running",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            RunningGauge::App => "1 while an AI desktop app is running",
            RunningGauge::Cli => "1 while an AI CLI tool is running",
        }
    }

    pub fn label_keys(self) -> &'static [&'static str] {
        match self {
            RunningGauge::App => APP_KEYS,
            RunningGauge::Cli => CLI_RUNNING_KEYS,
        }
    }
}

/// Labels of a desktop app series.
pub fn app_labels(entry: &CatalogEntry) -> Labels {
    let requires_plugin = if entry.requires_plugin { "true" } else { "" };
    Labels::from([
        (label::APP_NAME, entry.name.clone()),
        (label::APP_CATEGORY, entry.category.clone()),
        (label::APP_REQUIRES_PLUGIN, requires_plugin.to_string()),
    ])
}

/// Labels of a CLI tool duration/cost/command series.
pub fn cli_labels(entry: &CatalogEntry) -> Labels {
    Labels::from([
        (label::CLI_NAME, entry.name.clone()),
        (label::CLI_CATEGORY, entry.category.clone()),
    ])
}

/// Labels of a CLI running-state series. `wsl_distro` is set for tools
/// found inside a WSL distribution.
pub fn cli_running_labels(entry: &CatalogEntry, wsl_distro: Option<&str>) -> Labels {
    let mut labels = cli_labels(entry);
    let (env, distro) = match wsl_distro {
        Some(distro) => ("wsl", distro),
        None => ("", ""),
    };
    labels.insert(label::RUNTIME_ENVIRONMENT, env.to_string());
    labels.insert(label::WSL_DISTRO, distro.to_string());
    labels
}

/// Labels of a browser visit-count or duration series.
pub fn browser_labels(domain: &DomainEntry, browser: &str, usage_source: &str) -> Labels {
    let mut labels = domain_cost_labels(domain);
    labels.insert(label::BROWSER_NAME, browser.to_string());
    labels.insert(label::USAGE_SOURCE, usage_source.to_string());
    labels
}

/// Labels of a browser cost series (not broken out per browser).
pub fn domain_cost_labels(domain: &DomainEntry) -> Labels {
    Labels::from([
        (label::AI_DOMAIN, domain.domain.clone()),
        (label::AI_CATEGORY, domain.category.clone()),
    ])
}

/// Labels of a token usage series.
pub fn token_labels(tool: &str, model: &str) -> Labels {
    Labels::from([
        (label::TOOL_NAME, tool.to_string()),
        (label::MODEL_NAME, model.to_string()),
    ])
}

/// Labels of a prompt-count series.
pub fn prompt_labels(tool: &str, source: &str) -> Labels {
    Labels::from([
        (label::TOOL_NAME, tool.to_string()),
        (label::SOURCE, source.to_string()),
    ])
}

/// Recording [`MetricSink`] that keeps every value in memory.
///
/// Used by tests and by `--dry-run` style wiring where no exporter runs.
#[derive(Default)]
pub struct InMemorySink {
    counters: Mutex<BTreeMap<(Counter, Labels), f64>>,
    counter_log: Mutex<Vec<(Counter, f64, Labels)>>,
    gauges: Mutex<BTreeMap<(Gauge, Labels), f64>>,
    observers: Mutex<Vec<(RunningGauge, Arc<dyn GaugeObserver>)>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated value of one counter series (0 when never incremented)
    pub fn counter(&self, counter: Counter, labels: &Labels) -> f64 {
        self.counters
            .lock()
            .get(&(counter, labels.clone()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Sum over every series of a counter
    pub fn counter_total(&self, counter: Counter) -> f64 {
        self.counters
            .lock()
            .iter()
            .filter(|((c, _), _)| *c == counter)
            .map(|(_, v)| v)
            .sum()
    }

    /// Individual `add` calls for one counter, in call order
    pub fn counter_adds(&self, counter: Counter) -> Vec<(f64, Labels)> {
        self.counter_log
            .lock()
            .iter()
            .filter(|(c, _, _)| *c == counter)
            .map(|(_, v, l)| (*v, l.clone()))
            .collect()
    }

    /// Total number of `add` calls across all counters
    pub fn add_count(&self) -> usize {
        self.counter_log.lock().len()
    }

    /// Last value set on a gauge series
    pub fn gauge(&self, gauge: Gauge, labels: &Labels) -> Option<f64> {
        self.gauges.lock().get(&(gauge, labels.clone())).copied()
    }

    /// Run the registered observers of a running gauge, as an exporter
    /// would at collection time.
    pub fn observe(&self, gauge: RunningGauge) -> Vec<Observation> {
        let observers: Vec<Arc<dyn GaugeObserver>> = self
            .observers
            .lock()
            .iter()
            .filter(|(g, _)| *g == gauge)
            .map(|(_, o)| o.clone())
            .collect();
        observers.iter().flat_map(|o| o.observe()).collect()
    }

    /// Forget recorded counter calls (accumulated values are kept)
    pub fn clear_log(&self) {
        self.counter_log.lock().clear();
    }
}

impl MetricSink for InMemorySink {
    fn add(&self, counter: Counter, value: f64, labels: &Labels) {
        *self
            .counters
            .lock()
            .entry((counter, labels.clone()))
            .or_insert(0.0) += value;
        self.counter_log.lock().push((counter, value, labels.clone()));
    }

    fn set(&self, gauge: Gauge, value: f64, labels: &Labels) {
        self.gauges.lock().insert((gauge, labels.clone()), value);
    }

    fn register_observer(&self, gauge: RunningGauge, observer: Arc<dyn GaugeObserver>) {
        self.observers.lock().push((gauge, observer));
    }
}
