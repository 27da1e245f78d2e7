//! Token usage recording shared by the log scanner and the HTTP intake.

use costscope_core::error::CoreError;
use costscope_core::metrics::{prompt_labels, token_labels, Counter};
use costscope_core::models::usage::UsageEvent;
use costscope_core::ports::metrics::MetricSink;
use costscope_core::ports::storage::PromptStore;
use std::sync::Arc;

/// Emits token metrics for a [`UsageEvent`] and forwards it to the
/// optional prompt store.
#[derive(Clone)]
pub struct UsageRecorder {
    sink: Arc<dyn MetricSink>,
    store: Option<Arc<dyn PromptStore>>,
    capture_prompt_text: bool,
    capture_response_text: bool,
}

impl UsageRecorder {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self {
            sink,
            store: None,
            capture_prompt_text: true,
            capture_response_text: true,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn PromptStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Text capture toggles; token counts are stored either way.
    pub fn with_capture(mut self, prompt_text: bool, response_text: bool) -> Self {
        self.capture_prompt_text = prompt_text;
        self.capture_response_text = response_text;
        self
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Apply the store's retention window. `Ok(0)` without a store.
    pub fn cleanup_expired(&self) -> Result<usize, CoreError> {
        match &self.store {
            Some(store) => store.cleanup_expired(),
            None => Ok(0),
        }
    }

    /// Metrics are always emitted; the error only reports a failed store
    /// insert.
    pub fn record(&self, event: &UsageEvent) -> Result<(), CoreError> {
        self.emit(event);
        self.store(event)
    }

    /// Store first, emit only after the insert succeeded. A failed event
    /// leaves no trace, so re-reading it later counts it exactly once.
    pub fn record_durable(&self, event: &UsageEvent) -> Result<(), CoreError> {
        self.store(event)?;
        self.emit(event);
        Ok(())
    }

    fn emit(&self, event: &UsageEvent) {
        let labels = token_labels(&event.tool, &event.model);
        if event.input_tokens > 0 {
            self.sink
                .add(Counter::TokensInput, event.input_tokens as f64, &labels);
        }
        if event.output_tokens > 0 {
            self.sink
                .add(Counter::TokensOutput, event.output_tokens as f64, &labels);
        }
        if event.cost_usd > 0.0 {
            self.sink.add(Counter::TokensCost, event.cost_usd, &labels);
        }
        self.sink.add(
            Counter::PromptCount,
            1.0,
            &prompt_labels(&event.tool, event.source.as_str()),
        );
    }

    fn store(&self, event: &UsageEvent) -> Result<(), CoreError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let mut stored = event.clone();
        if !self.capture_prompt_text {
            stored.prompt_text = None;
        }
        if !self.capture_response_text {
            stored.response_text = None;
        }
        store.insert(&stored)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use costscope_core::metrics::InMemorySink;
    use costscope_core::models::usage::UsageSource;
    use doubles::RecordingStore;

    /// Store double used across scanner tests.
    pub(crate) mod doubles {
        use super::*;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Mutex;

        #[derive(Default)]
        pub(crate) struct RecordingStore {
            pub events: Mutex<Vec<UsageEvent>>,
            pub fail: AtomicBool,
        }

        impl RecordingStore {
            pub fn failing() -> Self {
                let store = Self::default();
                store.fail.store(true, Ordering::SeqCst);
                store
            }

            pub fn set_failing(&self, fail: bool) {
                self.fail.store(fail, Ordering::SeqCst);
            }

            pub fn len(&self) -> usize {
                self.events.lock().unwrap().len()
            }
        }

        impl PromptStore for RecordingStore {
            fn insert(&self, event: &UsageEvent) -> Result<(), CoreError> {
                if self.fail.load(Ordering::SeqCst) {
                    return Err(CoreError::Sqlite("disk I/O error".to_string()));
                }
                self.events.lock().unwrap().push(event.clone());
                Ok(())
            }

            fn cleanup_expired(&self) -> Result<usize, CoreError> {
                Ok(0)
            }
        }
    }

    pub(crate) fn event(tool: &str, model: &str, input: u64, output: u64, cost: f64) -> UsageEvent {
        UsageEvent {
            tool: tool.to_string(),
            model: model.to_string(),
            input_tokens: input,
            output_tokens: output,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            cost_usd: cost,
            prompt_text: Some("hello".to_string()),
            response_text: Some("hi".to_string()),
            source: UsageSource::Browser,
            project: None,
        }
    }

    #[test]
    fn emits_tokens_cost_and_prompt_count() {
        let sink = Arc::new(InMemorySink::new());
        let recorder = UsageRecorder::new(sink.clone());
        recorder.record(&event("chatgpt", "gpt-4o", 100, 50, 0.01)).unwrap();

        let labels = token_labels("chatgpt", "gpt-4o");
        assert_eq!(sink.counter(Counter::TokensInput, &labels), 100.0);
        assert_eq!(sink.counter(Counter::TokensOutput, &labels), 50.0);
        assert_eq!(sink.counter(Counter::TokensCost, &labels), 0.01);
        assert_eq!(
            sink.counter(Counter::PromptCount, &prompt_labels("chatgpt", "browser")),
            1.0
        );
    }

    #[test]
    fn zero_cost_is_not_emitted() {
        let sink = Arc::new(InMemorySink::new());
        let recorder = UsageRecorder::new(sink.clone());
        recorder.record(&event("chatgpt", "gpt-4o", 0, 0, 0.0)).unwrap();
        assert!(sink.counter_adds(Counter::TokensCost).is_empty());
        assert!(sink.counter_adds(Counter::TokensInput).is_empty());
        assert_eq!(sink.counter_total(Counter::PromptCount), 1.0);
    }

    #[test]
    fn capture_toggles_strip_text() {
        let store = Arc::new(RecordingStore::default());
        let recorder = UsageRecorder::new(Arc::new(InMemorySink::new()))
            .with_store(store.clone())
            .with_capture(false, true);
        recorder.record(&event("claude", "claude-sonnet-4", 1, 1, 0.1)).unwrap();

        let stored = store.events.lock().unwrap()[0].clone();
        assert_eq!(stored.prompt_text, None);
        assert_eq!(stored.response_text.as_deref(), Some("hi"));
    }

    #[test]
    fn store_failure_still_emits_metrics() {
        let sink = Arc::new(InMemorySink::new());
        let recorder = UsageRecorder::new(sink.clone())
            .with_store(Arc::new(RecordingStore::failing()));
        assert!(recorder.record(&event("claude", "claude-sonnet-4", 10, 0, 0.1)).is_err());
        assert_eq!(sink.counter_total(Counter::TokensInput), 10.0);
    }

    #[test]
    fn durable_record_emits_only_after_insert() {
        let sink = Arc::new(InMemorySink::new());
        let store = Arc::new(RecordingStore::failing());
        let recorder = UsageRecorder::new(sink.clone()).with_store(store.clone());
        let usage = event("claude-code", "claude-sonnet-4", 10, 5, 0.1);

        assert!(recorder.record_durable(&usage).is_err());
        assert_eq!(sink.add_count(), 0);

        store.set_failing(false);
        recorder.record_durable(&usage).unwrap();
        assert_eq!(sink.counter_total(Counter::TokensInput), 10.0);
        assert_eq!(store.len(), 1);
    }
}
