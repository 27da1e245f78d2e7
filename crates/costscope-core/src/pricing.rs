//! Token cost estimation.
//!
//! Rates are USD per million tokens. Lookup is exact first, then the longest
//! registered prefix, so dated or suffixed model ids (`claude-sonnet-4-5-20250929`)
//! resolve to their family's rate. Unknown models use [`DEFAULT_RATE`].

use once_cell::sync::Lazy;

/// Input/output rate pair in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRate {
    pub input: f64,
    pub output: f64,
}

impl ModelRate {
    const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }
}

/// Mid-range fallback for models missing from the table.
pub const DEFAULT_RATE: ModelRate = ModelRate::new(3.0, 15.0);

/// Cache-creation tokens are billed at this multiple of the input rate.
pub const CACHE_CREATION_MULTIPLIER: f64 = 1.25;

/// Cache-read tokens are billed at this multiple of the input rate.
pub const CACHE_READ_MULTIPLIER: f64 = 0.10;

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

static MODEL_RATES: Lazy<Vec<(&'static str, ModelRate)>> = Lazy::new(|| {
    vec![
        // Anthropic
        ("claude-opus-4", ModelRate::new(15.0, 75.0)),
        ("claude-sonnet-4", ModelRate::new(3.0, 15.0)),
        ("claude-sonnet-4-5", ModelRate::new(3.0, 15.0)),
        ("claude-haiku-3-5", ModelRate::new(0.80, 4.0)),
        // OpenAI
        ("gpt-4o", ModelRate::new(2.50, 10.0)),
        ("gpt-4o-mini", ModelRate::new(0.15, 0.60)),
        ("gpt-4-turbo", ModelRate::new(10.0, 30.0)),
        ("gpt-4.1", ModelRate::new(2.0, 8.0)),
        ("gpt-4.1-mini", ModelRate::new(0.40, 1.60)),
        ("gpt-4.1-nano", ModelRate::new(0.10, 0.40)),
        ("o1", ModelRate::new(15.0, 60.0)),
        ("o1-mini", ModelRate::new(3.0, 12.0)),
        ("o3", ModelRate::new(10.0, 40.0)),
        ("o3-mini", ModelRate::new(1.10, 4.40)),
        ("o4-mini", ModelRate::new(1.10, 4.40)),
        // Google
        ("gemini-2.5-pro", ModelRate::new(1.25, 10.0)),
        ("gemini-2.5-flash", ModelRate::new(0.15, 0.60)),
        ("gemini-2.0-flash", ModelRate::new(0.10, 0.40)),
        ("gemini-2.0-pro", ModelRate::new(1.25, 10.0)),
        ("gemini-1.5-pro", ModelRate::new(1.25, 5.0)),
        ("gemini-1.5-flash", ModelRate::new(0.075, 0.30)),
        // DeepSeek
        ("deepseek-v3", ModelRate::new(0.27, 1.10)),
        ("deepseek-r1", ModelRate::new(0.55, 2.19)),
    ]
});

/// Rate for `model`: exact match, else longest registered prefix, else
/// [`DEFAULT_RATE`].
pub fn rate_for(model: &str) -> ModelRate {
    if let Some((_, rate)) = MODEL_RATES.iter().find(|(key, _)| *key == model) {
        return *rate;
    }

    MODEL_RATES
        .iter()
        .filter(|(key, _)| !model.is_empty() && model.starts_with(key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, rate)| *rate)
        .unwrap_or(DEFAULT_RATE)
}

/// Estimated USD cost of one model call. Returns exactly `0.0` when every
/// token count is zero.
pub fn estimate_cost(
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
    cache_creation_tokens: u64,
    cache_read_tokens: u64,
) -> f64 {
    if input_tokens == 0
        && output_tokens == 0
        && cache_creation_tokens == 0
        && cache_read_tokens == 0
    {
        return 0.0;
    }

    let rate = rate_for(model);
    let per_token = |tokens: u64, price: f64| tokens as f64 / TOKENS_PER_UNIT * price;

    per_token(input_tokens, rate.input)
        + per_token(output_tokens, rate.output)
        + per_token(cache_creation_tokens, rate.input * CACHE_CREATION_MULTIPLIER)
        + per_token(cache_read_tokens, rate.input * CACHE_READ_MULTIPLIER)
}
