//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. Providers that
//! own a real tokenizer report exact counts instead; this is the fallback used
//! for accounting when they don't.

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Pre-flight estimate for a free-form project description.
///
/// Word based (≈1.3 tokens per word); output is expected to be ~60% of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenEstimate {
    pub input_tokens: u64,
    pub estimated_output_tokens: u64,
    pub total_estimated: u64,
}

pub fn estimate_description(description: &str) -> TokenEstimate {
    let words = description.split_whitespace().count() as f64;
    let input = words * 1.3;
    TokenEstimate {
        input_tokens: input as u64,
        estimated_output_tokens: (input * 0.6) as u64,
        total_estimated: (input * 1.6) as u64,
    }
}
