//! Simulated monetary cost of a model response.
//!
//! ```text
//! cost = (chars(text) / 4) * coefficient[model_id]
//! ```
//!
//! Four characters per token is the usual rule of thumb for English text;
//! no tokenizer is involved.

use crate::error::OrchestratorError;
use std::collections::HashMap;

/// Characters counted as one token.
pub const CHARS_PER_TOKEN: f64 = 4.0;

/// Pure mapping from response size and model tier to a cost figure.
#[derive(Debug, Clone)]
pub struct CostEstimator {
    /// Cost per token, keyed by model id
    coefficients: HashMap<String, f64>,
}

impl CostEstimator {
    /// Creates an estimator from per-tier coefficients.
    pub fn new(coefficients: HashMap<String, f64>) -> Self {
        Self { coefficients }
    }

    /// Returns true if `model_id` has a coefficient.
    pub fn knows(&self, model_id: &str) -> bool {
        self.coefficients.contains_key(model_id)
    }

    /// Estimates the cost of `text` produced by `model_id`.
    ///
    /// # Errors
    /// `UnknownTier` if the model id has no coefficient.
    pub fn estimate(&self, text: &str, model_id: &str) -> Result<f64, OrchestratorError> {
        let coefficient = self
            .coefficients
            .get(model_id)
            .ok_or_else(|| OrchestratorError::UnknownTier(model_id.to_string()))?;
        let tokens = text.chars().count() as f64 / CHARS_PER_TOKEN;
        Ok(tokens * coefficient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn estimator() -> CostEstimator {
        CostEstimator::new(HashMap::from([
            ("fast".to_string(), 0.5),
            ("reasoning".to_string(), 2.0),
        ]))
    }

    #[test]
    fn test_estimate_formula() {
        let est = estimator();
        assert_relative_eq!(est.estimate("abcdefgh", "fast").unwrap(), 1.0);
        assert_relative_eq!(est.estimate("abcdefgh", "reasoning").unwrap(), 4.0);
        assert_relative_eq!(est.estimate("", "fast").unwrap(), 0.0);
    }

    #[test]
    fn test_estimate_counts_chars_not_bytes() {
        let est = estimator();
        // 4 chars, 8 bytes
        assert_relative_eq!(est.estimate("éééé", "reasoning").unwrap(), 2.0);
    }

    #[test]
    fn test_unknown_tier() {
        let err = estimator().estimate("hello", "mystery").unwrap_err();
        assert_eq!(err, OrchestratorError::UnknownTier("mystery".to_string()));
    }

    proptest! {
        #[test]
        fn prop_estimate_monotonic_in_length(base in "[a-z ]{0,200}", extra in "[a-z ]{0,200}") {
            let est = estimator();
            let longer = format!("{base}{extra}");
            for tier in ["fast", "reasoning"] {
                let short_cost = est.estimate(&base, tier).unwrap();
                let long_cost = est.estimate(&longer, tier).unwrap();
                prop_assert!(long_cost >= short_cost);
            }
        }
    }
}
