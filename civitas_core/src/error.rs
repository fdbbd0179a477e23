//! Error taxonomy for the inference core.

use civitas_env::ModelError;
use thiserror::Error;

/// Errors surfaced by `InferenceOrchestrator::chat` and the cost estimator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    /// Transport or model failure. Not retried automatically.
    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(String),

    /// The remote model signalled rate limiting (HTTP 429).
    #[error("Cluster saturated: {0}")]
    ClusterSaturated(String),

    /// A model id has no cost coefficient. Configuration bug.
    #[error("Unknown model tier: {0}")]
    UnknownTier(String),
}

impl OrchestratorError {
    /// Caller-facing guidance for this error.
    pub fn user_message(&self) -> &'static str {
        match self {
            OrchestratorError::InferenceUnavailable(_) => {
                "The inference cluster could not be reached. Please retry your request."
            }
            OrchestratorError::ClusterSaturated(_) => {
                "The cluster is saturated. Wait a moment, or switch off the reasoning boost to use the low-latency tier."
            }
            OrchestratorError::UnknownTier(_) => {
                "This deployment is misconfigured: the selected model tier is not priced."
            }
        }
    }

    /// Returns true for errors that indicate a configuration bug rather than
    /// a transient condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OrchestratorError::UnknownTier(_))
    }
}

impl From<ModelError> for OrchestratorError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::RateLimited(msg) => OrchestratorError::ClusterSaturated(msg),
            other => OrchestratorError::InferenceUnavailable(other.to_string()),
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_maps_to_cluster_saturated() {
        let err: OrchestratorError = ModelError::rate_limited("429 Too Many Requests").into();
        assert_eq!(
            err,
            OrchestratorError::ClusterSaturated("429 Too Many Requests".to_string())
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_other_model_errors_map_to_unavailable() {
        for source in [
            ModelError::transport("connection reset"),
            ModelError::Model("bad payload".to_string()),
            ModelError::Timeout(30_000),
        ] {
            let err: OrchestratorError = source.into();
            assert!(matches!(err, OrchestratorError::InferenceUnavailable(_)));
        }
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let unavailable = OrchestratorError::InferenceUnavailable(String::new());
        let saturated = OrchestratorError::ClusterSaturated(String::new());
        assert_ne!(unavailable.user_message(), saturated.user_message());
        assert!(saturated.user_message().contains("boost"));
        assert!(OrchestratorError::UnknownTier("x".into()).is_fatal());
    }
}
