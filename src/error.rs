use thiserror::Error;

/// Failure taxonomy for one tutorial generation request.
///
/// `InvalidSubject` is client-caused. `Planning` and `ImageChain` are fatal
/// stage failures. `TranslationUnavailable` and `TranslationInconsistent`
/// only affect the translated text and may be absorbed into a degraded
/// result by the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    #[error("step planning failed: {0}")]
    Planning(String),

    #[error("translation unavailable: {0}")]
    TranslationUnavailable(String),

    #[error("translation out of step with plan: {0}")]
    TranslationInconsistent(String),

    #[error("image chain broken at step {step}: {reason}")]
    ImageChain { step: usize, reason: String },
}

impl PipelineError {
    /// True when the failure only degrades the translated text while the
    /// visual tutorial is still intact.
    pub fn is_translation_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::TranslationUnavailable(_) | PipelineError::TranslationInconsistent(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = PipelineError::InvalidSubject("subject is empty".to_string());
        assert_eq!(err.to_string(), "invalid subject: subject is empty");

        let err = PipelineError::ImageChain {
            step: 4,
            reason: "upstream timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "image chain broken at step 4: upstream timeout"
        );
    }

    #[test]
    fn test_translation_failures_are_recoverable() {
        assert!(PipelineError::TranslationUnavailable("x".into()).is_translation_failure());
        assert!(PipelineError::TranslationInconsistent("x".into()).is_translation_failure());
        assert!(!PipelineError::Planning("x".into()).is_translation_failure());
        assert!(!PipelineError::ImageChain {
            step: 0,
            reason: "x".into()
        }
        .is_translation_failure());
    }
}
