use crate::chain::ChainBuilder;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::image::ImageClient;
use crate::llm::LlmClient;
use crate::planner::StepPlanner;
use crate::result::{assemble, TutorialResult};
use crate::translator::Translator;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Orchestrates one request: plan, then translation and image chain in
/// parallel, then assembly. Owns every intermediate structure for the
/// lifetime of the request; the only thing shared across requests is the
/// semaphore bounding in-flight upstream calls.
pub struct Pipeline {
    planner: StepPlanner,
    translator: Translator,
    chain: ChainBuilder,
    cfg: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        image: Arc<dyn ImageClient>,
        cfg: PipelineConfig,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(cfg.max_concurrent_calls));
        Self {
            planner: StepPlanner::new(llm.clone(), limiter.clone(), cfg.clone()),
            translator: Translator::new(llm, limiter.clone(), cfg.clone()),
            chain: ChainBuilder::new(image, limiter, cfg.clone()),
            cfg,
        }
    }

    /// Generate a complete tutorial. Not idempotent: two calls with the same
    /// subject may produce different plans and images.
    pub async fn generate(&self, subject: &str) -> Result<TutorialResult, PipelineError> {
        let plan = self.planner.plan(subject).await?;

        // Both branches only read the finalized plan, so they run
        // concurrently and join at a single barrier. Dropping this future
        // (client disconnect) cancels both.
        let (translation, chain) =
            tokio::join!(self.translator.translate(&plan), self.chain.build(&plan));

        // Translation is necessary-but-not-fatal: the tutorial still ships
        // with empty translated fields, flagged as incomplete.
        let translations = match translation {
            Ok(set) => Some(set),
            Err(e) if e.is_translation_failure() => {
                warn!("Delivering tutorial without translations: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        if chain.frames.is_empty() {
            let (step, reason) = match chain.failure {
                Some(f) => (f.step, f.reason),
                None => (0, "no frames produced".to_string()),
            };
            return Err(PipelineError::ImageChain { step, reason });
        }

        if let Some(failure) = &chain.failure {
            if !self.cfg.partial_tutorial_allowed {
                return Err(PipelineError::ImageChain {
                    step: failure.step,
                    reason: failure.reason.clone(),
                });
            }
            warn!(
                "Delivering truncated tutorial for \"{}\": {}/{} steps",
                plan.subject,
                chain.frames.len(),
                plan.len()
            );
        }

        let result = assemble(&plan, translations.as_ref(), chain.frames);
        info!(
            "Tutorial for \"{}\" assembled: {} steps, translation_complete={}",
            result.metadata.subject, result.metadata.total_steps, result.metadata.translation_complete
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    enum TranslateBehavior {
        Aligned,
        WrongCount,
        Unavailable,
    }

    /// Dispatches on prompt content, the way the real calls differ.
    #[derive(Debug)]
    struct MockLlm {
        plan_steps: usize,
        translate: TranslateBehavior,
        calls: Arc<Mutex<usize>>,
    }

    impl MockLlm {
        fn new(plan_steps: usize, translate: TranslateBehavior) -> Self {
            Self {
                plan_steps,
                translate,
                calls: Arc::new(Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl LlmClient for MockLlm {
        async fn chat(&self, _system: &str, user: &str) -> Result<String> {
            *self.calls.lock().unwrap() += 1;

            if user.contains("Translate") {
                let count = match self.translate {
                    TranslateBehavior::Aligned => self.plan_steps,
                    TranslateBehavior::WrongCount => self.plan_steps - 1,
                    TranslateBehavior::Unavailable => {
                        return Err(anyhow::anyhow!("translator down"))
                    }
                };
                let entries: Vec<String> =
                    (1..=count).map(|i| format!("Schritt {}", i)).collect();
                return Ok(serde_json::to_string(&entries)?);
            }

            let steps: Vec<String> = (1..=self.plan_steps)
                .map(|i| format!("Draw part {}", i))
                .collect();
            Ok(serde_json::json!({ "steps": steps }).to_string())
        }
    }

    #[derive(Debug, Default)]
    struct MockImage {
        calls: Arc<Mutex<usize>>,
        failing_calls: Vec<usize>,
    }

    #[async_trait]
    impl ImageClient for MockImage {
        async fn generate(&self, _prompt: &str) -> Result<Vec<u8>> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if self.failing_calls.contains(&n) {
                return Err(anyhow::anyhow!("mock generate failure"));
            }
            Ok(b"frame".to_vec())
        }

        async fn edit(&self, image: &[u8], _prompt: &str) -> Result<Vec<u8>> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if self.failing_calls.contains(&n) {
                return Err(anyhow::anyhow!("mock edit failure"));
            }
            let mut out = image.to_vec();
            out.extend_from_slice(b"+");
            Ok(out)
        }
    }

    fn pipeline_with(
        llm: MockLlm,
        image: MockImage,
        partial_allowed: bool,
    ) -> (Pipeline, Arc<Mutex<usize>>, Arc<Mutex<usize>>) {
        let llm_calls = llm.calls.clone();
        let image_calls = image.calls.clone();
        let cfg = PipelineConfig {
            retry_delay_seconds: 0,
            partial_tutorial_allowed: partial_allowed,
            ..Default::default()
        };
        (
            Pipeline::new(Arc::new(llm), Arc::new(image), cfg),
            llm_calls,
            image_calls,
        )
    }

    #[tokio::test]
    async fn test_happy_path_produces_aligned_bilingual_tutorial() {
        let (pipeline, _, _) = pipeline_with(
            MockLlm::new(4, TranslateBehavior::Aligned),
            MockImage::default(),
            false,
        );

        let result = pipeline.generate("cat").await.unwrap();
        assert!(result.success);
        assert_eq!(result.metadata.subject, "cat");
        assert_eq!(result.metadata.total_steps, 4);
        assert!(result.metadata.translation_complete);
        assert_eq!(result.steps.len(), 4);

        for (i, step) in result.steps.iter().enumerate() {
            assert_eq!(step.step_en, format!("Draw part {}", i + 1));
            assert_eq!(step.step_de, format!("Schritt {}", i + 1));
            let bytes = BASE64.decode(&step.step_img).unwrap();
            assert!(!bytes.is_empty());
        }
    }

    #[tokio::test]
    async fn test_invalid_subject_rejected_before_any_upstream_call() {
        let (pipeline, llm_calls, image_calls) = pipeline_with(
            MockLlm::new(4, TranslateBehavior::Aligned),
            MockImage::default(),
            false,
        );

        let err = pipeline.generate("  ").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSubject(_)));
        assert_eq!(*llm_calls.lock().unwrap(), 0);
        assert_eq!(*image_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_translation_outage_degrades_to_empty_fields() {
        let (pipeline, _, _) = pipeline_with(
            MockLlm::new(3, TranslateBehavior::Unavailable),
            MockImage::default(),
            false,
        );

        let result = pipeline.generate("sun").await.unwrap();
        assert_eq!(result.metadata.total_steps, 3);
        assert!(!result.metadata.translation_complete);
        assert!(result.steps.iter().all(|s| s.step_de.is_empty()));
        assert!(result.steps.iter().all(|s| !s.step_en.is_empty()));
        assert!(result.steps.iter().all(|s| !s.step_img.is_empty()));
    }

    #[tokio::test]
    async fn test_translation_count_mismatch_never_misaligns() {
        let (pipeline, _, _) = pipeline_with(
            MockLlm::new(3, TranslateBehavior::WrongCount),
            MockImage::default(),
            false,
        );

        // The mismatched set is discarded wholesale rather than shipped
        // shifted; the tutorial still carries all images.
        let result = pipeline.generate("sun").await.unwrap();
        assert_eq!(result.metadata.total_steps, 3);
        assert!(!result.metadata.translation_complete);
        assert!(result.steps.iter().all(|s| s.step_de.is_empty()));
    }

    #[tokio::test]
    async fn test_broken_chain_fails_request_by_default() {
        // Chain call 2 is the first edit; failing all its attempts breaks
        // the chain at step 2 of 4.
        let (pipeline, _, _) = pipeline_with(
            MockLlm::new(4, TranslateBehavior::Aligned),
            MockImage {
                failing_calls: vec![2, 3, 4],
                ..Default::default()
            },
            false,
        );

        let err = pipeline.generate("cat").await.unwrap_err();
        match err {
            PipelineError::ImageChain { step, .. } => assert_eq!(step, 1),
            other => panic!("expected ImageChain, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broken_chain_truncates_when_policy_allows() {
        let (pipeline, _, _) = pipeline_with(
            MockLlm::new(4, TranslateBehavior::Aligned),
            MockImage {
                failing_calls: vec![2, 3, 4],
                ..Default::default()
            },
            true,
        );

        let result = pipeline.generate("cat").await.unwrap();
        assert_eq!(result.metadata.total_steps, 1);
        assert_eq!(result.steps.len(), 1);
        // The surviving step keeps its own translation, not a shifted one.
        assert_eq!(result.steps[0].step_en, "Draw part 1");
        assert_eq!(result.steps[0].step_de, "Schritt 1");
    }

    #[tokio::test]
    async fn test_zero_frames_is_fatal_even_with_partial_policy() {
        let (pipeline, _, _) = pipeline_with(
            MockLlm::new(3, TranslateBehavior::Aligned),
            MockImage {
                failing_calls: vec![1, 2, 3],
                ..Default::default()
            },
            true,
        );

        let err = pipeline.generate("cat").await.unwrap_err();
        match err {
            PipelineError::ImageChain { step, .. } => assert_eq!(step, 0),
            other => panic!("expected ImageChain, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeated_calls_stay_valid_without_byte_equality_requirement() {
        let (pipeline, _, _) = pipeline_with(
            MockLlm::new(3, TranslateBehavior::Aligned),
            MockImage::default(),
            false,
        );

        let first = pipeline.generate("sun").await.unwrap();
        let second = pipeline.generate("sun").await.unwrap();
        // Each call independently satisfies the invariants; equality of
        // outputs is not part of the contract.
        assert_eq!(first.metadata.total_steps, first.steps.len());
        assert_eq!(second.metadata.total_steps, second.steps.len());
    }
}
