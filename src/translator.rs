use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm::LlmClient;
use crate::planner::StepPlan;
use crate::prompts;
use anyhow::Result;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Target-language renderings of the plan, same length and order.
#[derive(Debug, Clone)]
pub struct TranslationSet {
    pub entries: Vec<String>,
}

/// Upstream counts are untrusted; a mismatch against the plan is a contract
/// violation and is never truncated or padded away.
fn check_alignment(plan: &StepPlan, entries: &[String]) -> Result<(), PipelineError> {
    if entries.len() != plan.len() {
        return Err(PipelineError::TranslationInconsistent(format!(
            "expected {} entries, got {}",
            plan.len(),
            entries.len()
        )));
    }
    if let Some(pos) = entries.iter().position(|e| e.trim().is_empty()) {
        return Err(PipelineError::TranslationInconsistent(format!(
            "entry {} is empty",
            pos + 1
        )));
    }
    Ok(())
}

pub struct Translator {
    llm: Arc<dyn LlmClient>,
    limiter: Arc<Semaphore>,
    cfg: PipelineConfig,
}

impl Translator {
    pub fn new(llm: Arc<dyn LlmClient>, limiter: Arc<Semaphore>, cfg: PipelineConfig) -> Self {
        Self { llm, limiter, cfg }
    }

    /// Translate the finalized plan in one batched call so terminology stays
    /// consistent across steps. Transient upstream failures are retried; a
    /// count mismatch is raised immediately as `TranslationInconsistent`.
    pub async fn translate(&self, plan: &StepPlan) -> Result<TranslationSet, PipelineError> {
        let language = &self.cfg.target_language;
        let system = prompts::translation_system(language);
        let user = prompts::translation_user(&plan.step_texts(), language);
        let mut last_error = String::new();

        for attempt in 1..=self.cfg.retry_count {
            let outcome = {
                let _permit = self.limiter.acquire().await.map_err(|e| {
                    PipelineError::TranslationUnavailable(format!("generation slots closed: {}", e))
                })?;
                timeout(self.cfg.call_timeout(), self.llm.chat(&system, &user)).await
            };

            match outcome {
                Ok(Ok(response)) => {
                    let clean = prompts::strip_code_fences(&response);
                    match serde_json::from_str::<Vec<String>>(&clean) {
                        Ok(entries) => {
                            let entries: Vec<String> =
                                entries.into_iter().map(|e| e.trim().to_string()).collect();
                            if let Err(e) = check_alignment(plan, &entries) {
                                error!("Translation rejected: {}", e);
                                return Err(e);
                            }
                            info!(
                                "Translated {} steps into {}",
                                entries.len(),
                                language
                            );
                            return Ok(TranslationSet { entries });
                        }
                        Err(e) => last_error = format!("unparseable translation reply: {}", e),
                    }
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!(
                        "translation call timed out after {}s",
                        self.cfg.call_timeout_seconds
                    )
                }
            }

            warn!(
                "Translation attempt {}/{} failed: {}",
                attempt, self.cfg.retry_count, last_error
            );
            if attempt < self.cfg.retry_count {
                tokio::time::sleep(self.cfg.backoff(attempt)).await;
            }
        }

        Err(PipelineError::TranslationUnavailable(last_error))
    }
}
