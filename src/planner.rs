use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm::LlmClient;
use crate::prompts;
use anyhow::Result;
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::timeout;

pub const MAX_SUBJECT_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct StepDescription {
    /// 1-based, contiguous.
    pub index: usize,
    pub text: String,
}

/// The finalized English plan. Immutable once produced; the translator and
/// the image chain both read it, neither mutates it.
#[derive(Debug, Clone)]
pub struct StepPlan {
    pub subject: String,
    pub steps: Vec<StepDescription>,
}

impl StepPlan {
    pub fn new(subject: String, texts: Vec<String>) -> Self {
        let steps = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| StepDescription { index: i + 1, text })
            .collect();
        Self { subject, steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn step_texts(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.text.clone()).collect()
    }
}

/// Trim and bounds-check an incoming subject before anything is spent on
/// generation calls.
pub fn validate_subject(raw: &str) -> Result<String, PipelineError> {
    let subject = raw.trim();
    if subject.is_empty() {
        return Err(PipelineError::InvalidSubject(
            "subject must not be empty".to_string(),
        ));
    }
    if subject.chars().count() > MAX_SUBJECT_CHARS {
        return Err(PipelineError::InvalidSubject(format!(
            "subject must be at most {} characters",
            MAX_SUBJECT_CHARS
        )));
    }
    Ok(subject.to_string())
}

#[derive(Deserialize)]
struct PlanDraft {
    steps: Vec<String>,
}

/// The model sometimes answers with a bare array instead of the requested
/// object; accept both. Blank entries are dropped before the count check.
fn parse_step_texts(response: &str) -> Result<Vec<String>> {
    let clean = prompts::strip_code_fences(response);
    let texts = match serde_json::from_str::<PlanDraft>(&clean) {
        Ok(draft) => draft.steps,
        Err(_) => serde_json::from_str::<Vec<String>>(&clean)
            .map_err(|e| anyhow::anyhow!("Failed to parse plan draft: {}. Body: {}", e, clean))?,
    };

    Ok(texts
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

pub struct StepPlanner {
    llm: Arc<dyn LlmClient>,
    limiter: Arc<Semaphore>,
    cfg: PipelineConfig,
}

impl StepPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, limiter: Arc<Semaphore>, cfg: PipelineConfig) -> Self {
        Self { llm, limiter, cfg }
    }

    /// One generation call decides the step count and drafts the steps.
    /// A draft outside `[min_steps, max_steps]` is re-requested once with a
    /// corrective prompt; a second overlong draft is clamped, a second short
    /// draft fails the stage.
    pub async fn plan(&self, raw_subject: &str) -> Result<StepPlan, PipelineError> {
        let subject = validate_subject(raw_subject)?;
        let min = self.cfg.min_steps;
        let max = self.cfg.max_steps;

        let mut texts = self.draft(&prompts::planning_user(&subject, min, max)).await?;

        if texts.len() < min || texts.len() > max {
            warn!(
                "Plan for \"{}\" had {} steps (allowed {}..={}), re-requesting",
                subject,
                texts.len(),
                min,
                max
            );
            texts = self
                .draft(&prompts::planning_retry_user(&subject, min, max, texts.len()))
                .await?;
        }

        if texts.len() > max {
            warn!(
                "Plan for \"{}\" still overlong ({} steps), clamping to {}",
                subject,
                texts.len(),
                max
            );
            texts.truncate(max);
        }
        if texts.len() < min {
            return Err(PipelineError::Planning(format!(
                "planner produced {} steps, need at least {}",
                texts.len(),
                min
            )));
        }

        info!("Planned {} steps for \"{}\"", texts.len(), subject);
        Ok(StepPlan::new(subject, texts))
    }

    /// One drafting call with the stage retry policy: transport errors,
    /// timeouts and malformed replies are all transient.
    async fn draft(&self, user_prompt: &str) -> Result<Vec<String>, PipelineError> {
        let system = prompts::planning_system();
        let mut last_error = String::new();

        for attempt in 1..=self.cfg.retry_count {
            let outcome = {
                let _permit = self
                    .limiter
                    .acquire()
                    .await
                    .map_err(|e| PipelineError::Planning(format!("generation slots closed: {}", e)))?;
                timeout(self.cfg.call_timeout(), self.llm.chat(&system, user_prompt)).await
            };

            match outcome {
                Ok(Ok(response)) => match parse_step_texts(&response) {
                    Ok(texts) => return Ok(texts),
                    Err(e) => last_error = e.to_string(),
                },
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!(
                        "planning call timed out after {}s",
                        self.cfg.call_timeout_seconds
                    )
                }
            }

            warn!(
                "Planning attempt {}/{} failed: {}",
                attempt, self.cfg.retry_count, last_error
            );
            if attempt < self.cfg.retry_count {
                tokio::time::sleep(self.cfg.backoff(attempt)).await;
            }
        }

        Err(PipelineError::Planning(last_error))
    }
}
