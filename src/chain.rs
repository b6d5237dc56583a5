use crate::config::PipelineConfig;
use crate::image::ImageClient;
use crate::planner::StepPlan;
use crate::prompts;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Lifecycle of one chain index. A step only enters `Generating` once its
/// predecessor is `Succeeded`; everything after a `Failed` step stays
/// `Pending` forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Generating,
    Succeeded,
    Failed,
}

/// One generated frame. `source_index` is the chain index this frame was
/// derived from by an edit call; the first frame has none.
#[derive(Debug, Clone)]
pub struct ImageFrame {
    pub index: usize,
    pub bytes: Vec<u8>,
    pub source_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ChainFailure {
    pub step: usize,
    pub reason: String,
}

#[derive(Debug)]
pub struct ChainOutcome {
    pub frames: Vec<ImageFrame>,
    /// Final state per planned step, in order.
    pub states: Vec<StepState>,
    pub failure: Option<ChainFailure>,
}

pub struct ChainBuilder {
    image: Arc<dyn ImageClient>,
    limiter: Arc<Semaphore>,
    cfg: PipelineConfig,
}

impl ChainBuilder {
    pub fn new(image: Arc<dyn ImageClient>, limiter: Arc<Semaphore>, cfg: PipelineConfig) -> Self {
        Self { image, limiter, cfg }
    }

    /// Build the progressive chain. Strictly serial: frame k is only
    /// well-defined relative to frame k-1, so there is no suspension point
    /// for step k+1 before step k resolves. The first failed step ends the
    /// chain; the frames produced so far are returned as-is.
    pub async fn build(&self, plan: &StepPlan) -> ChainOutcome {
        let mut states = vec![StepState::Pending; plan.len()];
        let mut frames: Vec<ImageFrame> = Vec::with_capacity(plan.len());

        for step in &plan.steps {
            let k = step.index - 1;
            states[k] = StepState::Generating;

            match self.run_step(k, &step.text, plan, frames.last()).await {
                Ok(bytes) => {
                    states[k] = StepState::Succeeded;
                    frames.push(ImageFrame {
                        index: k,
                        bytes,
                        source_index: if k == 0 { None } else { Some(k - 1) },
                    });
                }
                Err(reason) => {
                    states[k] = StepState::Failed;
                    error!(
                        "Image chain for \"{}\" stopped at step {}/{}: {}",
                        plan.subject,
                        k + 1,
                        plan.len(),
                        reason
                    );
                    return ChainOutcome {
                        frames,
                        states,
                        failure: Some(ChainFailure { step: k, reason }),
                    };
                }
            }
        }

        info!(
            "Image chain for \"{}\" complete: {} frames",
            plan.subject,
            frames.len()
        );
        ChainOutcome {
            frames,
            states,
            failure: None,
        }
    }

    /// Drive one chain index through its attempts. Every retry repeats the
    /// same call with the same inputs: the prior frame's bytes never change
    /// underneath a step.
    async fn run_step(
        &self,
        k: usize,
        step_text: &str,
        plan: &StepPlan,
        prior: Option<&ImageFrame>,
    ) -> Result<Vec<u8>, String> {
        let prompt = match prior {
            None => prompts::first_frame(&plan.subject, step_text),
            Some(_) => prompts::edit_frame(step_text),
        };
        let mut last_error = String::new();

        for attempt in 1..=self.cfg.retry_count {
            let outcome = {
                let _permit = self
                    .limiter
                    .acquire()
                    .await
                    .map_err(|e| format!("generation slots closed: {}", e))?;
                let call = async {
                    match prior {
                        None => self.image.generate(&prompt).await,
                        Some(frame) => self.image.edit(&frame.bytes, &prompt).await,
                    }
                };
                timeout(self.cfg.call_timeout(), call).await
            };

            match outcome {
                Ok(Ok(bytes)) if !bytes.is_empty() => return Ok(bytes),
                Ok(Ok(_)) => last_error = "upstream returned an empty image".to_string(),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!(
                        "image call timed out after {}s",
                        self.cfg.call_timeout_seconds
                    )
                }
            }

            warn!(
                "Image step {} attempt {}/{} failed: {}",
                k + 1,
                attempt,
                self.cfg.retry_count,
                last_error
            );
            if attempt < self.cfg.retry_count {
                tokio::time::sleep(self.cfg.backoff(attempt)).await;
            }
        }

        Err(last_error)
    }
}
