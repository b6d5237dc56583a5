use crate::chain::ImageFrame;
use crate::planner::StepPlan;
use crate::translator::TranslationSet;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;

/// One tutorial entry: English text, translated text and the frame for that
/// step, already transport-encoded.
#[derive(Debug, Serialize)]
pub struct TutorialStep {
    pub step_en: String,
    pub step_de: String,
    pub step_img: String,
}

#[derive(Debug, Serialize)]
pub struct TutorialMetadata {
    pub subject: String,
    /// What was actually produced, which can be less than what was planned.
    pub total_steps: usize,
    pub translation_complete: bool,
}

/// The externally visible artifact of one request. Transient: built once,
/// handed to the HTTP boundary, never stored by the core.
#[derive(Debug, Serialize)]
pub struct TutorialResult {
    pub success: bool,
    pub metadata: TutorialMetadata,
    pub steps: Vec<TutorialStep>,
}

/// Join plan, translations and frames by index. Only frames that were
/// actually produced are emitted; a missing translation becomes an explicit
/// empty field, never a shifted or wrong-language value. This is the only
/// place where image bytes are base64-encoded.
pub fn assemble(
    plan: &StepPlan,
    translations: Option<&TranslationSet>,
    frames: Vec<ImageFrame>,
) -> TutorialResult {
    let steps: Vec<TutorialStep> = frames
        .into_iter()
        .map(|frame| {
            let k = frame.index;
            TutorialStep {
                step_en: plan.steps[k].text.clone(),
                step_de: translations
                    .and_then(|t| t.entries.get(k))
                    .cloned()
                    .unwrap_or_default(),
                step_img: BASE64.encode(&frame.bytes),
            }
        })
        .collect();

    TutorialResult {
        success: true,
        metadata: TutorialMetadata {
            subject: plan.subject.clone(),
            total_steps: steps.len(),
            translation_complete: translations.is_some(),
        },
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<ImageFrame> {
        (0..n)
            .map(|k| ImageFrame {
                index: k,
                bytes: format!("png-{}", k).into_bytes(),
                source_index: if k == 0 { None } else { Some(k - 1) },
            })
            .collect()
    }

    fn plan() -> StepPlan {
        StepPlan::new(
            "sun".to_string(),
            vec![
                "Draw a circle".to_string(),
                "Add the rays".to_string(),
                "Add a smile".to_string(),
            ],
        )
    }

    fn translations() -> TranslationSet {
        TranslationSet {
            entries: vec![
                "Zeichne einen Kreis".to_string(),
                "Füge die Strahlen hinzu".to_string(),
                "Füge ein Lächeln hinzu".to_string(),
            ],
        }
    }

    #[test]
    fn test_assemble_joins_by_index() {
        let t = translations();
        let result = assemble(&plan(), Some(&t), frames(3));

        assert!(result.success);
        assert_eq!(result.metadata.subject, "sun");
        assert_eq!(result.metadata.total_steps, 3);
        assert!(result.metadata.translation_complete);
        assert_eq!(result.steps.len(), 3);

        assert_eq!(result.steps[1].step_en, "Add the rays");
        assert_eq!(result.steps[1].step_de, "Füge die Strahlen hinzu");
        let decoded = BASE64.decode(&result.steps[1].step_img).unwrap();
        assert_eq!(decoded, b"png-1");
    }

    #[test]
    fn test_assemble_without_translations_emits_empty_fields() {
        let result = assemble(&plan(), None, frames(3));

        assert!(!result.metadata.translation_complete);
        assert!(result.steps.iter().all(|s| s.step_de.is_empty()));
        assert!(result.steps.iter().all(|s| !s.step_en.is_empty()));
    }

    #[test]
    fn test_assemble_truncated_chain_reports_actual_count() {
        let t = translations();
        let result = assemble(&plan(), Some(&t), frames(2));

        assert_eq!(result.metadata.total_steps, 2);
        assert_eq!(result.steps.len(), 2);
        // The surviving pairs stay aligned.
        assert_eq!(result.steps[0].step_en, "Draw a circle");
        assert_eq!(result.steps[0].step_de, "Zeichne einen Kreis");
        assert_eq!(result.steps[1].step_en, "Add the rays");
        assert_eq!(result.steps[1].step_de, "Füge die Strahlen hinzu");
    }

    #[test]
    fn test_result_serializes_to_wire_shape() {
        let t = translations();
        let result = assemble(&plan(), Some(&t), frames(1));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["metadata"]["subject"], "sun");
        assert_eq!(json["metadata"]["total_steps"], 1);
        assert!(json["steps"][0]["step_img"].is_string());
    }
}
