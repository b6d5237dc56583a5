//! Prompt templates for every upstream generation call. Pure string
//! rendering, no state.

pub fn planning_system() -> String {
    "You are an art teacher for young children. You reply with valid JSON only.".to_string()
}

/// Drafting prompt. The model both picks the step count (complexity tiering,
/// bounded by the configured range) and writes the step texts.
pub fn planning_user(subject: &str, min_steps: usize, max_steps: usize) -> String {
    format!(
        "Create a step-by-step drawing tutorial for: \"{}\".\n\
        Decide how many steps the subject needs, between {} and {}:\n\
        - very simple subjects (sun, ball, heart): {}-4 steps\n\
        - medium subjects (cat, house, flower): 5-7 steps\n\
        - complex subjects (dragon, castle, fire truck): 8-{} steps\n\
        Each step must describe exactly one additive drawing action in simple,\n\
        literal language a child can follow, e.g. \"Draw a big circle for the head\"\n\
        or \"Add two pointy ears on top\". Later steps must build on earlier ones\n\
        and never erase or replace anything.\n\
        Return only a JSON object: {{ \"steps\": [\"...\", \"...\"] }}",
        subject, min_steps, max_steps, min_steps, max_steps
    )
}

/// Corrective prompt after a draft with an out-of-range step count.
pub fn planning_retry_user(
    subject: &str,
    min_steps: usize,
    max_steps: usize,
    got: usize,
) -> String {
    format!(
        "Your previous tutorial for \"{}\" had {} steps, which is outside the\n\
        allowed range. Write a new step-by-step drawing tutorial with between\n\
        {} and {} steps. Each step is one additive drawing action in simple,\n\
        child-friendly language. Return only a JSON object:\n\
        {{ \"steps\": [\"...\", \"...\"] }}",
        subject, got, min_steps, max_steps
    )
}

pub fn translation_system(language: &str) -> String {
    format!(
        "You are a translator for a children's drawing app. You translate into {} \
        and reply with valid JSON only.",
        language
    )
}

/// One batched call for the whole plan so that terminology stays consistent
/// across steps.
pub fn translation_user(steps: &[String], language: &str) -> String {
    let steps_json = serde_json::to_string(steps).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Translate the following drawing instructions into {}.\n\
        Keep the wording simple enough for a young child.\n\
        Return only a JSON array of strings with exactly {} entries,\n\
        in the same order as the input.\n\n{}",
        language,
        steps.len(),
        steps_json
    )
}

/// Text-to-image prompt for the first frame of the chain.
pub fn first_frame(subject: &str, step_text: &str) -> String {
    format!(
        "A simple black line drawing on a plain white background, in the style \
        of a children's how-to-draw book. This is the first step of drawing {}: {}. \
        Draw only what this step describes, keeping lines thick and clean.",
        subject, step_text
    )
}

/// Image-edit prompt for every later frame. The prior frame travels alongside
/// this text; the edit must be additive.
pub fn edit_frame(step_text: &str) -> String {
    format!(
        "Add to this children's line drawing without changing or removing \
        anything already drawn: {}. Keep the same simple black-line style on \
        the white background.",
        step_text
    )
}

/// Models routinely wrap JSON replies in Markdown code fences.
pub fn strip_code_fences(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else {
        s.to_string()
    }
}
