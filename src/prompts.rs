//! Prompts for note extraction and illustration.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: the schema template the model is asked to
//!    fill lives next to the system instruction that governs it.
//!
//! 2. **Testability**: unit tests inspect prompts directly without a model.
//!
//! Callers can override the system prompt via
//! [`crate::config::PipelineConfig::system_prompt`].

/// Default system instruction for the extraction call.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a dietitian's assistant that turns ADIME nutrition notes (Assessment, Diagnosis, Intervention, Monitoring/Evaluation) into patient-friendly structured data.

Follow these rules precisely:

1. OUTPUT
   - Respond with a single JSON object matching the requested structure
   - Do NOT add commentary before or after the JSON
   - Use null for absent text fields and [] for absent lists; never invent data

2. LANGUAGE
   - Use plain language a patient understands
   - Write goals and recommendations in the first person ("I will ...")
   - Preserve the note's own terminology for foods, labs and measurements
   - Do NOT include normal ranges with individual lab values

3. RECOMMENDATIONS
   - Make every action item specific and practical for this patient
   - Tie each action item to a problem named in the assessment or diagnosis"#;

/// JSON structure the model must fill in. Embedded verbatim in the user turn.
pub const SCHEMA_TEMPLATE: &str = r#"{
  "assessment": {
    "summary": "Why I came in and the key findings, in clear language",
    "weight": "Weight and BMI if mentioned, or null",
    "labs": ["Lab results without normal ranges"],
    "current_intake": "Current diet/intake in simple terms, or null"
  },
  "diagnosis": {
    "summary": "Plain-language explanation of the nutrition issues",
    "problems": ["Nutrition problems without medical jargon"]
  },
  "intervention": {
    "summary": "Overall summary of the nutrition plan",
    "action_items": [
      {
        "title": "Clear, actionable title",
        "description": "First-person explanation with specific foods and quantities",
        "visualization_prompt": "Prompt for an illustration of this goal"
      }
    ]
  },
  "monitoring": {
    "follow_up": "Next steps and follow-up plans",
    "metrics": ["How success will be measured"],
    "timeline": "Timeline for monitoring, or null"
  }
}"#;

/// Build the user turn for the extraction call.
pub fn extraction_user_prompt(note: &str) -> String {
    format!(
        "Parse the following ADIME note into structured JSON.\n\n\
ADIME NOTE:\n\"\"\"\n{}\n\"\"\"\n\n\
Return ONLY a JSON object with the following structure:\n{}",
        note.trim(),
        SCHEMA_TEMPLATE
    )
}

/// Instruction phrase prefixed to rule-based visualization prompts.
pub const VISUALIZATION_PREFIX: &str = "Create a simple, clear infographic for a personal nutritional goal with first-person perspective (I should, I will): ";

/// Instruction phrase used when an action item carries no visualization prompt.
pub const RECOMMENDATION_PREFIX: &str =
    "Create a simple, clear infographic for a nutritional recommendation: ";

/// Characters of description kept in derived prompts.
pub const PROMPT_EXCERPT_CHARS: usize = 100;

/// Visualization prompt for a rule-based action item.
///
/// Paragraph-derived items only keep the first [`PROMPT_EXCERPT_CHARS`]
/// characters of their description.
pub fn visualization_prompt(description: &str, excerpt: bool) -> String {
    if excerpt {
        format!("{}{}", VISUALIZATION_PREFIX, char_prefix(description, PROMPT_EXCERPT_CHARS))
    } else {
        format!("{}{}", VISUALIZATION_PREFIX, description)
    }
}

/// Prompt used for an action item without its own visualization prompt.
pub fn recommendation_prompt(description: &str) -> String {
    format!(
        "{}{}",
        RECOMMENDATION_PREFIX,
        char_prefix(description, PROMPT_EXCERPT_CHARS)
    )
}

/// Wrap an item prompt in the house illustration brief.
pub fn illustration_brief(prompt: &str) -> String {
    format!(
        "Create a professional, clear infographic illustration suitable for a dietitian's patient report.\n\
The image should be:\n\
- Clean, minimalist design with simple icons\n\
- A soft color palette suitable for healthcare\n\
- A clear visual representation of the recommendation\n\
- Free of text overlays (text is added separately)\n\n\
The nutritional recommendation is:\n{}",
        prompt.trim()
    )
}

/// The first `n` characters of `s`, never splitting a code point.
pub(crate) fn char_prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
