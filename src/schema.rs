//! Structured representation of a parsed ADIME note.
//!
//! Every section is a fixed record of the fields the report renderer knows
//! about, plus an `extensions` bag that captures any additional keys the
//! extraction service chose to return (`short_term_goals`, `patient_info`,
//! …). Unknown keys therefore never leak into the typed fields, and nothing
//! the model produced is silently dropped either.
//!
//! Decoding is tolerant in the places language models are sloppy: `null`
//! text becomes `""`, `null` lists become empty, numeric lab values are
//! stringified, and a malformed action item is skipped on its own rather
//! than failing the whole document.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Top-level keys that a remote extraction response must contain.
pub const SECTION_KEYS: [&str; 4] = ["assessment", "diagnosis", "intervention", "monitoring"];

/// Open-ended mapping for keys outside the canonical schema.
pub type Extensions = BTreeMap<String, Value>;

/// Patient status at intake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentData {
    #[serde(default, deserialize_with = "text_or_empty")]
    pub summary: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub weight: Option<String>,
    #[serde(default, deserialize_with = "optional_text_list")]
    pub labs: Option<Vec<String>>,
    #[serde(default, deserialize_with = "optional_text")]
    pub current_intake: Option<String>,
    #[serde(flatten)]
    pub extensions: Extensions,
}

/// Nutrition problems identified by the dietitian.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisData {
    #[serde(default, deserialize_with = "text_or_empty")]
    pub summary: String,
    #[serde(default, deserialize_with = "text_list")]
    pub problems: Vec<String>,
    #[serde(flatten)]
    pub extensions: Extensions,
}

/// One discrete, illustratable recommendation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    #[serde(deserialize_with = "required_text")]
    pub title: String,
    #[serde(deserialize_with = "required_text")]
    pub description: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub visualization_prompt: Option<String>,
    #[serde(flatten)]
    pub extensions: Extensions,
}

/// The recommended plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterventionData {
    #[serde(default, deserialize_with = "text_or_empty")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient_action_items")]
    pub action_items: Vec<ActionItem>,
    #[serde(flatten)]
    pub extensions: Extensions,
}

/// Follow-up and how progress will be measured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringData {
    #[serde(default, deserialize_with = "text_or_empty")]
    pub follow_up: String,
    #[serde(default, deserialize_with = "optional_text_list")]
    pub metrics: Option<Vec<String>>,
    #[serde(default, deserialize_with = "optional_text")]
    pub timeline: Option<String>,
    #[serde(flatten)]
    pub extensions: Extensions,
}

/// A complete ADIME note: exactly one of each section.
///
/// Produced once by the text extractor and only borrowed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdimeDocument {
    pub assessment: AssessmentData,
    pub diagnosis: DiagnosisData,
    pub intervention: InterventionData,
    pub monitoring: MonitoringData,
    #[serde(flatten)]
    pub extensions: Extensions,
}

impl AdimeDocument {
    /// Action items in source order.
    pub fn action_items(&self) -> &[ActionItem] {
        &self.intervention.action_items
    }

    /// The first `max` action items, i.e. the ones that get illustrations.
    pub fn illustrated_items(&self, max: usize) -> &[ActionItem] {
        let items = self.action_items();
        &items[..items.len().min(max)]
    }

    /// True when no section carries any text.
    pub fn is_blank(&self) -> bool {
        self.assessment.summary.trim().is_empty()
            && self.diagnosis.summary.trim().is_empty()
            && self.intervention.summary.trim().is_empty()
            && self.monitoring.follow_up.trim().is_empty()
            && self.intervention.action_items.is_empty()
    }
}

/// An illustration generated for one action item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub title: String,
    pub description: String,
    /// Web path (`/static/...`) or absolute URL.
    pub image_path: String,
}

// ── Tolerant decoders ────────────────────────────────────────────────────

/// Flatten any JSON value into display text. `None` for null/blank.
pub(crate) fn value_to_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_to_text)
            .collect::<Vec<_>>()
            .join("; "),
        Value::Object(_) => value.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn value_to_text_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_to_text).collect(),
        other => value_to_text(other).into_iter().collect(),
    }
}

fn text_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(value_to_text(&v).unwrap_or_default())
}

fn optional_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(value_to_text(&v))
}

fn required_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Value::deserialize(d)?;
    value_to_text(&v).ok_or_else(|| serde::de::Error::custom("required text field is empty"))
}

fn text_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(value_to_text_list(&v))
}

fn optional_text_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    let v = Value::deserialize(d)?;
    if v.is_null() {
        Ok(None)
    } else {
        Ok(Some(value_to_text_list(&v)))
    }
}

fn lenient_action_items<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ActionItem>, D::Error> {
    let v = Value::deserialize(d)?;
    let raw = match v {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        single @ Value::Object(_) => vec![single],
        other => {
            warn!("Ignoring action_items of unexpected type: {}", other);
            return Ok(Vec::new());
        }
    };

    Ok(raw
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value::<ActionItem>(item) {
            Ok(action) => Some(action),
            Err(e) => {
                warn!("Dropping action item {}: {}", i + 1, e);
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_json() -> Value {
        json!({
            "assessment": {
                "summary": "I came in because of rising blood sugar.",
                "weight": "92 kg (BMI 31)",
                "labs": ["HbA1c 7.9%", 142],
                "current_intake": null
            },
            "diagnosis": { "summary": null, "problems": ["Too many sugary drinks"] },
            "intervention": {
                "summary": "Swap drinks and add vegetables.",
                "short_term_goals": ["Water with every meal"],
                "action_items": [
                    { "title": "Swap soda", "description": "I will drink water instead of soda." },
                    { "title": null, "description": "no title" },
                    { "title": "Half plate veg", "description": "I will fill half my plate with vegetables.",
                      "visualization_prompt": "A plate half full of vegetables" }
                ]
            },
            "monitoring": { "follow_up": "Come back in 4 weeks", "metrics": null, "timeline": "4 weeks" },
            "patient_info": { "age": 54 }
        })
    }

    #[test]
    fn tolerant_decoding_of_model_output() {
        let doc: AdimeDocument = serde_json::from_value(full_json()).unwrap();

        assert_eq!(doc.assessment.labs.as_deref(), Some(&["HbA1c 7.9%".to_string(), "142".to_string()][..]));
        assert_eq!(doc.assessment.current_intake, None);
        assert_eq!(doc.diagnosis.summary, "");
        assert_eq!(doc.monitoring.metrics, None);
        assert_eq!(doc.monitoring.timeline.as_deref(), Some("4 weeks"));
    }

    #[test]
    fn invalid_action_item_is_dropped_alone() {
        let doc: AdimeDocument = serde_json::from_value(full_json()).unwrap();
        let titles: Vec<&str> = doc.action_items().iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Swap soda", "Half plate veg"]);
        assert_eq!(
            doc.action_items()[1].visualization_prompt.as_deref(),
            Some("A plate half full of vegetables")
        );
    }

    #[test]
    fn unknown_keys_land_in_extensions() {
        let doc: AdimeDocument = serde_json::from_value(full_json()).unwrap();
        assert!(doc.extensions.contains_key("patient_info"));
        assert!(doc.intervention.extensions.contains_key("short_term_goals"));
        assert!(!doc.intervention.extensions.contains_key("action_items"));
    }

    #[test]
    fn serialised_default_keeps_every_key() {
        let v = serde_json::to_value(AdimeDocument::default()).unwrap();
        for key in SECTION_KEYS {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert!(v["assessment"].get("weight").unwrap().is_null());
        assert!(v["monitoring"].get("timeline").unwrap().is_null());
        assert_eq!(v["diagnosis"]["problems"], json!([]));
    }

    #[test]
    fn missing_section_fails_decoding() {
        let mut v = full_json();
        v.as_object_mut().unwrap().remove("monitoring");
        assert!(serde_json::from_value::<AdimeDocument>(v).is_err());
    }

    #[test]
    fn illustrated_items_caps_count() {
        let mut doc = AdimeDocument::default();
        for i in 0..5 {
            doc.intervention.action_items.push(ActionItem {
                title: format!("t{i}"),
                description: format!("d{i}"),
                ..Default::default()
            });
        }
        assert_eq!(doc.illustrated_items(3).len(), 3);
        assert_eq!(doc.illustrated_items(3)[2].title, "t2");
        assert_eq!(doc.illustrated_items(10).len(), 5);
    }

    #[test]
    fn blank_document_detected() {
        assert!(AdimeDocument::default().is_blank());
    }
}
