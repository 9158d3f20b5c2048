//! Text extraction: raw note → [`AdimeDocument`], never failing.
//!
//! Two tiers. The remote tier asks a chat model to fill a JSON template and
//! validates what comes back; the rule-based tier in
//! [`crate::pipeline::fallback`] needs nothing but the text. Every remote
//! failure (no credential, API error, timeout, prose instead of JSON, JSON
//! missing sections) lands on the rule-based tier. There are no retries:
//! one remote attempt, then the fallback.

use crate::config::PipelineConfig;
use crate::error::AdimeError;
use crate::output::{ExtractionMethod, ExtractionOutcome};
use crate::pipeline::fallback::extract_fallback;
use crate::pipeline::llm::{resolve_backend, CompletionBackend};
use crate::pipeline::parse::parse_document;
use crate::progress::ProgressCallback;
use crate::prompts::{extraction_user_prompt, DEFAULT_SYSTEM_PROMPT};
use crate::schema::AdimeDocument;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Turns note text into a structured document.
pub struct TextExtractor {
    backend: Option<Arc<dyn CompletionBackend>>,
    system_prompt: String,
    timeout: Duration,
    progress: Option<ProgressCallback>,
}

impl TextExtractor {
    /// Build an extractor from configuration.
    ///
    /// A provider that cannot be constructed is logged and treated like a
    /// missing credential.
    pub fn new(config: &PipelineConfig) -> Self {
        let backend = match resolve_backend(config) {
            Ok(backend) => backend,
            Err(e) => {
                warn!("{}; using rule-based extraction", e);
                None
            }
        };
        Self::with_backend(backend, config)
    }

    /// Build an extractor around an explicit backend (`None` = rule-based only).
    pub fn with_backend(
        backend: Option<Arc<dyn CompletionBackend>>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            backend,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            timeout: Duration::from_secs(config.api_timeout_secs),
            progress: config.progress_callback.clone(),
        }
    }

    /// Whether a remote call will be attempted.
    pub fn is_remote(&self) -> bool {
        self.backend.is_some()
    }

    /// Extract a document. Always succeeds.
    pub async fn extract(&self, note: &str) -> AdimeDocument {
        self.extract_with_outcome(note).await.document
    }

    /// Extract a document and report which tier produced it.
    pub async fn extract_with_outcome(&self, note: &str) -> ExtractionOutcome {
        if let Some(ref cb) = self.progress {
            cb.on_extraction_start(note.len());
        }

        let outcome = match self.backend {
            None => fallback(note, "no credentials configured".to_string()),
            Some(_) if note.trim().is_empty() => fallback(note, "empty note".to_string()),
            Some(ref backend) => match self.extract_remote(backend.as_ref(), note).await {
                Ok(document) => ExtractionOutcome {
                    document,
                    method: ExtractionMethod::Remote,
                },
                Err(e) => {
                    warn!("Remote extraction failed: {}; using rule-based parser", e);
                    fallback(note, e.to_string())
                }
            },
        };

        let items = outcome.document.action_items().len();
        info!("Extracted note via {} ({} action items)", outcome.method, items);
        if let Some(ref cb) = self.progress {
            cb.on_extraction_complete(&outcome.method, items);
        }
        outcome
    }

    async fn extract_remote(
        &self,
        backend: &dyn CompletionBackend,
        note: &str,
    ) -> Result<AdimeDocument, AdimeError> {
        let user = extraction_user_prompt(note);
        let payload = tokio::time::timeout(self.timeout, backend.complete(&self.system_prompt, &user))
            .await
            .map_err(|_| AdimeError::ApiTimeout {
                secs: self.timeout.as_secs(),
            })??;
        parse_document(&payload)
    }
}

fn fallback(note: &str, reason: String) -> ExtractionOutcome {
    ExtractionOutcome {
        document: extract_fallback(note),
        method: ExtractionMethod::Fallback { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOTE: &str = "ASSESSMENT: Tired, low ferritin.\nDIAGNOSIS: Iron deficiency.\n\
INTERVENTION:\n1. Eat lentils three times a week\n2. Pair spinach with citrus\n\
MONITORING: Recheck ferritin in 8 weeks.";

    const REMOTE_JSON: &str = r#"{
        "assessment": {"summary": "I feel tired and my iron is low.", "labs": ["Ferritin 8"]},
        "diagnosis": {"summary": "Not enough iron", "problems": ["Low iron intake"]},
        "intervention": {"summary": "More iron-rich foods", "action_items": [
            {"title": "Lentils", "description": "I will eat lentils three times a week.",
             "visualization_prompt": "A bowl of lentils"}
        ]},
        "monitoring": {"follow_up": "Ferritin in 8 weeks", "metrics": ["Ferritin"], "timeline": "8 weeks"}
    }"#;

    struct ScriptedBackend {
        reply: Result<String, String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn err(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, AdimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(user.contains("ADIME NOTE"));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply
                .clone()
                .map_err(|message| AdimeError::LlmApiError { message })
        }
    }

    fn extractor(backend: Option<Arc<ScriptedBackend>>) -> TextExtractor {
        let config = PipelineConfig::builder()
            .api_timeout_secs(1)
            .build()
            .unwrap();
        TextExtractor::with_backend(
            backend.map(|b| b as Arc<dyn CompletionBackend>),
            &config,
        )
    }

    #[tokio::test]
    async fn injected_provider_drives_remote_extraction() {
        let mock = Arc::new(edgequake_llm::MockProvider::new());
        mock.add_response(REMOTE_JSON).await;
        let config = PipelineConfig::builder().provider(mock).build().unwrap();

        let extractor = TextExtractor::new(&config);
        assert!(extractor.is_remote());
        let outcome = extractor.extract_with_outcome(NOTE).await;
        assert_eq!(outcome.method, ExtractionMethod::Remote);
        assert_eq!(outcome.document.monitoring.follow_up, "Ferritin in 8 weeks");
    }

    #[tokio::test]
    async fn remote_json_is_used() {
        let backend = ScriptedBackend::ok(&format!("Here you go:\n```json\n{REMOTE_JSON}\n```"));
        let outcome = extractor(Some(backend.clone())).extract_with_outcome(NOTE).await;
        assert_eq!(outcome.method, ExtractionMethod::Remote);
        assert_eq!(outcome.document.diagnosis.problems, vec!["Low iron intake"]);
        assert_eq!(outcome.document.action_items().len(), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refusal_falls_back() {
        let backend = ScriptedBackend::ok("Sorry, I can't help with that.");
        let outcome = extractor(Some(backend)).extract_with_outcome(NOTE).await;
        assert!(outcome.method.is_fallback());
        assert_eq!(outcome.document.diagnosis.summary, "Iron deficiency.");
        assert_eq!(outcome.document.action_items().len(), 2);
    }

    #[tokio::test]
    async fn schema_violation_falls_back() {
        let backend = ScriptedBackend::ok(r#"{"assessment": {"summary": "only one"}}"#);
        let outcome = extractor(Some(backend)).extract_with_outcome(NOTE).await;
        match outcome.method {
            ExtractionMethod::Fallback { reason } => assert!(reason.contains("diagnosis")),
            other => panic!("expected fallback, got {other}"),
        }
        assert_eq!(outcome.document.monitoring.follow_up, "Recheck ferritin in 8 weeks.");
    }

    #[tokio::test]
    async fn api_error_falls_back() {
        let backend = ScriptedBackend::err("HTTP 500");
        let doc = extractor(Some(backend)).extract(NOTE).await;
        assert_eq!(doc.assessment.summary, "Tired, low ferritin.");
    }

    #[tokio::test]
    async fn slow_backend_times_out_into_fallback() {
        let backend = Arc::new(ScriptedBackend {
            reply: Ok(REMOTE_JSON.to_string()),
            delay: Some(Duration::from_secs(5)),
            calls: AtomicUsize::new(0),
        });
        let outcome = extractor(Some(backend)).extract_with_outcome(NOTE).await;
        match outcome.method {
            ExtractionMethod::Fallback { reason } => assert!(reason.contains("timed out")),
            other => panic!("expected fallback, got {other}"),
        }
    }

    #[tokio::test]
    async fn no_backend_never_calls_out() {
        let ext = extractor(None);
        assert!(!ext.is_remote());
        let outcome = ext.extract_with_outcome(NOTE).await;
        assert!(outcome.method.is_fallback());
        assert_eq!(outcome.document.intervention.action_items[0].title, "Eat lentils three times...");
    }

    #[tokio::test]
    async fn dev_mode_config_skips_backend() {
        let config = PipelineConfig::builder()
            .api_key("sk-test")
            .dev_mode(true)
            .build()
            .unwrap();
        let ext = TextExtractor::new(&config);
        assert!(!ext.is_remote());
        let doc = ext.extract(NOTE).await;
        for key in crate::schema::SECTION_KEYS {
            assert!(serde_json::to_value(&doc).unwrap().get(key).is_some());
        }
    }

    #[tokio::test]
    async fn blank_note_skips_remote_call() {
        let backend = ScriptedBackend::ok(REMOTE_JSON);
        let outcome = extractor(Some(backend.clone())).extract_with_outcome("   ").await;
        assert!(outcome.method.is_fallback());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
