//! Configuration for the note-to-report pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built
//! once at process start (via [`PipelineConfig::builder()`] or
//! [`PipelineConfig::from_env()`]) and passed by reference to every stage.
//! Whether the extractor talks to a remote model or goes straight to the
//! rule-based parser is decided by this value alone, so tests can flip it
//! without touching the environment.

use crate::error::AdimeError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::progress::ProgressCallback;

/// Hard upper bound on illustrations per note.
pub const MAX_IMAGES: usize = 3;

/// Configuration for a note-to-report conversion.
///
/// # Example
/// ```rust
/// use adime2pdf::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .api_key("sk-test")
///     .temperature(0.1)
///     .static_dir("/srv/app/static")
///     .build()
///     .unwrap();
/// assert!(config.has_credentials());
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Credential for the remote extraction and image services.
    ///
    /// `None` disables every network call: extraction goes straight to the
    /// rule-based parser and every illustration is the placeholder.
    pub api_key: Option<String>,

    /// Placeholder mode: behave as if no credential were configured.
    pub dev_mode: bool,

    /// LLM provider name passed to the provider factory. Default: "openai".
    pub provider_name: String,

    /// Chat model used for extraction. Default: "gpt-4o".
    pub model: String,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for extraction. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the extraction response may use. Default: 4096.
    pub max_tokens: usize,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Timeout for the extraction call in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Base URL of the OpenAI-compatible image API.
    pub image_api_base: String,

    /// Image model. Default: "dall-e-3".
    pub image_model: String,

    /// Requested image size. Default: "1024x1024".
    pub image_size: String,

    /// Timeout per image call in seconds. Default: 60.
    pub image_timeout_secs: u64,

    /// Number of illustrated action items, capped at [`MAX_IMAGES`].
    pub max_images: usize,

    /// Directory served under `static_url_prefix`. Default: "static".
    pub static_dir: PathBuf,

    /// URL prefix the static directory is mounted at. Default: "/static".
    pub static_url_prefix: String,

    /// Directory root-relative asset paths are resolved against.
    /// Default: the process working directory.
    pub working_dir: PathBuf,

    /// HTML-to-PDF engine binary. Default: "weasyprint".
    pub pdf_engine: PathBuf,

    /// Timeout for one PDF render in seconds. Default: 120.
    pub render_timeout_secs: u64,

    /// Keep the sanitised HTML next to each rendered PDF. Default: false.
    pub keep_debug_html: bool,

    /// Optional stage-progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            dev_mode: false,
            provider_name: "openai".to_string(),
            model: "gpt-4o".to_string(),
            provider: None,
            temperature: 0.2,
            max_tokens: 4096,
            system_prompt: None,
            api_timeout_secs: 60,
            image_api_base: "https://api.openai.com/v1".to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            image_timeout_secs: 60,
            max_images: MAX_IMAGES,
            static_dir: PathBuf::from("static"),
            static_url_prefix: "/static".to_string(),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            pdf_engine: PathBuf::from("weasyprint"),
            render_timeout_secs: 120,
            keep_debug_html: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("dev_mode", &self.dev_mode)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("image_model", &self.image_model)
            .field("max_images", &self.max_images)
            .field("static_dir", &self.static_dir)
            .field("working_dir", &self.working_dir)
            .field("pdf_engine", &self.pdf_engine)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a configuration from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `OPENAI_API_KEY` | `api_key` |
    /// | `ADIME_DEV_MODE` | `dev_mode` (`1`, `true`, `yes`) |
    /// | `ADIME_MODEL` | `model` |
    /// | `ADIME_STATIC_DIR` | `static_dir` |
    /// | `ADIME_PDF_ENGINE` | `pdf_engine` |
    pub fn from_env() -> Result<Self, AdimeError> {
        Self::builder().apply_env().build()
    }

    /// The configured API key, if it is non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// Whether remote calls may be attempted at all.
    ///
    /// An injected `provider` counts as a credential for extraction; the
    /// image backend still needs `api_key`.
    pub fn has_credentials(&self) -> bool {
        !self.dev_mode && (self.provider.is_some() || self.api_key().is_some())
    }

    /// `static_dir`, anchored at `working_dir` when relative.
    pub fn static_root(&self) -> PathBuf {
        self.working_dir.join(&self.static_dir)
    }

    /// Directory generated illustrations are written to.
    pub fn image_dir(&self) -> PathBuf {
        self.static_root().join("generated_images")
    }

    /// Directory rendered PDFs are written to.
    pub fn pdf_dir(&self) -> PathBuf {
        self.static_root().join("pdfs")
    }

    /// Web path of a file stored in [`Self::image_dir`].
    pub fn image_url(&self, file_name: &str) -> String {
        format!(
            "{}/generated_images/{}",
            self.static_url_prefix.trim_end_matches('/'),
            file_name
        )
    }

    /// Web path of the placeholder illustration.
    pub fn placeholder_image_url(&self) -> String {
        self.image_url(PLACEHOLDER_FILE_NAME)
    }

    /// On-disk path of the placeholder illustration.
    pub fn placeholder_image_path(&self) -> PathBuf {
        self.image_dir().join(PLACEHOLDER_FILE_NAME)
    }

    /// Number of illustrations to request, never above [`MAX_IMAGES`].
    pub fn image_limit(&self) -> usize {
        self.max_images.min(MAX_IMAGES)
    }
}

/// File name of the placeholder illustration inside the image directory.
pub const PLACEHOLDER_FILE_NAME: &str = "placeholder.png";

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn dev_mode(mut self, v: bool) -> Self {
        self.config.dev_mode = v;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn image_api_base(mut self, url: impl Into<String>) -> Self {
        self.config.image_api_base = url.into();
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.config.image_model = model.into();
        self
    }

    pub fn image_size(mut self, size: impl Into<String>) -> Self {
        self.config.image_size = size.into();
        self
    }

    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = secs;
        self
    }

    pub fn max_images(mut self, n: usize) -> Self {
        self.config.max_images = n.min(MAX_IMAGES);
        self
    }

    pub fn static_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.static_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn static_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.static_url_prefix = prefix.into();
        self
    }

    pub fn working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.working_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn pdf_engine(mut self, engine: impl AsRef<Path>) -> Self {
        self.config.pdf_engine = engine.as_ref().to_path_buf();
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn keep_debug_html(mut self, v: bool) -> Self {
        self.config.keep_debug_html = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Overlay values found in the process environment.
    pub fn apply_env(mut self) -> Self {
        if let Some(key) = env_non_empty("OPENAI_API_KEY") {
            self.config.api_key = Some(key);
        }
        if let Some(flag) = env_non_empty("ADIME_DEV_MODE") {
            self.config.dev_mode = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(model) = env_non_empty("ADIME_MODEL") {
            self.config.model = model;
        }
        if let Some(dir) = env_non_empty("ADIME_STATIC_DIR") {
            self.config.static_dir = PathBuf::from(dir);
        }
        if let Some(engine) = env_non_empty("ADIME_PDF_ENGINE") {
            self.config.pdf_engine = PathBuf::from(engine);
        }
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, AdimeError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 || c.image_timeout_secs == 0 || c.render_timeout_secs == 0 {
            return Err(AdimeError::InvalidConfig(
                "Timeouts must be at least 1 second".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(AdimeError::InvalidConfig("Model must not be empty".into()));
        }
        if !c.static_url_prefix.starts_with('/') {
            return Err(AdimeError::InvalidConfig(format!(
                "Static URL prefix must be root-relative, got '{}'",
                c.static_url_prefix
            )));
        }
        if !c.working_dir.is_absolute() {
            return Err(AdimeError::InvalidConfig(format!(
                "Working directory must be absolute, got '{}'",
                c.working_dir.display()
            )));
        }
        Ok(self.config)
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_favour_determinism() {
        let config = PipelineConfig::default();
        assert!((0.1..=0.2).contains(&config.temperature));
        assert_eq!(config.api_timeout_secs, 60);
        assert_eq!(config.max_images, 3);
        assert!(!config.has_credentials());
    }

    #[test]
    fn dev_mode_disables_credentials() {
        let config = PipelineConfig::builder()
            .api_key("sk-test")
            .dev_mode(true)
            .build()
            .unwrap();
        assert!(!config.has_credentials());
    }

    #[test]
    fn blank_key_is_no_key() {
        let config = PipelineConfig::builder().api_key("   ").build().unwrap();
        assert!(!config.has_credentials());
    }

    #[test]
    fn max_images_never_exceeds_cap() {
        let config = PipelineConfig::builder().max_images(10).build().unwrap();
        assert_eq!(config.image_limit(), MAX_IMAGES);

        let mut raw = PipelineConfig::default();
        raw.max_images = 8;
        assert_eq!(raw.image_limit(), MAX_IMAGES);
    }

    #[test]
    fn image_urls_follow_prefix() {
        let config = PipelineConfig::builder()
            .static_url_prefix("/assets/")
            .build()
            .unwrap();
        assert_eq!(config.image_url("a.png"), "/assets/generated_images/a.png");
        assert_eq!(
            config.placeholder_image_url(),
            "/assets/generated_images/placeholder.png"
        );
    }

    #[test]
    fn injected_provider_counts_as_credential() {
        let provider: Arc<dyn LLMProvider> = Arc::new(edgequake_llm::MockProvider::new());
        let config = PipelineConfig::builder()
            .provider(Arc::clone(&provider))
            .build()
            .unwrap();
        assert!(config.has_credentials());
        assert!(config.api_key().is_none());

        let config = PipelineConfig::builder()
            .provider(provider)
            .dev_mode(true)
            .build()
            .unwrap();
        assert!(!config.has_credentials());
    }

    #[test]
    fn static_root_anchored_at_working_dir() {
        let config = PipelineConfig::builder()
            .working_dir("/srv/app")
            .static_dir("public")
            .build()
            .unwrap();
        assert_eq!(config.static_root(), PathBuf::from("/srv/app/public"));
        assert_eq!(
            config.placeholder_image_path(),
            PathBuf::from("/srv/app/public/generated_images/placeholder.png")
        );

        let config = PipelineConfig::builder()
            .working_dir("/srv/app")
            .static_dir("/var/lib/adime")
            .build()
            .unwrap();
        assert_eq!(config.pdf_dir(), PathBuf::from("/var/lib/adime/pdfs"));
    }

    #[test]
    fn relative_working_dir_rejected() {
        let err = PipelineConfig::builder()
            .working_dir("relative/dir")
            .build()
            .unwrap_err();
        assert!(matches!(err, AdimeError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(PipelineConfig::builder().api_timeout_secs(0).build().is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let config = PipelineConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{:?}", config);
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
