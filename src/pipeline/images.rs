//! Illustrations for action items.
//!
//! The first few action items (never more than [`crate::config::MAX_IMAGES`])
//! each get one generated image. Requests run concurrently and results are
//! recombined in action-item order, so the Nth [`ImageInfo`] always belongs
//! to the Nth item. A failed request costs only its own slot: that item
//! points at the placeholder image and its siblings are unaffected.
//!
//! With no credential, or in placeholder mode, no backend exists and every
//! slot is the placeholder without touching the network.

use crate::config::PipelineConfig;
use crate::error::{AdimeError, ImageError};
use crate::progress::ProgressCallback;
use crate::prompts::{illustration_brief, recommendation_prompt};
use crate::schema::{ActionItem, AdimeDocument, ImageInfo};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::join_all;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Turns a prompt into encoded image bytes.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// `index` is the 1-based slot, used for error reporting only.
    async fn generate(&self, index: usize, prompt: &str) -> Result<Vec<u8>, ImageError>;
}

// ── OpenAI-style images endpoint ─────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    b64_json: Option<String>,
    url: Option<String>,
}

/// Backend for `POST {api_base}/images/generations`.
pub struct OpenAiImageBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    size: String,
}

impl OpenAiImageBackend {
    pub fn new(config: &PipelineConfig) -> Result<Self, AdimeError> {
        let api_key = config
            .api_key()
            .map(str::to_string)
            .ok_or_else(|| AdimeError::ProviderNotConfigured {
                provider: "openai-images".to_string(),
                hint: "Set OPENAI_API_KEY to enable illustrations.".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.image_timeout_secs))
            .build()
            .map_err(|e| AdimeError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/images/generations",
                config.image_api_base.trim_end_matches('/')
            ),
            api_key,
            model: config.image_model.clone(),
            size: config.image_size.clone(),
        })
    }

    async fn fetch(&self, index: usize, url: &str) -> Result<Vec<u8>, ImageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ImageError::ApiFailed {
                index,
                detail: format!("fetching generated image: {}", e),
            })?;
        let bytes = response.bytes().await.map_err(|e| ImageError::ApiFailed {
            index,
            detail: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageBackend for OpenAiImageBackend {
    async fn generate(&self, index: usize, prompt: &str) -> Result<Vec<u8>, ImageError> {
        let request = GenerationRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: &self.size,
            response_format: "b64_json",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ImageError::ApiFailed {
                index,
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ImageError::ApiFailed {
                index,
                detail: format!("HTTP {}", response.status()),
            });
        }

        let body: GenerationResponse =
            response.json().await.map_err(|e| ImageError::ApiFailed {
                index,
                detail: format!("unexpected response body: {}", e),
            })?;

        match body.data.into_iter().next() {
            Some(GeneratedImage {
                b64_json: Some(b64),
                ..
            }) => STANDARD.decode(b64.trim()).map_err(|e| ImageError::StoreFailed {
                index,
                detail: format!("invalid base64: {}", e),
            }),
            Some(GeneratedImage { url: Some(url), .. }) => self.fetch(index, &url).await,
            _ => Err(ImageError::ApiFailed {
                index,
                detail: "no image data returned".to_string(),
            }),
        }
    }
}

// ── Generator ────────────────────────────────────────────────────────────

/// Produces one [`ImageInfo`] per illustrated action item.
pub struct ImageGenerator {
    backend: Option<Arc<dyn ImageBackend>>,
    config: PipelineConfig,
    progress: Option<ProgressCallback>,
}

impl ImageGenerator {
    /// Build a generator from configuration. No API key → placeholders only.
    pub fn new(config: &PipelineConfig) -> Self {
        let remote = !config.dev_mode && config.api_key().is_some();
        let backend: Option<Arc<dyn ImageBackend>> = if remote {
            match OpenAiImageBackend::new(config) {
                Ok(backend) => Some(Arc::new(backend)),
                Err(e) => {
                    warn!("{}; illustrations will use the placeholder", e);
                    None
                }
            }
        } else {
            None
        };
        Self::with_backend(backend, config)
    }

    /// Build a generator around an explicit backend (`None` = placeholders only).
    pub fn with_backend(backend: Option<Arc<dyn ImageBackend>>, config: &PipelineConfig) -> Self {
        Self {
            backend,
            config: config.clone(),
            progress: config.progress_callback.clone(),
        }
    }

    /// Illustrate the leading action items of `doc`, in order.
    pub async fn generate(&self, doc: &AdimeDocument) -> Vec<ImageInfo> {
        let items = doc.illustrated_items(self.config.image_limit());
        let total = items.len();
        if total == 0 {
            debug!("No action items to illustrate");
            return Vec::new();
        }

        let Some(ref backend) = self.backend else {
            info!("Image generation disabled; using placeholder for {} items", total);
            return items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    self.notify_complete(i + 1, total, true);
                    self.placeholder(item)
                })
                .collect();
        };

        info!("Generating {} illustrations", total);
        let tasks = items
            .iter()
            .enumerate()
            .map(|(i, item)| self.illustrate(backend.as_ref(), i + 1, total, item));
        join_all(tasks).await
    }

    async fn illustrate(
        &self,
        backend: &dyn ImageBackend,
        index: usize,
        total: usize,
        item: &ActionItem,
    ) -> ImageInfo {
        if let Some(ref cb) = self.progress {
            cb.on_image_start(index, total);
        }

        let prompt = illustration_brief(&item_prompt(item));
        let secs = self.config.image_timeout_secs;
        let result = match tokio::time::timeout(
            Duration::from_secs(secs),
            backend.generate(index, &prompt),
        )
        .await
        {
            Ok(Ok(bytes)) => self.store(index, &bytes).await,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ImageError::Timeout { index, secs }),
        };

        match result {
            Ok(url) => {
                debug!("Image {}/{} stored at {}", index, total, url);
                self.notify_complete(index, total, false);
                ImageInfo {
                    title: item.title.clone(),
                    description: item.description.clone(),
                    image_path: url,
                }
            }
            Err(e) => {
                warn!("{}; using placeholder", e);
                self.notify_complete(index, total, true);
                self.placeholder(item)
            }
        }
    }

    /// Write image bytes under a fresh name and return the web path.
    async fn store(&self, index: usize, bytes: &[u8]) -> Result<String, ImageError> {
        let store_err = |detail: String| ImageError::StoreFailed { index, detail };

        let format =
            image::guess_format(bytes).map_err(|e| store_err(format!("not an image: {}", e)))?;
        let extension = format.extensions_str().first().copied().unwrap_or("png");

        let dir = self.config.image_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_err(format!("{}: {}", dir.display(), e)))?;

        let file_name = format!("{}.{}", uuid::Uuid::new_v4(), extension);
        let path = dir.join(&file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| store_err(format!("{}: {}", path.display(), e)))?;

        Ok(self.config.image_url(&file_name))
    }

    fn placeholder(&self, item: &ActionItem) -> ImageInfo {
        ImageInfo {
            title: item.title.clone(),
            description: item.description.clone(),
            image_path: self.config.placeholder_image_url(),
        }
    }

    fn notify_complete(&self, index: usize, total: usize, placeholder: bool) {
        if let Some(ref cb) = self.progress {
            cb.on_image_complete(index, total, placeholder);
        }
    }
}

/// The item's own visualization prompt, or one derived from its description.
fn item_prompt(item: &ActionItem) -> String {
    match item.visualization_prompt.as_deref().map(str::trim) {
        Some(prompt) if !prompt.is_empty() => prompt.to_string(),
        _ => recommendation_prompt(&item.description),
    }
}

// ── Placeholder asset ────────────────────────────────────────────────────

const PLACEHOLDER_SIZE: u32 = 512;
const PLACEHOLDER_BORDER: u32 = 8;

/// Make sure the placeholder PNG exists. Idempotent.
pub fn ensure_placeholder(config: &PipelineConfig) -> Result<PathBuf, AdimeError> {
    let path = config.placeholder_image_path();
    if path.is_file() {
        return Ok(path);
    }
    let dir = config.image_dir();
    std::fs::create_dir_all(&dir).map_err(|e| AdimeError::OutputWriteFailed {
        path: dir.clone(),
        source: e,
    })?;

    let png = placeholder_png()?;
    write_atomic(&path, &png)?;
    info!("Created placeholder image at {}", path.display());
    Ok(path)
}

/// A soft grey tile with a darker frame, encoded as PNG.
fn placeholder_png() -> Result<Vec<u8>, AdimeError> {
    let fill = Rgba([236, 240, 241, 255]);
    let frame = Rgba([189, 195, 199, 255]);
    let edge = PLACEHOLDER_SIZE - PLACEHOLDER_BORDER;
    let img = RgbaImage::from_fn(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, |x, y| {
        if x < PLACEHOLDER_BORDER || y < PLACEHOLDER_BORDER || x >= edge || y >= edge {
            frame
        } else {
            fill
        }
    });

    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| AdimeError::Internal(format!("encoding placeholder: {}", e)))?;
    Ok(buf)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AdimeError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let write_err = |source: std::io::Error| AdimeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    std::io::Write::write_all(&mut tmp, bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ReportProgressCallback;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeImages {
        fail_index: Option<usize>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageBackend for FakeImages {
        async fn generate(&self, index: usize, prompt: &str) -> Result<Vec<u8>, ImageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(prompt.contains("dietitian"));
            // Later slots finish first to exercise reordering.
            tokio::time::sleep(Duration::from_millis(30 / index as u64)).await;
            if Some(index) == self.fail_index {
                return Err(ImageError::ApiFailed {
                    index,
                    detail: "HTTP 429".into(),
                });
            }
            placeholder_png().map_err(|e| ImageError::StoreFailed {
                index,
                detail: e.to_string(),
            })
        }
    }

    #[derive(Default)]
    struct Counter {
        placeholders: AtomicUsize,
        completes: AtomicUsize,
    }

    impl ReportProgressCallback for Counter {
        fn on_image_complete(&self, _index: usize, _total: usize, placeholder: bool) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            if placeholder {
                self.placeholders.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn doc_with(n: usize) -> AdimeDocument {
        let mut doc = AdimeDocument::default();
        for i in 0..n {
            doc.intervention.action_items.push(ActionItem {
                title: format!("Item {i}"),
                description: format!("Description {i}"),
                visualization_prompt: (i % 2 == 0).then(|| format!("Picture {i}")),
                ..Default::default()
            });
        }
        doc
    }

    fn config_in(dir: &Path) -> PipelineConfig {
        PipelineConfig::builder()
            .static_dir(dir.join("static"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn images_follow_item_order_with_cap() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeImages {
            fail_index: None,
            calls: AtomicUsize::new(0),
        });
        let generator = ImageGenerator::with_backend(Some(backend.clone()), &config_in(tmp.path()));

        let images = generator.generate(&doc_with(5)).await;
        let titles: Vec<&str> = images.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Item 0", "Item 1", "Item 2"]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        for info in &images {
            assert!(info.image_path.starts_with("/static/generated_images/"));
            assert!(!info.image_path.ends_with("placeholder.png"));
        }
    }

    #[tokio::test]
    async fn one_failure_only_costs_its_slot() {
        let tmp = tempfile::tempdir().unwrap();
        let counter = Arc::new(Counter::default());
        let config = PipelineConfig::builder()
            .static_dir(tmp.path().join("static"))
            .progress_callback(counter.clone())
            .build()
            .unwrap();
        let backend = Arc::new(FakeImages {
            fail_index: Some(2),
            calls: AtomicUsize::new(0),
        });
        let images = ImageGenerator::with_backend(Some(backend), &config)
            .generate(&doc_with(3))
            .await;

        assert_eq!(images.len(), 3);
        assert!(!images[0].image_path.ends_with("placeholder.png"));
        assert_eq!(images[1].image_path, "/static/generated_images/placeholder.png");
        assert!(!images[2].image_path.ends_with("placeholder.png"));
        assert_eq!(counter.completes.load(Ordering::SeqCst), 3);
        assert_eq!(counter.placeholders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_backend_means_placeholders() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let generator = ImageGenerator::new(&config);
        let images = generator.generate(&doc_with(2)).await;
        assert_eq!(images.len(), 2);
        assert!(images
            .iter()
            .all(|i| i.image_path == config.placeholder_image_url()));
        assert!(!config.image_dir().exists());
    }

    #[tokio::test]
    async fn empty_intervention_yields_no_images() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeImages {
            fail_index: None,
            calls: AtomicUsize::new(0),
        });
        let images = ImageGenerator::with_backend(Some(backend.clone()), &config_in(tmp.path()))
            .generate(&AdimeDocument::default())
            .await;
        assert!(images.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    struct FixedBytes(Vec<u8>);

    #[async_trait]
    impl ImageBackend for FixedBytes {
        async fn generate(&self, _index: usize, _prompt: &str) -> Result<Vec<u8>, ImageError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn stored_file_keeps_detected_format() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let jpeg = b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00\x01\x01\x00".to_vec();
        let images = ImageGenerator::with_backend(Some(Arc::new(FixedBytes(jpeg))), &config)
            .generate(&doc_with(1))
            .await;

        assert!(images[0].image_path.ends_with(".jpg"), "{}", images[0].image_path);
        let file_name = images[0].image_path.rsplit('/').next().unwrap();
        assert!(config.image_dir().join(file_name).is_file());
    }

    #[tokio::test]
    async fn non_image_bytes_fall_back_to_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let backend = Arc::new(FixedBytes(b"<html>rate limited</html>".to_vec()));
        let images = ImageGenerator::with_backend(Some(backend), &config)
            .generate(&doc_with(1))
            .await;
        assert_eq!(images[0].image_path, config.placeholder_image_url());
    }

    #[test]
    fn item_prompt_prefers_own_prompt() {
        let doc = doc_with(2);
        assert_eq!(item_prompt(&doc.action_items()[0]), "Picture 0");
        assert!(item_prompt(&doc.action_items()[1]).ends_with("Description 1"));
    }

    #[test]
    fn placeholder_created_once() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let path = ensure_placeholder(&config).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);

        let again = ensure_placeholder(&config).unwrap();
        assert_eq!(again, path);
    }
}
