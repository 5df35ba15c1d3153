use crate::config::DetectorConfig;
use crate::detection::preprocessing::{
    adaptive_threshold, add_border, close_strokes, contrast_stretch, otsu_binarize,
};
use crate::detection::voting::{is_valid_sequence, SequenceFormat};
use crate::models::{Candidate, SequenceResult};
use anyhow::Context;
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Characters the recognizer may emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    DigitsOnly,
}

impl Alphabet {
    pub fn chars(&self) -> &'static str {
        match self {
            Alphabet::DigitsOnly => "0123456789",
        }
    }
}

/// Layout assumption the recognizer works under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationMode {
    /// The image holds exactly one line of text
    SingleLine,
    /// Text fragments anywhere in the image
    SparseText,
}

/// Typed per-variant recognizer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognitionParams {
    pub alphabet: Alphabet,
    pub mode: SegmentationMode,
    pub dpi_hint: u32,
}

/// What a recognizer returns for one image
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecognition {
    pub text: String,
    /// Relative ranking signal in `0..=100`, not a probability
    pub confidence: f32,
}

/// Black-box text recognition oracle. It may be slow and may return empty text.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, image: &GrayImage, params: &RecognitionParams) -> anyhow::Result<RawRecognition>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    /// Contrast-stretched grayscale
    Enhanced,
    OtsuClosed,
    AdaptiveClosed,
}

impl VariantKind {
    pub fn for_mode(turbo: bool) -> &'static [VariantKind] {
        if turbo {
            &[VariantKind::Enhanced, VariantKind::OtsuClosed]
        } else {
            &[VariantKind::Enhanced, VariantKind::OtsuClosed, VariantKind::AdaptiveClosed]
        }
    }
}

pub fn segmentation_modes(turbo: bool) -> &'static [SegmentationMode] {
    if turbo {
        &[SegmentationMode::SingleLine]
    } else {
        &[SegmentationMode::SingleLine, SegmentationMode::SparseText]
    }
}

/// Recognizer invocations spent on each ROI
pub fn variants_per_line(turbo: bool) -> usize {
    VariantKind::for_mode(turbo).len() * segmentation_modes(turbo).len()
}

/// Rescale a line ROI to the canonical working height, keeping aspect ratio
pub fn rescale_roi(roi: &GrayImage, height: u32) -> GrayImage {
    if roi.height() == height || roi.height() == 0 {
        return roi.clone();
    }
    let scale = height as f32 / roi.height() as f32;
    let width = ((roi.width() as f32 * scale).round() as u32).max(1);
    imageops::resize(roi, width, height, FilterType::CatmullRom)
}

pub fn build_variant(roi: &GrayImage, kind: VariantKind, config: &DetectorConfig) -> GrayImage {
    let enhanced = contrast_stretch(roi, config.roi_stretch_low, config.roi_stretch_high);
    let variant = match kind {
        VariantKind::Enhanced => enhanced,
        VariantKind::OtsuClosed => close_strokes(&otsu_binarize(&enhanced, config.min_contrast)),
        VariantKind::AdaptiveClosed => {
            let window = ((roi.height() as f32 * config.adaptive_window_ratio) as u32) | 1;
            close_strokes(&adaptive_threshold(&enhanced, window, config.adaptive_offset))
        }
    };
    add_border(&variant, config.quiet_zone)
}

/// Every variant of one ROI, each a freshly allocated buffer
pub fn build_variants(roi: &GrayImage, config: &DetectorConfig, turbo: bool) -> Vec<(VariantKind, GrayImage)> {
    let scaled = rescale_roi(roi, config.roi_height);
    VariantKind::for_mode(turbo)
        .iter()
        .map(|&kind| (kind, build_variant(&scaled, kind, config)))
        .collect()
}

/// Run the recognizer over every variant and mode of one ROI and keep the
/// candidates whose extracted sequence is plausible. Failed calls are skipped.
pub async fn recognize_roi(
    recognizer: &dyn Recognizer,
    roi: &GrayImage,
    config: &DetectorConfig,
    format: &SequenceFormat,
    turbo: bool,
) -> Vec<SequenceResult> {
    let mut accepted = Vec::new();

    for (kind, variant) in build_variants(roi, config, turbo) {
        for &mode in segmentation_modes(turbo) {
            let params = RecognitionParams {
                alphabet: Alphabet::DigitsOnly,
                mode,
                dpi_hint: config.dpi_hint,
            };
            let raw = match recognizer.recognize(&variant, &params).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(?kind, ?mode, "recognizer call failed: {:#}", e);
                    continue;
                }
            };

            let candidate = Candidate::new(raw.text, raw.confidence);
            match format.extract(&candidate.digits) {
                Some(sequence) if is_valid_sequence(&sequence) => accepted.push(SequenceResult {
                    sequence,
                    confidence: candidate.confidence,
                }),
                _ => debug!(?kind, ?mode, text = %candidate.raw_text, "candidate discarded"),
            }
        }
    }

    accepted
}

/// Initialize the ocrs engine from a model directory, restricted to `alphabet`
pub fn init_ocr_engine(model_dir: &Path, alphabet: Alphabet) -> anyhow::Result<OcrEngine> {
    let detection_model_path = model_dir.join("text-detection.rten");
    let recognition_model_path = model_dir.join("text-recognition.rten");

    if !detection_model_path.exists() || !recognition_model_path.exists() {
        anyhow::bail!(
            "OCR models not found. Please run: ocrs-cli --help (or download models manually)\n\
             Expected locations:\n  - {}\n  - {}",
            detection_model_path.display(),
            recognition_model_path.display()
        );
    }

    let detection_model = Model::load_file(&detection_model_path)
        .with_context(|| format!("loading {}", detection_model_path.display()))?;
    let recognition_model = Model::load_file(&recognition_model_path)
        .with_context(|| format!("loading {}", recognition_model_path.display()))?;

    let engine = OcrEngine::new(OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        allowed_chars: Some(alphabet.chars().to_string()),
        ..Default::default()
    })?;

    Ok(engine)
}

/// Standard model cache location used by `ocrs-cli`
pub fn default_model_dir() -> anyhow::Result<PathBuf> {
    let home_dir = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
    Ok(Path::new(&home_dir).join(".cache/ocrs"))
}

/// Turn the engine's line-separated output into one candidate string
pub fn interpret_text(text: &str, mode: SegmentationMode) -> RawRecognition {
    let text = match mode {
        SegmentationMode::SingleLine => text.split_whitespace().collect::<String>(),
        SegmentationMode::SparseText => text
            .lines()
            .map(|line| line.split_whitespace().collect::<String>())
            .max_by_key(|line| line.chars().filter(char::is_ascii_digit).count())
            .unwrap_or_default(),
    };

    // ocrs reports no score, so rank by how much of the output is digits
    let total = text.chars().count();
    let digits = text.chars().filter(char::is_ascii_digit).count();
    let confidence = if total == 0 { 0.0 } else { 90.0 * digits as f32 / total as f32 };
    RawRecognition { text, confidence }
}

/// Recognizer backed by the ocrs engine
pub struct OcrsRecognizer {
    model_dir: PathBuf,
    // Initialized on first use; the Arc lets a call release the lock before inference
    engine: Mutex<Option<Arc<OcrEngine>>>,
}

impl OcrsRecognizer {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::with_model_dir(default_model_dir()?))
    }

    pub fn with_model_dir(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            engine: Mutex::new(None),
        }
    }

    fn engine(&self, alphabet: Alphabet) -> anyhow::Result<Arc<OcrEngine>> {
        let mut guard = self
            .engine
            .lock()
            .map_err(|_| anyhow::anyhow!("OCR engine lock poisoned"))?;
        if let Some(engine) = guard.as_ref() {
            return Ok(engine.clone());
        }
        debug!(model_dir = %self.model_dir.display(), "initializing OCR engine");
        let engine = Arc::new(init_ocr_engine(&self.model_dir, alphabet)?);
        *guard = Some(engine.clone());
        Ok(engine)
    }
}

#[async_trait]
impl Recognizer for OcrsRecognizer {
    async fn recognize(&self, image: &GrayImage, params: &RecognitionParams) -> anyhow::Result<RawRecognition> {
        let engine = self.engine(params.alphabet)?;
        let rgb = DynamicImage::ImageLuma8(image.clone()).to_rgb8();

        let text = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            let img_source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
                .map_err(|e| anyhow::anyhow!("invalid OCR input: {:?}", e))?;
            let ocr_input = engine.prepare_input(img_source)?;
            Ok(engine.get_text(&ocr_input)?)
        })
        .await??;

        Ok(interpret_text(&text, params.mode))
    }
}
