pub mod deskew;
pub mod grouping;
pub mod loader;
pub mod ocr;
pub mod preprocessing;
pub mod segmentation;
pub mod steps;
pub mod voting;

use crate::config::{DetectOptions, DetectorConfig};
use crate::error::DetectError;
use crate::models::{Phase, PipelineResult, PipelineStats, ProgressEvent, SequenceResult};
use crate::pipeline::Pipeline;
use futures::future::join_all;
use grouping::{group_lines, LineGroup};
use image::{GrayImage, Luma};
use loader::ImageInput;
use ocr::{Alphabet, RecognitionParams, Recognizer, SegmentationMode};
use segmentation::LineRoi;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use steps::{DeskewCropStep, NormalizeStep, SegmentStep};
use tracing::{debug, info, warn};
use voting::SequenceFormat;

/// Main detection orchestrator
pub struct Detector {
    config: DetectorConfig,
    format: SequenceFormat,
    recognizer: Arc<dyn Recognizer>,
    warmed: AtomicBool,
}

impl Detector {
    pub fn new(recognizer: Arc<dyn Recognizer>, config: DetectorConfig) -> Result<Self, DetectError> {
        let format = SequenceFormat::from_config(&config)?;
        Ok(Self {
            config,
            format,
            recognizer,
            warmed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Pay the recognizer's initialization cost ahead of the first `detect`.
    /// Only the first call does any work; failures are logged and ignored.
    pub async fn warm_up(&self) {
        if self.warmed.swap(true, Ordering::SeqCst) {
            return;
        }
        let strip = GrayImage::from_pixel(128, self.config.roi_height.max(1), Luma([255]));
        let params = RecognitionParams {
            alphabet: Alphabet::DigitsOnly,
            mode: SegmentationMode::SingleLine,
            dpi_hint: self.config.dpi_hint,
        };
        let started = Instant::now();
        match self.recognizer.recognize(&strip, &params).await {
            Ok(_) => debug!(elapsed_ms = started.elapsed().as_millis() as u64, "recognizer warmed up"),
            Err(e) => warn!("recognizer warm-up failed: {:#}", e),
        }
    }

    fn pipeline(&self, options: &DetectOptions) -> Pipeline {
        Pipeline::new()
            .with_progress(options.on_progress.clone())
            .add_step_boxed(Box::new(DeskewCropStep::from_config(&self.config)))
            .add_step_boxed(Box::new(NormalizeStep {
                low_pct: self.config.stretch_low,
                high_pct: self.config.stretch_high,
            }))
            .add_step_boxed(Box::new(SegmentStep {
                config: self.config.clone(),
                max_lines: options.max_lines,
            }))
    }

    /// Run the whole pipeline on one image and return the recovered codes
    pub async fn detect(
        &self,
        input: impl Into<ImageInput>,
        options: &DetectOptions,
    ) -> Result<PipelineResult, DetectError> {
        let started = Instant::now();
        let turbo = options.turbo;
        let image = loader::load(input.into(), self.config.min_working_height)?;

        let mut pipeline = self.pipeline(options);
        if let Some(dir) = &options.debug_dir {
            match self.pipeline(options).with_debug(dir.clone()) {
                Ok(debug_pipeline) => pipeline = debug_pipeline,
                Err(e) => warn!("debug output disabled: {:#}", e),
            }
        }
        let items = pipeline
            .run(image)
            .map_err(|e| DetectError::Pipeline(format!("{:#}", e)))?;

        let mut images: HashMap<LineRoi, GrayImage> = HashMap::new();
        for item in items {
            if let (Some(bbox), Some(hypothesis)) = (item.bbox, item.hypothesis) {
                images.insert(LineRoi { hypothesis, bbox }, item.image.to_luma8());
            }
        }
        let rois: Vec<LineRoi> = images.keys().copied().collect();
        let mut groups = group_lines(&rois, self.config.group_tolerance);
        if let Some(max_lines) = options.max_lines {
            groups.truncate(max_lines);
        }
        debug!(rois = rois.len(), groups = groups.len(), "line groups formed");

        let pools = self.recognize_groups(&groups, &images, options).await;

        let total = groups.len();
        let mut codes = Vec::new();
        let mut confidences = Vec::new();
        let mut dropped_indices = Vec::new();
        for (i, (group, pool)) in groups.iter().zip(&pools).enumerate() {
            // Each ROI's winner becomes one candidate of the line-level vote
            let winners: Vec<SequenceResult> = pool.iter().filter_map(|c| voting::resolve(c)).collect();
            match voting::resolve(&winners) {
                Some(line) => {
                    debug!(line = group.index, sequence = %line.sequence, confidence = line.confidence, "line accepted");
                    confidences.push(line.confidence);
                    codes.push(line.sequence);
                }
                None => {
                    debug!(line = group.index, "line dropped");
                    dropped_indices.push(group.index);
                }
            }
            options.emit(ProgressEvent::new(Phase::Vote, i + 1, total));
        }

        let kept_lines = codes.len();
        let avg_confidence = if confidences.is_empty() {
            None
        } else {
            Some(confidences.iter().sum::<f32>() / confidences.len() as f32)
        };
        let codes = voting::dedup_codes(codes);

        let stats = PipelineStats {
            total_lines: total,
            kept_lines,
            avg_confidence,
            duration_ms: started.elapsed().as_millis() as u64,
            dropped_indices,
            variants_tried_per_line: ocr::variants_per_line(turbo),
        };
        info!(
            codes = codes.len(),
            lines = stats.total_lines,
            kept = stats.kept_lines,
            duration_ms = stats.duration_ms,
            "detection finished"
        );
        options.emit(ProgressEvent::new(Phase::Done, 1, 1).with_detail(format!("{} codes", codes.len())));

        Ok(PipelineResult { codes, stats })
    }

    /// Candidates per ROI per group, in group order. Groups run `batch_size`
    /// at a time and each group's ROIs run one after another, so at most
    /// `batch_size` recognizer calls are ever in flight.
    async fn recognize_groups(
        &self,
        groups: &[LineGroup],
        images: &HashMap<LineRoi, GrayImage>,
        options: &DetectOptions,
    ) -> Vec<Vec<Vec<SequenceResult>>> {
        let total = groups.len();
        let completed = AtomicUsize::new(0);
        let mut pools = Vec::with_capacity(total);

        for batch in groups.chunks(options.batch_size.max(1)) {
            let calls = batch.iter().map(|group| {
                let completed = &completed;
                async move {
                    let mut per_roi = Vec::with_capacity(group.members.len());
                    for roi in &group.members {
                        let Some(image) = images.get(roi) else {
                            continue;
                        };
                        let candidates = ocr::recognize_roi(
                            self.recognizer.as_ref(),
                            image,
                            &self.config,
                            &self.format,
                            options.turbo,
                        )
                        .await;
                        per_roi.push(candidates);
                    }
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    options.emit(
                        ProgressEvent::new(Phase::Recognize, done, total)
                            .with_detail(format!("line {}", group.index)),
                    );
                    per_roi
                }
            });
            pools.extend(join_all(calls).await);
        }

        pools
    }
}
