use crate::models::{LineBox, Phase, ProgressCallback, ProgressEvent};
use anyhow::Result;
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Data that flows through the pipeline.
/// Each PipelineData is either a whole page or one line ROI cut from it.
#[derive(Clone)]
pub struct PipelineData {
    /// The image data (grayscale once the first step has run)
    pub image: DynamicImage,

    /// Region of the normalized page this item was cut from (None means the whole page)
    pub bbox: Option<LineBox>,

    /// Column hypothesis that produced this ROI
    pub hypothesis: Option<usize>,

    /// Rotation applied by the deskew step, in degrees
    pub skew: Option<f32>,
}

impl PipelineData {
    /// Create PipelineData for a full image
    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            image,
            bbox: None,
            hypothesis: None,
            skew: None,
        }
    }

    /// Create PipelineData for a line ROI of a page
    pub fn from_region(image: DynamicImage, bbox: LineBox, hypothesis: usize) -> Self {
        Self {
            image,
            bbox: Some(bbox),
            hypothesis: Some(hypothesis),
            skew: None,
        }
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Context available to all pipeline steps
#[derive(Clone, Default)]
pub struct PipelineContext {
    pub debug: Option<DebugConfig>,
    pub progress: Option<ProgressCallback>,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Process data and return transformed data
    /// Steps can split data (1 → many), filter (many → fewer), or transform (many → many)
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>>;

    /// Human-readable name for this step (used in logs and debug folder names)
    fn name(&self) -> &str;

    /// Phase reported to progress listeners while this step runs
    fn phase(&self) -> Phase;
}

/// Composable pipeline builder
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.context.progress = progress;
        self
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Helper method to add a step from a Box (for convenience)
    pub fn add_step_boxed(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.steps.push(Arc::from(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the steps in order on an input image
    pub fn run(&self, input: DynamicImage) -> Result<Vec<PipelineData>> {
        self.save_debug_images("00_input", std::slice::from_ref(&input));

        let mut data = vec![PipelineData::from_image(input)];
        let total = self.steps.len();

        for (step_idx, step) in self.steps.iter().enumerate() {
            debug!(step = step.name(), items = data.len(), "running step");
            data = step.process(data, &self.context)?;
            debug!(step = step.name(), items = data.len(), "step finished");

            let dir_name = format!("{:02}_{}", step_idx + 1, step.name().to_lowercase().replace(' ', "_"));
            let images: Vec<DynamicImage> = if self.context.debug.is_some() {
                data.iter().map(|d| d.image.clone()).collect()
            } else {
                Vec::new()
            };
            self.save_debug_images(&dir_name, &images);

            if let Some(progress) = &self.context.progress {
                progress(
                    ProgressEvent::new(step.phase(), step_idx + 1, total)
                        .with_detail(format!("{}: {} items", step.name(), data.len())),
                );
            }
        }

        Ok(data)
    }

    /// Write images as NN.png into a step folder. Failures only cost the dump.
    fn save_debug_images(&self, dir_name: &str, images: &[DynamicImage]) {
        let Some(debug_config) = &self.context.debug else {
            return;
        };
        let step_dir = debug_config.output_dir.join(dir_name);
        if let Err(e) = std::fs::create_dir_all(&step_dir) {
            warn!("Failed to create debug directory {}: {}", step_dir.display(), e);
            return;
        }
        for (idx, image) in images.iter().enumerate() {
            let output_path = step_dir.join(format!("{:02}.png", idx + 1));
            if let Err(e) = image.save(&output_path) {
                warn!("Failed to save debug image {}: {}", output_path.display(), e);
            }
        }
        debug!("Debug: saved {} images to {}/", images.len(), dir_name);
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::sync::Mutex;

    struct Split(usize);

    impl PipelineStep for Split {
        fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
            let mut out = Vec::new();
            for item in data {
                for h in 0..self.0 {
                    out.push(PipelineData::from_region(item.image.clone(), LineBox::new(0, 0, 1, 1), h));
                }
            }
            Ok(out)
        }

        fn name(&self) -> &str {
            "Split Lines"
        }

        fn phase(&self) -> Phase {
            Phase::Segment
        }
    }

    fn page() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([255])))
    }

    #[test]
    fn steps_can_fan_out_and_report_progress() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: ProgressCallback = Arc::new(move |e| sink.lock().unwrap().push(e));

        let pipeline = Pipeline::new()
            .add_step(Arc::new(Split(2)))
            .add_step_boxed(Box::new(Split(3)))
            .with_progress(Some(callback));
        let out = pipeline.run(page()).unwrap();

        assert_eq!(out.len(), 6);
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].current, 2);
        assert_eq!(events[1].total, 2);
        assert_eq!(events[1].phase, Phase::Segment);
    }

    #[test]
    fn debug_dump_writes_step_folders() {
        let dir = tempfile::TempDir::new().unwrap();
        let out_dir = dir.path().join("dump");
        let pipeline = Pipeline::new().add_step(Arc::new(Split(2))).with_debug(out_dir.clone()).unwrap();
        pipeline.run(page()).unwrap();

        assert!(out_dir.join("00_input/01.png").exists());
        assert!(out_dir.join("01_split_lines/02.png").exists());
        assert!(Pipeline::new().with_debug(out_dir).is_err());
    }
}
