use crate::config::DetectorConfig;
use crate::detection::{deskew, preprocessing, segmentation};
use crate::models::Phase;
use crate::pipeline::{PipelineContext, PipelineData, PipelineStep};
use anyhow::Result;
use image::{imageops, DynamicImage};
use tracing::debug;

/// Grayscale, straighten and crop the page to its ink
pub struct DeskewCropStep {
    pub max_angle: f32,
    pub step: f32,
    pub search_dim: u32,
    pub crop_margin: u32,
    pub min_contrast: u8,
}

impl DeskewCropStep {
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self {
            max_angle: config.deskew_max_angle,
            step: config.deskew_step,
            search_dim: config.deskew_search_dim,
            crop_margin: config.crop_margin,
            min_contrast: config.min_contrast,
        }
    }
}

impl PipelineStep for DeskewCropStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let gray = preprocessing::to_grayscale(&item.image);
            let angle = deskew::estimate_skew(&gray, self.max_angle, self.step, self.search_dim, self.min_contrast);
            let straight = deskew::deskew(&gray, angle, self.max_angle);
            let cropped = deskew::crop_to_content(&straight, self.crop_margin, self.min_contrast);
            debug!(angle, width = cropped.width(), height = cropped.height(), "page deskewed");

            result.push(PipelineData {
                image: DynamicImage::ImageLuma8(cropped),
                skew: Some(angle),
                ..item
            });
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Deskew Crop"
    }

    fn phase(&self) -> Phase {
        Phase::DeskewCrop
    }
}

/// Smooth and contrast-stretch the page
pub struct NormalizeStep {
    pub low_pct: f32,
    pub high_pct: f32,
}

impl PipelineStep for NormalizeStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let gray = item.image.to_luma8();
            let blurred = preprocessing::box_blur(&gray);
            let stretched = preprocessing::contrast_stretch(&blurred, self.low_pct, self.high_pct);
            result.push(PipelineData {
                image: DynamicImage::ImageLuma8(stretched),
                ..item
            });
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Normalize"
    }

    fn phase(&self) -> Phase {
        Phase::Normalize
    }
}

/// Split each page into line ROIs - one item per line per column hypothesis
pub struct SegmentStep {
    pub config: DetectorConfig,
    pub max_lines: Option<usize>,
}

impl PipelineStep for SegmentStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let gray = item.image.to_luma8();
            let rois = segmentation::segment_lines(&gray, &self.config, self.max_lines);
            debug!(rois = rois.len(), "page segmented");

            for roi in rois {
                let b = roi.bbox;
                let cropped = imageops::crop_imm(&gray, b.x, b.y, b.width, b.height).to_image();
                let mut line = PipelineData::from_region(DynamicImage::ImageLuma8(cropped), b, roi.hypothesis);
                line.skew = item.skew;
                result.push(line);
            }
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Line Segmentation"
    }

    fn phase(&self) -> Phase {
        Phase::Segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn page() -> DynamicImage {
        let mut img = GrayImage::from_pixel(900, 700, Luma([255]));
        for top in [200, 400] {
            for i in 0..10 {
                draw_filled_rect_mut(&mut img, Rect::at(120 + i * 60, top).of_size(40, 70), Luma([10]));
            }
        }
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn page_is_cut_into_line_items() {
        let config = DetectorConfig::default();
        let context = PipelineContext::default();
        let data = vec![PipelineData::from_image(page())];

        let data = DeskewCropStep::from_config(&config).process(data, &context).unwrap();
        assert_eq!(data.len(), 1);
        assert!(data[0].skew.unwrap().abs() <= 0.5);
        assert!(data[0].image.width() < 900);

        let data = NormalizeStep { low_pct: 5.0, high_pct: 95.0 }.process(data, &context).unwrap();
        let lines = SegmentStep { config, max_lines: None }.process(data, &context).unwrap();

        // two lines, each seen by the full-width pass and both column hypotheses
        assert_eq!(lines.len(), 6);
        for line in &lines {
            let bbox = line.bbox.unwrap();
            assert_eq!((line.image.width(), line.image.height()), (bbox.width, bbox.height));
            assert!(line.hypothesis.unwrap() < 3);
        }
    }
}
