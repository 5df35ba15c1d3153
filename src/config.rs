//! Tunable constants for the detector and per-call options.
//!
//! [`DetectorConfig`] carries the heuristic constants the stages are
//! calibrated with; they depend on the camera and label stock, so they can be
//! overridden from a TOML file. [`DetectOptions`] is what a single `detect`
//! call accepts.

use crate::error::DetectError;
use crate::models::{ProgressCallback, ProgressEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    // Loader
    /// Images shorter than this are upscaled before any other processing (default: 1000).
    pub min_working_height: u32,

    // Deskew
    /// Largest rotation tried in either direction, in degrees (default: 6.0).
    pub deskew_max_angle: f32,
    /// Search step in degrees (default: 0.5).
    pub deskew_step: f32,
    /// The angle search runs on a copy no larger than this on its long side (default: 480).
    pub deskew_search_dim: u32,
    /// Margin kept around the ink extent when cropping after deskew (default: 24).
    pub crop_margin: u32,

    // Enhancement
    /// Lower/upper histogram percentiles for the page-level contrast stretch (default: 5/95).
    pub stretch_low: f32,
    pub stretch_high: f32,
    /// Tighter percentiles used on line ROIs (default: 3/97).
    pub roi_stretch_low: f32,
    pub roi_stretch_high: f32,
    /// Adaptive threshold window as a fraction of ROI height (default: 0.5).
    pub adaptive_window_ratio: f32,
    /// Offset subtracted from the local mean (default: 10).
    pub adaptive_offset: i32,
    /// Buffers whose darkest and lightest levels are closer than this hold no ink (default: 24).
    pub min_contrast: u8,

    // Segmentation
    /// A row is in a line band if its ink count exceeds this fraction of the width (default: 0.02).
    pub row_ink_ratio: f32,
    /// Bands shorter than this are noise (default: 8).
    pub min_line_height: u32,
    /// Expected height of one text line at working resolution (default: 60).
    pub nominal_line_height: u32,
    /// Bands taller than `nominal_line_height * split_factor` are re-examined for gaps (default: 1.8).
    pub split_factor: f32,
    /// Inside a tall band, rows below this fraction of the band's peak count are gaps (default: 0.15).
    pub split_valley_ratio: f32,
    /// Bands separated by fewer rows than this are merged (default: 4).
    pub merge_gap: u32,
    /// Number of dense-column hypotheses besides the full-width pass (default: 2).
    pub column_hypotheses: usize,
    /// Width of each column crop as a fraction of image width (default: 0.6).
    pub column_width_ratio: f32,
    /// Minimum distance between chosen column centres as a fraction of width (default: 0.2).
    pub column_separation_ratio: f32,
    /// A column of a line ROI counts as ink if its ink share exceeds this (default: 0.03).
    pub trim_ink_ratio: f32,
    /// Padding added on both sides after trimming (default: 12).
    pub trim_padding: u32,

    // Grouping
    /// ROIs whose vertical centres differ by less than this belong to one line (default: 4).
    pub group_tolerance: u32,

    // Recognition
    /// Canonical ROI height fed to the recognizer (default: 64).
    pub roi_height: u32,
    /// White quiet zone added around every variant (default: 16).
    pub quiet_zone: u32,
    /// Resolution hint passed to the recognizer (default: 300).
    pub dpi_hint: u32,

    // Sequence format
    /// Fixed numeric prefix every asset sequence starts with (default: "04").
    pub code_prefix: String,
    /// Digits allowed after the prefix (default: 9..=14).
    pub min_body_digits: usize,
    pub max_body_digits: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_working_height: 1000,
            deskew_max_angle: 6.0,
            deskew_step: 0.5,
            deskew_search_dim: 480,
            crop_margin: 24,
            stretch_low: 5.0,
            stretch_high: 95.0,
            roi_stretch_low: 3.0,
            roi_stretch_high: 97.0,
            adaptive_window_ratio: 0.5,
            adaptive_offset: 10,
            min_contrast: 24,
            row_ink_ratio: 0.02,
            min_line_height: 8,
            nominal_line_height: 60,
            split_factor: 1.8,
            split_valley_ratio: 0.15,
            merge_gap: 4,
            column_hypotheses: 2,
            column_width_ratio: 0.6,
            column_separation_ratio: 0.2,
            trim_ink_ratio: 0.03,
            trim_padding: 12,
            group_tolerance: 4,
            roi_height: 64,
            quiet_zone: 16,
            dpi_hint: 300,
            code_prefix: "04".to_string(),
            min_body_digits: 9,
            max_body_digits: 14,
        }
    }
}

impl DetectorConfig {
    /// Load a config from a TOML file; absent keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, DetectError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DetectError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, DetectError> {
        toml::from_str(text).map_err(|e| DetectError::Config(e.to_string()))
    }
}

/// Options for a single `detect` call
#[derive(Clone)]
pub struct DetectOptions {
    pub on_progress: Option<ProgressCallback>,
    pub batch_size: usize,
    pub turbo: bool,
    pub max_lines: Option<usize>,
    /// Dump intermediate images here (must be empty or absent)
    pub debug_dir: Option<PathBuf>,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            on_progress: None,
            batch_size: 4,
            turbo: false,
            max_lines: None,
            debug_dir: None,
        }
    }
}

impl fmt::Debug for DetectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectOptions")
            .field("on_progress", &self.on_progress.is_some())
            .field("batch_size", &self.batch_size)
            .field("turbo", &self.turbo)
            .field("max_lines", &self.max_lines)
            .field("debug_dir", &self.debug_dir)
            .finish()
    }
}

impl DetectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_turbo(mut self, turbo: bool) -> Self {
        self.turbo = turbo;
        self
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = Some(max_lines);
        self
    }

    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    pub fn with_progress(mut self, callback: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.on_progress {
            callback(event);
        }
    }
}
