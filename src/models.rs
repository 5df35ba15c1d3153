use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Rectangle into a source buffer, in that buffer's pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LineBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl LineBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Vertical centre, used to match the same physical line across column hypotheses
    pub fn center_y(&self) -> u32 {
        self.y + self.height / 2
    }
}

/// One recognizer invocation's output on one image variant
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub raw_text: String,
    pub digits: String,
    pub confidence: f32,
}

impl Candidate {
    pub fn new(raw_text: impl Into<String>, confidence: f32) -> Self {
        let raw_text = raw_text.into();
        let digits = raw_text.chars().filter(|c| c.is_ascii_digit()).collect();
        Self {
            raw_text,
            digits,
            confidence: confidence.clamp(0.0, 100.0),
        }
    }
}

/// A validated digit sequence with its aggregated confidence
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceResult {
    pub sequence: String,
    pub confidence: f32,
}

/// Decoded `CODE.YEAR` form of a validated sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssetCode {
    pub code: u32,
    pub year: u8,
}

impl AssetCode {
    /// Digits holding the serial number at the end of the sequence
    pub const CODE_DIGITS: usize = 5;

    /// Decode the year at `[-10..-8]` and the trailing serial.
    /// Returns `None` for sequences that are too short or not all digits.
    pub fn decode(sequence: &str) -> Option<Self> {
        let bytes = sequence.as_bytes();
        if bytes.len() < 10 || !bytes.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let n = bytes.len();
        let year = sequence[n - 10..n - 8].parse().ok()?;
        let code = sequence[n - Self::CODE_DIGITS..].parse().ok()?;
        Some(Self { code, year })
    }
}

impl fmt::Display for AssetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.code, self.year)
    }
}

/// Diagnostics accompanying the recovered codes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub total_lines: usize,
    pub kept_lines: usize,
    pub avg_confidence: Option<f32>,
    pub duration_ms: u64,
    pub dropped_indices: Vec<usize>,
    pub variants_tried_per_line: usize,
}

/// The only externally observable artifact of a `detect` call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineResult {
    pub codes: Vec<String>,
    pub stats: PipelineStats,
}

impl PipelineResult {
    pub fn asset_codes(&self) -> Vec<AssetCode> {
        self.codes.iter().filter_map(|c| AssetCode::decode(c)).collect()
    }
}

/// Named stage of a `detect` call, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    DeskewCrop,
    Normalize,
    Segment,
    Recognize,
    Vote,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::DeskewCrop => "deskew_crop",
            Phase::Normalize => "normalize",
            Phase::Segment => "segment",
            Phase::Recognize => "recognize",
            Phase::Vote => "vote",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current: usize,
    pub total: usize,
    pub detail: Option<String>,
}

impl ProgressEvent {
    pub fn new(phase: Phase, current: usize, total: usize) -> Self {
        Self {
            phase,
            current,
            total,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
