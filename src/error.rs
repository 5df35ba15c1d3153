use thiserror::Error;

/// Conditions that abort a `detect` call. Everything else is folded into the
/// result's diagnostics.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("invalid detector config: {0}")]
    Config(String),

    #[error("pipeline step failed: {0}")]
    Pipeline(String),
}
