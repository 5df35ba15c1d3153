#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from assettag for tests
pub use assettag::{DetectError, DetectOptions, Detector, DetectorConfig};

use std::sync::Arc;

/// Detector with default constants over the given recognizer
pub fn detector_with<R: assettag::Recognizer + 'static>(recognizer: Arc<R>) -> Detector {
    Detector::new(recognizer, DetectorConfig::default()).expect("Failed to create detector")
}
