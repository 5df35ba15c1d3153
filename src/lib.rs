pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;

pub use config::{DetectOptions, DetectorConfig};
pub use detection::loader::ImageInput;
pub use detection::ocr::{OcrsRecognizer, RawRecognition, RecognitionParams, Recognizer};
pub use detection::Detector;
pub use error::DetectError;
pub use models::{AssetCode, Phase, PipelineResult, PipelineStats, ProgressEvent};
pub use pipeline::{DebugConfig, Pipeline, PipelineContext, PipelineData, PipelineStep};
