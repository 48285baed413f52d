//! Inference layer: image preprocessing, ONNX Runtime classification, ranking,
//! and structured LLM lookups.

pub mod archive;
pub mod classifier;
pub mod disease_info;
pub mod error;
pub mod labels;
pub mod llm;
pub mod pipeline;
pub mod preprocess;
pub mod ranking;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;

pub use archive::UploadArchive;
pub use classifier::{ClassifierService, ClassifierSlot, OutputActivation, ProbabilityModel};
pub use disease_info::{DiseaseInfoError, DiseaseInfoService};
pub use error::{ClassifyError, ConfigError, PreprocessError, RankingError};
pub use labels::{LabelRegistry, SKIN_LESION_LABELS};
pub use llm::{GeminiClient, GeminiConfig, LlmError, StructuredLlm};
pub use pipeline::{PipelineError, PredictionPipeline, Stage, StageError};
pub use preprocess::{ImagePreprocessor, ImageTensor, Normalization, PreprocessConfig};
pub use ranking::rank;
