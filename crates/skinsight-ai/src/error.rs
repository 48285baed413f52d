use std::path::PathBuf;

use thiserror::Error;

/// Fatal startup misconfiguration. The service must not accept requests.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("label registry is empty")]
    EmptyLabels,

    #[error("duplicate label {0:?}")]
    DuplicateLabel(String),

    #[error("cannot read labels file {path}: {source}")]
    LabelsFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("failed to load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("model outputs {model} classes but the label registry has {labels}")]
    LabelCountMismatch { model: usize, labels: usize },

    #[error("model expects input {model:?}, preprocessor produces [1, {height}, {width}, 3]")]
    InputShapeMismatch {
        model: Vec<i64>,
        height: u32,
        width: u32,
    },

    #[error("invalid output schema: {0}")]
    Schema(String),
}

/// Failure turning raw bytes into a classifier input tensor.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("could not decode image: {0}")]
    Decode(String),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
}

/// Failure inside the classifier stage.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier model is not loaded")]
    ModelNotLoaded,

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Failure ranking a probability vector.
#[derive(Debug, Error)]
pub enum RankingError {
    #[error("probability vector has {actual} entries but the label registry has {expected}")]
    LabelMismatch { expected: usize, actual: usize },
}
