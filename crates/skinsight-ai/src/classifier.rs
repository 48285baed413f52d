//! Classifier service: one loaded model plus its label registry.
//!
//! The service is built once at startup, validated against the preprocessor
//! geometry and the label registry, and then shared read-only. Calls carry no
//! request-scoped state, so concurrent predictions never see each other's
//! tensors.

use std::sync::OnceLock;

use tracing::info;

use crate::error::{ClassifyError, ConfigError};
use crate::labels::LabelRegistry;
use crate::preprocess::ImageTensor;

/// Maximum deviation of a probability vector's sum from 1.
pub const PROBABILITY_TOLERANCE: f32 = 1e-3;

/// An inference backend producing one score per class for a single image.
///
/// Implementations must be safe to call from many threads at once.
pub trait ProbabilityModel: Send + Sync {
    /// Number of scores returned per image.
    fn output_width(&self) -> usize;

    /// Declared input shape (`-1` for dynamic axes), if the backend knows it.
    fn input_shape(&self) -> Option<&[i64]> {
        None
    }

    /// Run the model on one `[1, H, W, 3]` tensor.
    fn run(&self, tensor: &ImageTensor) -> Result<Vec<f32>, ClassifyError>;
}

/// What the model's output vector contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputActivation {
    /// Already a probability distribution (softmax head).
    #[default]
    Probabilities,
    /// Raw logits; softmax is applied after inference.
    Logits,
}

/// A loaded classifier bound to its label registry and input geometry.
pub struct ClassifierService {
    model: Box<dyn ProbabilityModel>,
    labels: LabelRegistry,
    activation: OutputActivation,
    input_height: u32,
    input_width: u32,
}

impl std::fmt::Debug for ClassifierService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierService")
            .field("labels", &self.labels.len())
            .field("activation", &self.activation)
            .field("input", &(self.input_height, self.input_width))
            .finish_non_exhaustive()
    }
}

impl ClassifierService {
    /// Bind a model to its labels, checking the load-time contracts.
    ///
    /// Fails if the model's output width differs from the registry length, or
    /// if its declared input shape cannot accept `[1, height, width, 3]`.
    pub fn new(
        model: impl ProbabilityModel + 'static,
        labels: LabelRegistry,
        (height, width): (u32, u32),
        activation: OutputActivation,
    ) -> Result<Self, ConfigError> {
        if model.output_width() != labels.len() {
            return Err(ConfigError::LabelCountMismatch {
                model: model.output_width(),
                labels: labels.len(),
            });
        }

        if let Some(shape) = model.input_shape()
            && !accepts_input(shape, height, width)
        {
            return Err(ConfigError::InputShapeMismatch {
                model: shape.to_vec(),
                height,
                width,
            });
        }

        info!(
            classes = labels.len(),
            height,
            width,
            ?activation,
            "classifier ready"
        );
        Ok(Self {
            model: Box::new(model),
            labels,
            activation,
            input_height: height,
            input_width: width,
        })
    }

    pub fn labels(&self) -> &LabelRegistry {
        &self.labels
    }

    /// Run inference and return a probability distribution over all classes.
    pub fn predict(&self, tensor: &ImageTensor) -> Result<Vec<f32>, ClassifyError> {
        let expected = [1, self.input_height as usize, self.input_width as usize, 3];
        if tensor.shape() != expected {
            return Err(ClassifyError::Inference(format!(
                "input shape {:?} does not match model input {expected:?}",
                tensor.shape()
            )));
        }

        let raw = self.model.run(tensor)?;
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(ClassifyError::Inference(
                "model produced non-finite scores".into(),
            ));
        }

        match self.activation {
            OutputActivation::Logits => Ok(softmax(&raw)),
            OutputActivation::Probabilities => {
                check_distribution(&raw)?;
                Ok(raw)
            }
        }
    }
}

/// Set-once holder for the process-wide classifier.
///
/// Requests that arrive before [`install`](Self::install) fail with
/// [`ClassifyError::ModelNotLoaded`].
#[derive(Debug, Default)]
pub struct ClassifierSlot {
    cell: OnceLock<ClassifierService>,
}

impl ClassifierSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that is already filled.
    pub fn loaded(service: ClassifierService) -> Self {
        let slot = Self::new();
        let _ = slot.cell.set(service);
        slot
    }

    /// Fill the slot. Returns the service back if one is already installed.
    pub fn install(&self, service: ClassifierService) -> Result<(), ClassifierService> {
        self.cell.set(service)
    }

    pub fn get(&self) -> Result<&ClassifierService, ClassifyError> {
        self.cell.get().ok_or(ClassifyError::ModelNotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn check_distribution(probs: &[f32]) -> Result<(), ClassifyError> {
    if probs.iter().any(|&p| p < 0.0) {
        return Err(ClassifyError::Inference(
            "model produced negative probabilities".into(),
        ));
    }
    let sum: f32 = probs.iter().sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(ClassifyError::Inference(format!(
            "model output sums to {sum}, not a probability distribution"
        )));
    }
    Ok(())
}

fn accepts_input(shape: &[i64], height: u32, width: u32) -> bool {
    let matches = |dim: i64, want: i64| dim < 0 || dim == want;
    shape.len() == 4
        && matches(shape[0], 1)
        && matches(shape[1], i64::from(height))
        && matches(shape[2], i64::from(width))
        && matches(shape[3], 3)
}
