//! ONNX Runtime backend for the skin-lesion classifier.
//!
//! Loads an image classifier exported to ONNX (e.g. the Keras EfficientNet
//! model via `tf2onnx`) that takes a `[1, H, W, 3]` float tensor and returns
//! `[1, N]` class scores.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::{Tensor, ValueType};
use tracing::info;

use crate::classifier::ProbabilityModel;
use crate::error::{ClassifyError, ConfigError};
use crate::preprocess::ImageTensor;

/// A pool of ONNX Runtime sessions over one model file.
///
/// `Session::run` needs exclusive access, so each session sits behind its own
/// mutex and calls are spread round-robin across the pool.
pub struct OnnxClassifier {
    sessions: Vec<Mutex<Session>>,
    next: AtomicUsize,
    input_shape: Option<Vec<i64>>,
    output_width: usize,
}

impl OnnxClassifier {
    /// Load `model_path` into `pool_size` sessions (at least one).
    ///
    /// If the model does not declare a static output width, one probe
    /// inference on a zero tensor of `(height, width)` discovers it.
    pub fn load(
        model_path: &Path,
        pool_size: usize,
        (height, width): (u32, u32),
    ) -> Result<Self, ConfigError> {
        if !model_path.exists() {
            return Err(ConfigError::ModelNotFound(model_path.to_path_buf()));
        }

        let pool_size = pool_size.max(1);
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .div_ceil(pool_size);

        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let session = Session::builder()
                .map_err(|e| load_error(model_path, e))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| load_error(model_path, e))?
                .with_intra_threads(threads)
                .map_err(|e| load_error(model_path, e))?
                .commit_from_file(model_path)
                .map_err(|e| load_error(model_path, e))?;
            sessions.push(session);
        }

        let input_shape = tensor_shape(sessions[0].inputs()[0].dtype());
        let declared_width = tensor_shape(sessions[0].outputs()[0].dtype())
            .and_then(|shape| shape.last().copied())
            .and_then(|d| if d > 0 { Some(d as usize) } else { None });

        let mut classifier = Self {
            sessions: sessions.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
            input_shape,
            output_width: declared_width.unwrap_or(0),
        };

        if declared_width.is_none() {
            let probe = ImageTensor::from_nhwc(
                vec![0.0; height as usize * width as usize * 3],
                height as usize,
                width as usize,
            );
            classifier.output_width = classifier
                .infer(&probe)
                .map_err(|e| load_error(model_path, e))?
                .len();
        }

        info!(
            sessions = pool_size,
            threads_per_session = threads,
            classes = classifier.output_width,
            input = ?classifier.input_shape,
            model = %model_path.display(),
            "loaded classifier model"
        );
        Ok(classifier)
    }

    fn infer(&self, tensor: &ImageTensor) -> Result<Vec<f32>, ClassifyError> {
        let shape = tensor.shape().map(|d| d as i64);
        let input = Tensor::from_array((shape, tensor.data().to_vec().into_boxed_slice()))
            .map_err(inference_error)?;

        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[idx]
            .lock()
            .map_err(|_| ClassifyError::Inference("session mutex poisoned".into()))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(inference_error)?;

        let (output_shape, output_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;
        let dims: &[i64] = output_shape;
        if dims.first().is_some_and(|&b| b != 1) {
            return Err(ClassifyError::Inference(format!(
                "unexpected output shape {dims:?}, expected batch of 1"
            )));
        }

        Ok(output_data.to_vec())
    }
}

impl ProbabilityModel for OnnxClassifier {
    fn output_width(&self) -> usize {
        self.output_width
    }

    fn input_shape(&self) -> Option<&[i64]> {
        self.input_shape.as_deref()
    }

    fn run(&self, tensor: &ImageTensor) -> Result<Vec<f32>, ClassifyError> {
        self.infer(tensor)
    }
}

fn tensor_shape(value_type: &ValueType) -> Option<Vec<i64>> {
    match value_type {
        ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect()),
        _ => None,
    }
}

fn load_error(path: &Path, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::ModelLoad {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn inference_error(err: impl std::fmt::Display) -> ClassifyError {
    ClassifyError::Inference(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelRegistry;
    use crate::preprocess::{ImagePreprocessor, PreprocessConfig};
    use crate::{ClassifierService, OutputActivation};
    use std::path::PathBuf;

    fn model_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("models")
            .join("efficientnet")
            .join("model.onnx")
    }

    fn require_model() -> PathBuf {
        let path = model_path();
        if !path.exists() {
            panic!(
                "Model not found. Export the Keras model to ONNX:\n  \
                 python -m tf2onnx.convert --keras efficientnet.keras \
                 --output models/efficientnet/model.onnx"
            );
        }
        path
    }

    #[test]
    fn missing_model_is_a_config_error() {
        let err = OnnxClassifier::load(Path::new("does/not/exist.onnx"), 1, (240, 240))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::ModelNotFound(_)));
    }

    #[test]
    #[ignore = "requires models/efficientnet/model.onnx"]
    fn load_model() {
        let clf = OnnxClassifier::load(&require_model(), 1, (240, 240)).unwrap();
        assert_eq!(clf.output_width(), 10);
    }

    #[test]
    #[ignore = "requires models/efficientnet/model.onnx"]
    fn classify_blank_image() {
        let clf = OnnxClassifier::load(&require_model(), 2, (240, 240)).unwrap();
        let svc = ClassifierService::new(
            clf,
            LabelRegistry::skin_lesions(),
            (240, 240),
            OutputActivation::Probabilities,
        )
        .unwrap();

        let pre = ImagePreprocessor::new(PreprocessConfig::default());
        let rgb = image::RgbImage::new(240, 240);
        let probs = svc.predict(&pre.to_tensor(&rgb)).unwrap();

        assert_eq!(probs.len(), 10);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-3, "expected a distribution, got sum {sum}");
    }
}
