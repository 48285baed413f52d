//! Prediction pipeline: one request from uploaded bytes to ranked predictions.
//!
//! ```text
//! Idle → Preprocessing → Inferring → Formatting → Done
//!   └──────────┴──────────────┴───────────┴──→ Failed
//! ```
//!
//! The upload is written to a uniquely named temporary file for the duration
//! of the request. The file is owned by an RAII guard, so it is removed on
//! every exit path: success, error, panic unwind, or the caller dropping the
//! task.

use std::fmt;
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use skinsight_core::Prediction;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::classifier::ClassifierSlot;
use crate::error::{ClassifyError, PreprocessError, RankingError};
use crate::preprocess::ImagePreprocessor;
use crate::ranking::rank;

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Preprocessing,
    Inferring,
    Formatting,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preprocessing => "preprocessing",
            Self::Inferring => "inferring",
            Self::Formatting => "formatting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The underlying fault of a failed stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("upload storage error: {0}")]
    Storage(#[from] io::Error),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Ranking(#[from] RankingError),
}

/// A pipeline failure tagged with the stage that was running.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

/// Preprocessor → classifier → ranking, with scoped upload storage.
pub struct PredictionPipeline {
    preprocessor: ImagePreprocessor,
    classifier: Arc<ClassifierSlot>,
    upload_dir: PathBuf,
}

impl PredictionPipeline {
    pub fn new(
        preprocessor: ImagePreprocessor,
        classifier: Arc<ClassifierSlot>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            preprocessor,
            classifier,
            upload_dir: upload_dir.into(),
        }
    }

    pub fn classifier(&self) -> &ClassifierSlot {
        &self.classifier
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Classify one uploaded image and return the `top_k` ranked predictions.
    pub fn predict(
        &self,
        image: &[u8],
        top_k: NonZeroUsize,
    ) -> Result<Vec<Prediction>, PipelineError> {
        let mut run = Run { stage: Stage::Idle };
        let result = self.execute(image, top_k, &mut run);
        if let Err(e) = &result {
            warn!(stage = %e.stage, error = %e.source, "prediction failed");
        }
        result
    }

    fn execute(
        &self,
        image: &[u8],
        top_k: NonZeroUsize,
        run: &mut Run,
    ) -> Result<Vec<Prediction>, PipelineError> {
        run.enter(Stage::Preprocessing);
        let upload = TransientUpload::stage(&self.upload_dir, image).map_err(|e| run.fail(e))?;
        let bytes = upload.read().map_err(|e| run.fail(e))?;
        let tensor = self
            .preprocessor
            .preprocess(&bytes)
            .map_err(|e| run.fail(e))?;

        run.enter(Stage::Inferring);
        let classifier = self.classifier.get().map_err(|e| run.fail(e))?;
        let probabilities = classifier.predict(&tensor).map_err(|e| run.fail(e))?;

        run.enter(Stage::Formatting);
        let ranked = rank(&probabilities, classifier.labels(), top_k).map_err(|e| run.fail(e))?;

        upload.release();
        run.enter(Stage::Done);
        Ok(ranked)
    }
}

struct Run {
    stage: Stage,
}

impl Run {
    fn enter(&mut self, next: Stage) {
        debug!(from = %self.stage, to = %next, "pipeline transition");
        self.stage = next;
    }

    fn fail(&mut self, err: impl Into<StageError>) -> PipelineError {
        let stage = self.stage;
        self.stage = Stage::Failed;
        PipelineError {
            stage,
            source: err.into(),
        }
    }
}

/// An uploaded image staged on disk; the file is deleted when this is dropped.
struct TransientUpload {
    file: NamedTempFile,
}

impl TransientUpload {
    fn stage(dir: &Path, bytes: &[u8]) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".img")
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        debug!(path = %file.path().display(), bytes = bytes.len(), "staged upload");
        Ok(Self { file })
    }

    fn read(&self) -> io::Result<Vec<u8>> {
        std::fs::read(self.file.path())
    }

    /// Delete the file now, reporting failures instead of ignoring them in `Drop`.
    fn release(self) {
        let path = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            warn!(path = %path.display(), error = %e, "failed to remove staged upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::{BrokenModel, FixedModel, labels};
    use crate::classifier::{ClassifierService, OutputActivation, ProbabilityModel};
    use crate::preprocess::tests::two_bit_grey_tiff;
    use crate::preprocess::{ImageTensor, Normalization, PreprocessConfig};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn k(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(w, h))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn pipeline(model: impl ProbabilityModel + 'static, n: usize, dir: &Path) -> PredictionPipeline {
        let svc =
            ClassifierService::new(model, labels(n), (224, 224), OutputActivation::Probabilities)
                .unwrap();
        PredictionPipeline::new(
            ImagePreprocessor::new(PreprocessConfig {
                width: 224,
                height: 224,
                normalization: Normalization::Raw,
                ..Default::default()
            }),
            Arc::new(ClassifierSlot::loaded(svc)),
            dir,
        )
    }

    fn leftover_files(dir: &Path) -> usize {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    #[test]
    fn uniform_model_top3_in_registry_order() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(FixedModel::uniform(10), 10, dir.path());

        let out = pipe.predict(&png(224, 224), k(3)).unwrap();

        assert_eq!(out.len(), 3);
        let names: Vec<_> = out.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["class_0", "class_1", "class_2"]);
        for p in &out {
            assert!((p.confidence - 10.0).abs() < 1e-3, "{}", p.confidence);
        }
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[test]
    fn upload_dir_is_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("uploads").join("tmp");
        let pipe = pipeline(FixedModel::uniform(2), 2, &nested);

        pipe.predict(&png(10, 10), k(1)).unwrap();
        assert!(nested.is_dir());
        assert_eq!(leftover_files(&nested), 0);
    }

    #[test]
    fn decode_failure_tags_preprocessing_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(FixedModel::uniform(2), 2, dir.path());

        let err = pipe.predict(b"not an image", k(1)).unwrap_err();

        assert_eq!(err.stage, Stage::Preprocessing);
        assert!(matches!(
            err.source,
            StageError::Preprocess(PreprocessError::Decode(_))
        ));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[test]
    fn unsupported_colour_tags_preprocessing_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(FixedModel::uniform(2), 2, dir.path());

        let err = pipe.predict(&two_bit_grey_tiff(), k(1)).unwrap_err();

        assert_eq!(err.stage, Stage::Preprocessing);
        assert!(matches!(
            err.source,
            StageError::Preprocess(PreprocessError::UnsupportedFormat(_))
        ));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[test]
    fn inference_failure_tags_inferring_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(BrokenModel(3), 3, dir.path());

        let err = pipe.predict(&png(32, 32), k(1)).unwrap_err();

        assert_eq!(err.stage, Stage::Inferring);
        assert!(err.to_string().starts_with("inferring failed"));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[test]
    fn model_not_loaded_fails_inferring() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = PredictionPipeline::new(
            ImagePreprocessor::default(),
            Arc::new(ClassifierSlot::new()),
            dir.path(),
        );

        let err = pipe.predict(&png(8, 8), k(1)).unwrap_err();

        assert_eq!(err.stage, Stage::Inferring);
        assert!(matches!(
            err.source,
            StageError::Classify(ClassifyError::ModelNotLoaded)
        ));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    /// Reports one more class than it produces.
    struct ShortModel;

    impl ProbabilityModel for ShortModel {
        fn output_width(&self) -> usize {
            3
        }

        fn run(&self, _tensor: &ImageTensor) -> Result<Vec<f32>, ClassifyError> {
            Ok(vec![0.5, 0.5])
        }
    }

    #[test]
    fn label_mismatch_tags_formatting() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(ShortModel, 3, dir.path());

        let err = pipe.predict(&png(8, 8), k(1)).unwrap_err();

        assert_eq!(err.stage, Stage::Formatting);
        assert!(matches!(
            err.source,
            StageError::Ranking(RankingError::LabelMismatch { .. })
        ));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    struct PanickingModel;

    impl ProbabilityModel for PanickingModel {
        fn output_width(&self) -> usize {
            2
        }

        fn run(&self, _tensor: &ImageTensor) -> Result<Vec<f32>, ClassifyError> {
            panic!("numerical fault");
        }
    }

    #[test]
    fn panic_mid_pipeline_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(PanickingModel, 2, dir.path());
        let image = png(8, 8);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pipe.predict(&image, k(1))
        }));

        assert!(outcome.is_err());
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[test]
    fn concurrent_requests_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = Arc::new(pipeline(
            FixedModel {
                scores: vec![0.7, 0.2, 0.1],
                shape: None,
            },
            3,
            dir.path(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pipe = Arc::clone(&pipe);
                std::thread::spawn(move || pipe.predict(&png(16 + i, 16), k(2)))
            })
            .collect();

        for h in handles {
            let out = h.join().unwrap().unwrap();
            assert_eq!(out[0].name, "class_0");
            assert_eq!(out.len(), 2);
        }
        assert_eq!(leftover_files(dir.path()), 0);
    }
}
