//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through its environment variable.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, ValueEnum};
use skinsight_ai::preprocess::DEFAULT_MAX_IMAGE_BYTES;
use skinsight_ai::{
    ClassifierService, GeminiClient, GeminiConfig, ImagePreprocessor, LabelRegistry,
    Normalization, OnnxClassifier, OutputActivation, PreprocessConfig,
};

pub const DEFAULT_MODEL_PATH: &str = "models/efficientnet/model.onnx";

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Activation {
    /// The model ends in a softmax.
    Probabilities,
    /// The model emits raw logits.
    Logits,
}

impl From<Activation> for OutputActivation {
    fn from(value: Activation) -> Self {
        match value {
            Activation::Probabilities => Self::Probabilities,
            Activation::Logits => Self::Logits,
        }
    }
}

/// Classifier model and preprocessing options.
#[derive(Debug, Args)]
pub struct ModelArgs {
    /// ONNX model file.
    #[arg(long, env = "SKINSIGHT_MODEL", default_value = DEFAULT_MODEL_PATH)]
    pub model: PathBuf,

    /// Labels file, one class per line in model output order. Defaults to the
    /// ten built-in skin-lesion categories.
    #[arg(long, env = "SKINSIGHT_LABELS")]
    pub labels: Option<PathBuf>,

    /// Square input edge length in pixels.
    #[arg(
        long,
        env = "SKINSIGHT_INPUT_SIZE",
        default_value_t = 240,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub input_size: u32,

    /// Pixel normalization: raw, unit, symmetric or imagenet.
    #[arg(long, env = "SKINSIGHT_NORMALIZATION", default_value = "raw")]
    pub normalization: Normalization,

    #[arg(long, env = "SKINSIGHT_ACTIVATION", value_enum, default_value_t = Activation::Probabilities)]
    pub activation: Activation,

    /// Number of ONNX Runtime sessions to pool.
    #[arg(long, env = "SKINSIGHT_SESSIONS", default_value_t = 1)]
    pub sessions: usize,

    /// Largest accepted image, in bytes.
    #[arg(long, env = "SKINSIGHT_MAX_IMAGE_BYTES", default_value_t = DEFAULT_MAX_IMAGE_BYTES)]
    pub max_image_bytes: usize,

    /// Directory for transient per-request upload files.
    #[arg(long, env = "SKINSIGHT_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,
}

impl ModelArgs {
    pub fn preprocessor(&self) -> ImagePreprocessor {
        ImagePreprocessor::new(PreprocessConfig {
            width: self.input_size,
            height: self.input_size,
            normalization: self.normalization,
            max_bytes: self.max_image_bytes,
            ..Default::default()
        })
    }

    pub fn label_registry(&self) -> anyhow::Result<LabelRegistry> {
        match &self.labels {
            Some(path) => LabelRegistry::from_file(path)
                .with_context(|| format!("loading labels from {}", path.display())),
            None => Ok(LabelRegistry::skin_lesions()),
        }
    }

    /// Load the model and bind it to its labels. Any mismatch is fatal.
    pub fn load_classifier(&self) -> anyhow::Result<ClassifierService> {
        let size = (self.input_size, self.input_size);
        let labels = self.label_registry()?;
        let model = OnnxClassifier::load(&self.model, self.sessions, size)
            .with_context(|| format!("loading classifier from {}", self.model.display()))?;
        ClassifierService::new(model, labels, size, self.activation.into())
            .context("classifier does not match its configuration")
    }
}

/// Structured-output LLM options.
#[derive(Debug, Args)]
pub struct LlmArgs {
    /// Gemini API key. Disease lookups are disabled without one.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "SKINSIGHT_LLM_MODEL", default_value = skinsight_ai::llm::DEFAULT_MODEL)]
    pub llm_model: String,

    #[arg(long, env = "SKINSIGHT_LLM_BASE_URL", default_value = skinsight_ai::llm::DEFAULT_BASE_URL)]
    pub llm_base_url: String,

    /// Request timeout for LLM calls, in seconds.
    #[arg(long, env = "SKINSIGHT_LLM_TIMEOUT_SECS", default_value_t = 60)]
    pub llm_timeout_secs: u64,
}

impl LlmArgs {
    /// Build a client, or `None` when no API key is configured.
    pub fn client(&self) -> anyhow::Result<Option<GeminiClient>> {
        let Some(api_key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let client = GeminiClient::new(GeminiConfig {
            api_key: api_key.to_string(),
            model: self.llm_model.clone(),
            base_url: self.llm_base_url.clone(),
            timeout: Duration::from_secs(self.llm_timeout_secs),
        })
        .context("building LLM client")?;
        Ok(Some(client))
    }
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "SKINSIGHT_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Keep a copy of every successfully classified upload here.
    #[arg(long, env = "SKINSIGHT_ARCHIVE_DIR")]
    pub archive_dir: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub llm: LlmArgs,
}
