//! Class label registry: classifier output index → category name.
//!
//! The registry is fixed for the process lifetime. Its length is a load-time
//! contract with the classifier's output width, checked when the
//! [`ClassifierService`](crate::ClassifierService) is built.

use std::collections::HashSet;
use std::path::Path;

use crate::error::ConfigError;

/// Categories of the shipped EfficientNet skin-lesion model, in output order.
pub const SKIN_LESION_LABELS: &[&str] = &[
    "Atopic Dermatitis",
    "Basal Cell Carcinoma (BCC)",
    "Benign Keratosis-like Lesions (BKL)",
    "Eczema",
    "Melanocytic Nevi (NV)",
    "Melanoma",
    "Psoriasis pictures Lichen Planus and related diseases",
    "Seborrheic Keratoses and other Benign Tumors",
    "Tinea Ringworm Candidiasis and other Fungal Infections",
    "Warts Molluscum and other Viral Infections",
];

/// Ordered, non-empty list of unique category names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRegistry {
    labels: Vec<String>,
}

impl LabelRegistry {
    pub fn new<I, S>(labels: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(ConfigError::EmptyLabels);
        }

        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if !seen.insert(label.as_str()) {
                return Err(ConfigError::DuplicateLabel(label.clone()));
            }
        }

        Ok(Self { labels })
    }

    /// The ten skin-lesion categories of the default model.
    pub fn skin_lesions() -> Self {
        Self {
            labels: SKIN_LESION_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Parse `labels.txt` content: one label per line, blank lines ignored.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty()),
        )
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::LabelsFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false for a constructed registry.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}
