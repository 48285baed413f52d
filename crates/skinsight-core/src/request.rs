//! Typed request contracts, validated before any pipeline stage runs.

use std::num::NonZeroUsize;

use thiserror::Error;

use crate::disease::DiseaseQuery;

/// Number of ranked predictions returned when the caller does not ask for a count.
pub const DEFAULT_TOP_K: usize = 3;

/// Missing or malformed required input. Maps to a client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No file uploaded")]
    MissingImage,
    #[error("Disease name not provided")]
    MissingDiseaseName,
    #[error("top_k must be a positive integer, got {0:?}")]
    InvalidTopK(String),
}

/// A validated classify request.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub image: Vec<u8>,
    /// Client-supplied file name, used only to pick an archive extension.
    pub file_name: Option<String>,
    pub top_k: NonZeroUsize,
}

impl ClassifyRequest {
    /// Build from the raw parts of an upload.
    ///
    /// An absent or zero-length image is a missing upload. `top_k` defaults to
    /// [`DEFAULT_TOP_K`] and must parse as a positive integer when given.
    pub fn from_parts(
        image: Option<Vec<u8>>,
        file_name: Option<String>,
        top_k: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let image = match image {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Err(ValidationError::MissingImage),
        };
        let top_k = parse_top_k(top_k)?;
        Ok(Self {
            image,
            file_name,
            top_k,
        })
    }
}

fn parse_top_k(raw: Option<&str>) -> Result<NonZeroUsize, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(NonZeroUsize::new(DEFAULT_TOP_K).unwrap_or(NonZeroUsize::MIN)),
        Some(s) => s
            .parse::<NonZeroUsize>()
            .map_err(|_| ValidationError::InvalidTopK(s.to_string())),
    }
}

/// A validated disease information request.
#[derive(Debug, Clone)]
pub struct DiseaseInfoRequest {
    pub query: DiseaseQuery,
}

impl DiseaseInfoRequest {
    pub fn from_name(name: Option<&str>) -> Result<Self, ValidationError> {
        let query = DiseaseQuery::new(name.unwrap_or_default())
            .map_err(|_| ValidationError::MissingDiseaseName)?;
        Ok(Self { query })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_image_is_rejected() {
        let err = ClassifyRequest::from_parts(None, None, None).unwrap_err();
        assert_eq!(err, ValidationError::MissingImage);
        assert_eq!(err.to_string(), "No file uploaded");
    }

    #[test]
    fn empty_image_counts_as_missing() {
        let err = ClassifyRequest::from_parts(Some(vec![]), None, None).unwrap_err();
        assert_eq!(err, ValidationError::MissingImage);
    }

    #[test]
    fn top_k_defaults_to_three() {
        let req = ClassifyRequest::from_parts(Some(vec![1, 2, 3]), None, None).unwrap();
        assert_eq!(req.top_k.get(), DEFAULT_TOP_K);

        let req = ClassifyRequest::from_parts(Some(vec![1]), None, Some("  ")).unwrap();
        assert_eq!(req.top_k.get(), 3);
    }

    #[test]
    fn top_k_parses_positive_integers() {
        let req = ClassifyRequest::from_parts(Some(vec![1]), None, Some("5")).unwrap();
        assert_eq!(req.top_k.get(), 5);
    }

    #[test]
    fn top_k_zero_or_garbage_is_rejected() {
        for raw in ["0", "-1", "three"] {
            let err = ClassifyRequest::from_parts(Some(vec![1]), None, Some(raw)).unwrap_err();
            assert_eq!(err, ValidationError::InvalidTopK(raw.to_string()));
        }
    }

    #[test]
    fn disease_name_required() {
        for name in [None, Some(""), Some("   ")] {
            let err = DiseaseInfoRequest::from_name(name).unwrap_err();
            assert_eq!(err.to_string(), "Disease name not provided");
        }
        let req = DiseaseInfoRequest::from_name(Some("Eczema")).unwrap();
        assert_eq!(req.query.name(), "Eczema");
    }
}
