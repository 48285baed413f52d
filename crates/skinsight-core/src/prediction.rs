//! Ranked classifier output.

use serde::{Deserialize, Serialize};

/// One ranked category with its confidence as a percentage in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub name: String,
    pub confidence: f64,
}

impl Prediction {
    /// Copy with confidence rounded to two decimal places, as sent to clients.
    pub fn rounded(&self) -> Self {
        Self {
            name: self.name.clone(),
            confidence: (self.confidence * 100.0).round() / 100.0,
        }
    }
}

/// Response body of the classify operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<Prediction>,
}

impl PredictionResponse {
    pub fn from_ranked(ranked: &[Prediction]) -> Self {
        Self {
            predictions: ranked.iter().map(Prediction::rounded).collect(),
        }
    }
}
