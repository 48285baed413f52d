//! Disease information lookup: one structured LLM call per query, validated
//! against [`DISEASE_INFO_SCHEMA`].

use std::sync::Arc;

use serde_json::Value;
use skinsight_core::{DISEASE_INFO_SCHEMA, DiseaseInfo, DiseaseQuery, OutputSchema};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::llm::{LlmError, StructuredLlm};

#[derive(Debug, Error)]
pub enum DiseaseInfoError {
    #[error("disease name is empty")]
    EmptyQuery,
    #[error("external service error: {0}")]
    ExternalService(#[source] LlmError),
    #[error("response failed schema validation: {details}")]
    SchemaValidation { details: String },
}

impl From<LlmError> for DiseaseInfoError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Json(e) => Self::SchemaValidation {
                details: e.to_string(),
            },
            other => Self::ExternalService(other),
        }
    }
}

/// Looks up symptoms, causes, home remedies and treatments for a category.
pub struct DiseaseInfoService {
    llm: Arc<dyn StructuredLlm>,
    schema: OutputSchema,
    validator: jsonschema::Validator,
}

impl DiseaseInfoService {
    pub fn new(llm: Arc<dyn StructuredLlm>) -> Result<Self, ConfigError> {
        let schema = DISEASE_INFO_SCHEMA;
        let validator = jsonschema::validator_for(&schema.json_schema())
            .map_err(|e| ConfigError::Schema(e.to_string()))?;
        Ok(Self {
            llm,
            schema,
            validator,
        })
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Validate `name` and describe it.
    pub async fn lookup(&self, name: &str) -> Result<DiseaseInfo, DiseaseInfoError> {
        let query = DiseaseQuery::new(name).map_err(|_| DiseaseInfoError::EmptyQuery)?;
        self.describe(&query).await
    }

    pub async fn describe(&self, query: &DiseaseQuery) -> Result<DiseaseInfo, DiseaseInfoError> {
        let prompt = build_prompt(query, &self.schema);
        info!(disease = %query, model = self.llm.model(), "looking up disease details");

        let raw = self.llm.generate(&prompt, &self.schema).await.map_err(|e| {
            warn!(disease = %query, error = %e, "disease lookup failed");
            DiseaseInfoError::from(e)
        })?;
        self.validate(raw)
    }

    fn validate(&self, raw: Value) -> Result<DiseaseInfo, DiseaseInfoError> {
        let Some(projected) = self.schema.project(&raw) else {
            return Err(DiseaseInfoError::SchemaValidation {
                details: format!("expected a JSON object, got {}", kind(&raw)),
            });
        };

        let details = self
            .validator
            .iter_errors(&projected)
            .map(|e| format!("{} (at '{}')", e, e.instance_path))
            .collect::<Vec<_>>()
            .join("; ");
        if !details.is_empty() {
            warn!(%details, "schema validation failed");
            return Err(DiseaseInfoError::SchemaValidation { details });
        }

        serde_json::from_value(projected).map_err(|e| DiseaseInfoError::SchemaValidation {
            details: e.to_string(),
        })
    }
}

/// The instruction sent for `query`. Deterministic in its input.
pub fn build_prompt(query: &DiseaseQuery, schema: &OutputSchema) -> String {
    let fields = schema.field_names().collect::<Vec<_>>().join(", ");
    format!(
        "So this is the name of a skin disease: {name}. \
         You have to get the following details about it - symptoms, causes, \
         home remedies and treatments. \
         Answer with the fields {fields}, each a list of short strings.",
        name = query.name(),
    )
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
