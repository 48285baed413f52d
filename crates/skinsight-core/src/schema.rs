//! Declared output schemas for structured LLM responses.
//!
//! A schema is a static list of named fields. The same declaration renders to
//! standard JSON Schema (used to validate what comes back) and to the
//! OpenAPI-style subset Gemini accepts as `responseSchema` (used to constrain
//! generation), so the prompt and the validator can never drift apart.

use serde_json::{Map, Value, json};

/// Value type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A single string.
    Text,
    /// An ordered list of strings.
    TextList,
}

/// One named field of an [`OutputSchema`].
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: FieldKind,
}

/// A fixed set of required fields, all of which must be present in a response.
#[derive(Debug, Clone, Copy)]
pub struct OutputSchema {
    pub title: &'static str,
    pub fields: &'static [FieldSpec],
}

/// Schema of the disease information record.
pub const DISEASE_INFO_SCHEMA: OutputSchema = OutputSchema {
    title: "DiseaseInfo",
    fields: &[
        FieldSpec {
            name: "symptoms",
            description: "List of Symptoms related to the Disease",
            kind: FieldKind::TextList,
        },
        FieldSpec {
            name: "causes",
            description: "List of Causes related to the Disease",
            kind: FieldKind::TextList,
        },
        FieldSpec {
            name: "home_remedy",
            description: "List of Home Remedies for the Disease",
            kind: FieldKind::TextList,
        },
        FieldSpec {
            name: "treatment",
            description: "List of Treatments for the Disease",
            kind: FieldKind::TextList,
        },
    ],
};

impl OutputSchema {
    /// Declared field names, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    /// Render as a standard JSON Schema object with every field required.
    ///
    /// Extra properties are permitted here; [`project`](Self::project) drops them.
    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                let ty = match f.kind {
                    FieldKind::Text => json!({ "type": "string" }),
                    FieldKind::TextList => json!({ "type": "array", "items": { "type": "string" } }),
                };
                let mut prop = ty;
                prop["description"] = json!(f.description);
                (f.name.to_string(), prop)
            })
            .collect();

        json!({
            "title": self.title,
            "type": "object",
            "properties": properties,
            "required": self.field_names().collect::<Vec<_>>(),
        })
    }

    /// Render in the OpenAPI subset used by Gemini's `generationConfig.responseSchema`.
    pub fn gemini_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                let prop = match f.kind {
                    FieldKind::Text => json!({ "type": "STRING", "description": f.description }),
                    FieldKind::TextList => json!({
                        "type": "ARRAY",
                        "items": { "type": "STRING" },
                        "description": f.description,
                    }),
                };
                (f.name.to_string(), prop)
            })
            .collect();

        let names: Vec<&str> = self.field_names().collect();
        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": names,
            "propertyOrdering": names,
        })
    }

    /// Copy only the declared fields out of a JSON object.
    ///
    /// Returns `None` if `value` is not an object. Missing fields are simply
    /// absent from the result; validation is the caller's job.
    pub fn project(&self, value: &Value) -> Option<Value> {
        let obj = value.as_object()?;
        let kept: Map<String, Value> = self
            .fields
            .iter()
            .filter_map(|f| obj.get(f.name).map(|v| (f.name.to_string(), v.clone())))
            .collect();
        Some(Value::Object(kept))
    }
}
