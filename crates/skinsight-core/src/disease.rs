//! Disease information query and record types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The disease name was empty or whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("disease name is empty")]
pub struct EmptyQuery;

/// A diagnostic category name to look up.
///
/// Always non-empty after trimming; immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiseaseQuery(String);

impl DiseaseQuery {
    pub fn new(name: impl AsRef<str>) -> Result<Self, EmptyQuery> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(EmptyQuery);
        }
        Ok(Self(name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DiseaseQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structured medical information about one diagnostic category.
///
/// Field names match [`DISEASE_INFO_SCHEMA`](crate::DISEASE_INFO_SCHEMA); all
/// four are always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseInfo {
    pub symptoms: Vec<String>,
    pub causes: Vec<String>,
    pub home_remedy: Vec<String>,
    pub treatment: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_trims_name() {
        let q = DiseaseQuery::new("  Melanoma \n").unwrap();
        assert_eq!(q.name(), "Melanoma");
        assert_eq!(q.to_string(), "Melanoma");
    }

    #[test]
    fn query_rejects_blank_names() {
        assert_eq!(DiseaseQuery::new(""), Err(EmptyQuery));
        assert_eq!(DiseaseQuery::new(" \t "), Err(EmptyQuery));
    }

    #[test]
    fn disease_info_serializes_all_fields() {
        let info = DiseaseInfo {
            symptoms: vec!["dry skin".into()],
            ..Default::default()
        };
        let json = serde_json::to_value(&info).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 4);
        assert_eq!(json["symptoms"][0], "dry skin");
        assert_eq!(json["treatment"], serde_json::json!([]));
    }
}
