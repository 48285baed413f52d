pub mod disease;
pub mod prediction;
pub mod request;
pub mod schema;

pub use disease::{DiseaseInfo, DiseaseQuery, EmptyQuery};
pub use prediction::{Prediction, PredictionResponse};
pub use request::{ClassifyRequest, DEFAULT_TOP_K, DiseaseInfoRequest, ValidationError};
pub use schema::{DISEASE_INFO_SCHEMA, FieldKind, FieldSpec, OutputSchema};
