//! Schema inference for facets.
//!
//! Samples the records of each facet, builds a prototype from their field
//! union and derives a GraphQL-flavoured pseudo-schema that is persisted on
//! the meta record for downstream API generation.

pub mod inference;
pub mod introspector;
pub mod naming;
pub mod types;

pub use inference::{PrototypeRecord, infer_pseudo_schema, infer_pseudo_schema_reserving};
pub use introspector::{IntrospectionReport, SchemaInferencer};
pub use types::{FieldType, PseudoSchema, ScalarType, TypeDefinition, TypePair, TypeRef};
