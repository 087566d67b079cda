//! Records stored in the target table.
//!
//! A [`TargetRecord`] is also the shape of a transformed document travelling
//! through the pending-write queue: the reader produces target-shaped records
//! and the merge writer reconciles them with what is already stored.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::PseudoSchema;
use crate::value::Fields;

/// Canonical partition key attribute.
pub const PARTITION_KEY: &str = "pk";
/// Canonical sort key attribute.
pub const SORT_KEY: &str = "sk";
/// Attribute holding the facet (source collection) tag.
pub const FACET_FIELD: &str = "__facet";
/// Attribute holding the source document id.
pub const SOURCE_ID_FIELD: &str = "__documentId";
/// Attribute holding the source modification time.
pub const SOURCE_UPDATED_AT_FIELD: &str = "__documentUpdatedAt";
/// Key value of the meta record's partition and sort key.
pub const META_KEY: &str = "META";

/// Bookkeeping attribute names. These never appear in a record's field map.
pub const BOOKKEEPING_FIELDS: [&str; 5] = [
    PARTITION_KEY,
    SORT_KEY,
    FACET_FIELD,
    SOURCE_ID_FIELD,
    SOURCE_UPDATED_AT_FIELD,
];

/// Returns true if `name` is reserved for bookkeeping.
pub fn is_bookkeeping_field(name: &str) -> bool {
    BOOKKEEPING_FIELDS.contains(&name)
}

/// Primary key of a target record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub pk: String,
    pub sk: String,
}

impl RecordKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Key of the meta record.
    pub fn meta() -> Self {
        Self::new(META_KEY, META_KEY)
    }

    pub fn is_meta(&self) -> bool {
        self.pk == META_KEY && self.sk == META_KEY
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.pk, self.sk)
    }
}

/// A record in the target table, or a transformed document on its way there.
///
/// # Wire format
///
/// ```json
/// {
///   "pk": "c-1",
///   "sk": "2023-05-01T00:00:00.000Z",
///   "__facet": "customers",
///   "__documentId": "c-1",
///   "__documentUpdatedAt": "2023-05-01T00:00:00.000Z",
///   "name": "Ada"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub pk: String,
    pub sk: String,
    #[serde(rename = "__facet")]
    pub facet: String,
    #[serde(rename = "__documentId")]
    pub source_id: String,
    #[serde(rename = "__documentUpdatedAt")]
    pub source_updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl TargetRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.pk.clone(), self.sk.clone())
    }
}

fn default_facet_item_attribute_name() -> String {
    FACET_FIELD.to_string()
}

/// The single well-known record holding the facet registry and inferred schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaRecord {
    /// Every facet ever written. Only grows.
    #[serde(default)]
    pub facets: BTreeSet<String>,
    /// Attribute name downstream resolvers use to filter by facet.
    #[serde(default = "default_facet_item_attribute_name")]
    pub facet_item_attribute_name: String,
    /// Latest inferred schema per facet.
    #[serde(default)]
    pub pseudo_schema: BTreeMap<String, PseudoSchema>,
}

impl Default for MetaRecord {
    fn default() -> Self {
        Self {
            facets: BTreeSet::new(),
            facet_item_attribute_name: default_facet_item_attribute_name(),
            pseudo_schema: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use chrono::TimeZone;

    #[test]
    fn test_target_record_wire_format() {
        let record = TargetRecord {
            pk: "c-1".to_string(),
            sk: "2023-05-01T00:00:00.000Z".to_string(),
            facet: "customers".to_string(),
            source_id: "c-1".to_string(),
            source_updated_at: Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap(),
            fields: Fields::from([("name".to_string(), Value::from("Ada"))]),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["__facet"], "customers");
        assert_eq!(json["__documentId"], "c-1");
        assert_eq!(json["name"], "Ada");

        let restored: TargetRecord = serde_json::from_value(json).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_meta_record_defaults() {
        let meta: MetaRecord = serde_json::from_str("{}").unwrap();
        assert!(meta.facets.is_empty());
        assert_eq!(meta.facet_item_attribute_name, "__facet");
    }

    #[test]
    fn test_bookkeeping_fields() {
        assert!(is_bookkeeping_field("pk"));
        assert!(is_bookkeeping_field("__documentId"));
        assert!(!is_bookkeeping_field("name"));
    }
}
