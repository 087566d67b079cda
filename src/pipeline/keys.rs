//! Key derivation and document transformation.
//!
//! The partition and sort key fields are chosen once per collection from
//! the first document of the first page, carried in the continuation
//! envelope, and reused for every later page of that collection.

use tracing::{debug, warn};

use crate::record::{SOURCE_ID_FIELD, SOURCE_UPDATED_AT_FIELD, TargetRecord, is_bookkeeping_field};
use crate::source::SourceDocument;
use crate::value::{Fields, format_timestamp};

/// Fields a collection's keys are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPlan {
    /// `{collection}Id`, or the source id bookkeeping field.
    pub partition_field: String,
    /// A conventional last-modified field, or the source timestamp field.
    pub sort_field: String,
}

impl KeyPlan {
    /// Choose key fields for `collection` from its first document.
    pub fn derive(collection: &str, first: &SourceDocument, sort_candidates: &[String]) -> Self {
        let natural_id = format!("{collection}Id");
        let partition_field = if has_scalar(&first.fields, &natural_id) {
            natural_id
        } else {
            SOURCE_ID_FIELD.to_string()
        };

        let sort_field = sort_candidates
            .iter()
            .find(|name| !is_bookkeeping_field(name) && has_scalar(&first.fields, name))
            .cloned()
            .unwrap_or_else(|| SOURCE_UPDATED_AT_FIELD.to_string());

        debug!(collection, %partition_field, %sort_field, "Derived key fields");
        Self {
            partition_field,
            sort_field,
        }
    }

    /// Rebuild a plan from envelope hints. `None` unless both are present.
    pub fn from_hints(partition: Option<&str>, sort: Option<&str>) -> Option<Self> {
        Some(Self {
            partition_field: partition?.to_string(),
            sort_field: sort?.to_string(),
        })
    }

    /// Transform a source document into a target-shaped record.
    ///
    /// Source fields named like bookkeeping attributes are dropped, and a
    /// chosen key field is moved out of the field map into `pk` / `sk`.
    pub fn transform(&self, collection: &str, document: SourceDocument) -> TargetRecord {
        let SourceDocument {
            id,
            mut fields,
            update_time,
        } = document;

        fields.retain(|name, _| {
            let reserved = is_bookkeeping_field(name);
            if reserved {
                debug!(collection, document_id = %id, field = %name, "Dropping reserved field");
            }
            !reserved
        });

        let pk = match take_key(&mut fields, &self.partition_field, SOURCE_ID_FIELD) {
            KeyValue::Bookkeeping => id.clone(),
            KeyValue::Found(key) => key,
            KeyValue::Missing => {
                warn!(
                    collection,
                    document_id = %id,
                    field = %self.partition_field,
                    "Partition key field missing or not scalar, using document id"
                );
                id.clone()
            }
        };

        let sk = match take_key(&mut fields, &self.sort_field, SOURCE_UPDATED_AT_FIELD) {
            KeyValue::Found(key) => key,
            KeyValue::Bookkeeping => format_timestamp(&update_time),
            KeyValue::Missing => {
                warn!(
                    collection,
                    document_id = %id,
                    field = %self.sort_field,
                    "Sort key field missing or not scalar, using update time"
                );
                format_timestamp(&update_time)
            }
        };

        TargetRecord {
            pk,
            sk,
            facet: collection.to_string(),
            source_id: id,
            source_updated_at: update_time,
            fields,
        }
    }
}

enum KeyValue {
    Bookkeeping,
    Found(String),
    Missing,
}

fn has_scalar(fields: &Fields, name: &str) -> bool {
    fields.get(name).and_then(|v| v.as_key()).is_some()
}

/// Read a key from `field`, removing it from the map.
fn take_key(fields: &mut Fields, field: &str, fallback: &str) -> KeyValue {
    if field == fallback || is_bookkeeping_field(field) {
        return KeyValue::Bookkeeping;
    }
    match fields.get(field).and_then(|v| v.as_key()) {
        Some(key) => {
            fields.remove(field);
            KeyValue::Found(key)
        }
        None => KeyValue::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use chrono::{TimeZone, Utc};

    fn candidates() -> Vec<String> {
        vec!["updatedAt".to_string(), "modifiedAt".to_string()]
    }

    fn doc(id: &str, fields: serde_json::Value) -> SourceDocument {
        let Value::Map(fields) = Value::from(fields) else {
            panic!("fields must be an object");
        };
        SourceDocument::new(id, fields, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_missing_natural_id_uses_document_id() {
        let first = doc("doc-1", serde_json::json!({"name": "Ada"}));
        let plan = KeyPlan::derive("customers", &first, &candidates());
        assert_eq!(plan.partition_field, SOURCE_ID_FIELD);
        assert_eq!(plan.sort_field, SOURCE_UPDATED_AT_FIELD);

        let record = plan.transform("customers", first);
        assert_eq!(record.pk, "doc-1");
        assert_eq!(record.sk, "2024-03-01T12:00:00.000Z");
        assert_eq!(record.facet, "customers");
        assert_eq!(record.fields["name"], Value::from("Ada"));
    }

    #[test]
    fn test_natural_id_and_sort_field_are_moved() {
        let first = doc(
            "doc-1",
            serde_json::json!({"ordersId": "o-17", "updatedAt": "2024-02-02T00:00:00Z", "total": 3}),
        );
        let plan = KeyPlan::derive("orders", &first, &candidates());
        assert_eq!(plan.partition_field, "ordersId");
        assert_eq!(plan.sort_field, "updatedAt");

        let record = plan.transform("orders", first);
        assert_eq!(record.pk, "o-17");
        assert_eq!(record.sk, "2024-02-02T00:00:00Z");
        assert!(!record.fields.contains_key("ordersId"));
        assert!(!record.fields.contains_key("updatedAt"));
        assert_eq!(record.fields["total"], Value::Int(3));
    }

    #[test]
    fn test_later_document_missing_key_falls_back() {
        let first = doc("doc-1", serde_json::json!({"ordersId": "o-1"}));
        let plan = KeyPlan::derive("orders", &first, &candidates());

        let later = doc("doc-2", serde_json::json!({"ordersId": null}));
        let record = plan.transform("orders", later);
        assert_eq!(record.pk, "doc-2");
    }

    #[test]
    fn test_reserved_source_fields_are_dropped() {
        let first = doc(
            "doc-1",
            serde_json::json!({"pk": "spoof", "__facet": "other", "kept": true}),
        );
        let plan = KeyPlan::derive("items", &first, &candidates());
        let record = plan.transform("items", first);

        assert_eq!(record.pk, "doc-1");
        assert_eq!(record.facet, "items");
        assert_eq!(record.fields.len(), 1);
        assert!(record.fields.contains_key("kept"));
    }

    #[test]
    fn test_from_hints() {
        assert!(KeyPlan::from_hints(Some("a"), None).is_none());
        let plan = KeyPlan::from_hints(Some("a"), Some("b")).unwrap();
        assert_eq!(plan.partition_field, "a");
        assert_eq!(plan.sort_field, "b");
    }
}
