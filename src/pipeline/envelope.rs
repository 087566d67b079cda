//! Continuation envelope threaded between orchestrator steps.

use serde::{Deserialize, Serialize};

/// Self-describing read position.
///
/// Everything needed to resume a run is in here, so a caller may persist
/// the envelope between steps and restart at `Read`.
///
/// # Wire format
///
/// ```json
/// {
///   "collections": ["orders"],
///   "collection": "customers",
///   "limit": 5,
///   "offset": 10,
///   "partitionKey": "__documentId",
///   "sortKey": "__documentUpdatedAt",
///   "continue": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationEnvelope {
    /// Collections not yet started. The last element is read next.
    pub collections: Vec<String>,
    /// Collection currently being paged.
    #[serde(default)]
    pub collection: Option<String>,
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    /// Partition key field chosen for the current collection.
    #[serde(default)]
    pub partition_key: Option<String>,
    /// Sort key field chosen for the current collection.
    #[serde(default)]
    pub sort_key: Option<String>,
    #[serde(rename = "continue")]
    pub should_continue: bool,
}

impl ContinuationEnvelope {
    /// Fresh envelope for a run over `collections`.
    pub fn prime(collections: Vec<String>, page_size: usize) -> Self {
        let should_continue = !collections.is_empty();
        Self {
            collections,
            collection: None,
            limit: page_size,
            offset: 0,
            partition_key: None,
            sort_key: None,
            should_continue,
        }
    }

    /// Move on to the next collection on the stack, resetting the page
    /// position and key hints. Returns the new current collection.
    pub fn advance_collection(&mut self, page_size: usize) -> Option<&str> {
        self.collection = self.collections.pop();
        self.limit = page_size;
        self.offset = 0;
        self.partition_key = None;
        self.sort_key = None;
        self.collection.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let envelope = ContinuationEnvelope {
            collections: vec!["orders".to_string()],
            collection: Some("customers".to_string()),
            limit: 5,
            offset: 10,
            partition_key: Some("__documentId".to_string()),
            sort_key: None,
            should_continue: true,
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["collections"][0], "orders");
        assert_eq!(json["partitionKey"], "__documentId");
        assert_eq!(json["continue"], true);
        assert!(json["sortKey"].is_null());

        let back: ContinuationEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_advance_pops_last() {
        let mut envelope =
            ContinuationEnvelope::prime(vec!["orders".into(), "customers".into()], 5);
        envelope.offset = 15;
        envelope.partition_key = Some("x".into());

        assert_eq!(envelope.advance_collection(5), Some("customers"));
        assert_eq!(envelope.offset, 0);
        assert!(envelope.partition_key.is_none());
        assert_eq!(envelope.advance_collection(5), Some("orders"));
        assert_eq!(envelope.advance_collection(5), None);
    }
}
