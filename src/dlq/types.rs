//! Dead-letter records and per-stage statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::events::FailureStage;

/// A queue message that exhausted its deliveries.
///
/// Written as one NDJSON line; `body` is the original message body so the
/// batch can be replayed by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub message_id: String,
    pub body: String,
    /// Error of the last failed delivery.
    pub error: String,
    pub stage: FailureStage,
    pub receive_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// Dead-letter counts by failure stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureStats {
    pub decode: usize,
    pub merge: usize,
}

impl FailureStats {
    pub fn increment(&mut self, stage: FailureStage) {
        match stage {
            FailureStage::Decode => self.decode += 1,
            FailureStage::Merge => self.merge += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.decode + self.merge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_stats() {
        let mut stats = FailureStats::default();
        stats.increment(FailureStage::Merge);
        stats.increment(FailureStage::Merge);
        stats.increment(FailureStage::Decode);

        assert_eq!(stats.merge, 2);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_dead_letter_wire_format() {
        let json = r#"{"messageId":"m-1","body":"[]","error":"table unavailable","stage":"merge","receiveCount":3,"timestamp":"2025-01-26T10:30:00Z"}"#;
        let letter: DeadLetter = serde_json::from_str(json).unwrap();

        assert_eq!(letter.message_id, "m-1");
        assert_eq!(letter.stage, FailureStage::Merge);
        assert_eq!(letter.receive_count, 3);

        let back = serde_json::to_string(&letter).unwrap();
        assert!(back.contains(r#""receiveCount":3"#));
    }
}
