//! Structured poll record

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocols::melsec::{FieldMap, Value};

/// One poll result for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SslogRecord {
    pub id: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub running: Option<bool>,
    pub counter: Option<Value>,
    pub fieldvalues: FieldMap,
}

impl SslogRecord {
    pub fn new(source: impl Into<String>, timestamp: DateTime<Utc>, fieldvalues: FieldMap) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            timestamp,
            running: None,
            counter: None,
            fieldvalues,
        }
    }

    /// Copy under a new identity and source, keeping timestamp and flags
    pub fn derive(&self, source: impl Into<String>, fieldvalues: FieldMap) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            timestamp: self.timestamp,
            running: self.running,
            counter: self.counter.clone(),
            fieldvalues,
        }
    }

    /// Key used for this record in output files
    pub fn timestamp_key(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::protocols::melsec::FieldValue;

    #[test]
    fn test_derive_gets_fresh_identity() {
        let mut fields = FieldMap::new();
        fields.insert("A".to_string(), FieldValue::new(1, None));
        let mut base = SslogRecord::new("press01", Utc::now(), fields.clone());
        base.running = Some(true);

        let derived = base.derive("press01_a", fields);
        assert_ne!(derived.id, base.id);
        assert_eq!(derived.source, "press01_a");
        assert_eq!(derived.timestamp, base.timestamp);
        assert_eq!(derived.running, Some(true));
        assert!(Uuid::parse_str(&derived.id).is_ok());
    }

    #[test]
    fn test_serializes_with_plain_values() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut fields = FieldMap::new();
        fields.insert("RUN".to_string(), FieldValue::new("1", None));
        let mut record = SslogRecord::new("press01", at, fields);
        record.counter = Some(Value::Int(42));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["counter"], 42);
        assert_eq!(json["fieldvalues"]["RUN"]["value"], "1");
        assert_eq!(json["fieldvalues"]["RUN"]["units"], serde_json::Value::Null);
        assert_eq!(record.timestamp_key(), "2026-03-01T08:00:00.000000Z");
    }
}
