//! Per-poll record assembly

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::compute::{compute, ComputedField};
use super::split::{split, PrefixCache, SplitTarget};
use super::sslog::SslogRecord;
use crate::protocols::melsec::{FieldMap, Value};

/// How raw field maps become records for one connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSettings {
    /// Field whose truthiness sets `running`
    #[serde(default)]
    pub running_field: Option<String>,
    /// Field copied into `counter`
    #[serde(default)]
    pub counter_field: Option<String>,
    #[serde(default)]
    pub computed: Vec<ComputedField>,
    #[serde(default)]
    pub split: Vec<SplitTarget>,
}

/// Builds records from poll results; owns the prefix cache for its targets
#[derive(Debug)]
pub struct RecordBuilder {
    settings: RecordSettings,
    prefix_cache: PrefixCache,
}

impl RecordBuilder {
    pub fn new(settings: RecordSettings) -> Self {
        Self {
            settings,
            prefix_cache: PrefixCache::new(),
        }
    }

    /// Turn one poll's field map into the records to batch
    pub fn build(
        &mut self,
        source: &str,
        timestamp: DateTime<Utc>,
        fields: FieldMap,
    ) -> Vec<SslogRecord> {
        let mut record = SslogRecord::new(source, timestamp, fields);
        compute(&mut record, &self.settings.computed);

        record.running = self
            .settings
            .running_field
            .as_ref()
            .and_then(|name| record.fieldvalues.get(name))
            .map(|fv| fv.value.is_truthy());
        record.counter = self
            .settings
            .counter_field
            .as_ref()
            .and_then(|name| record.fieldvalues.get(name))
            .map(|fv| coerce_counter(&fv.value, source));

        if self.settings.split.is_empty() {
            vec![record]
        } else {
            split(&self.settings.split, &record, &mut self.prefix_cache)
        }
    }
}

/// Integers pass; integral floats and integer text become integers
///
/// Anything else is logged and returned unchanged.
pub fn coerce_counter(value: &Value, source: &str) -> Value {
    match value {
        Value::Int(_) => value.clone(),
        Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::Int(*f as i64),
        Value::Text(s) => match s.trim().parse::<i64>() {
            Ok(i) => Value::Int(i),
            Err(_) => {
                warn!("{}: counter '{}' is not an integer", source, s);
                value.clone()
            },
        },
        Value::Float(_) => {
            warn!("{}: counter {} is not an integer", source, value);
            value.clone()
        },
    }
}
