//! Time-window batching of records between flushes

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::records::SslogRecord;

/// Records collected over one aggregation window
#[derive(Debug, Clone)]
pub struct Batch {
    pub window_start: DateTime<Utc>,
    pub records: Vec<SslogRecord>,
}

/// Collects records and hands out a batch whenever a window has elapsed
#[derive(Debug)]
pub struct BatchAccumulator {
    window: chrono::Duration,
    window_start: Option<DateTime<Utc>>,
    records: Vec<SslogRecord>,
}

impl BatchAccumulator {
    pub fn new(window: Duration) -> Self {
        let window =
            chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(36_500));
        Self {
            window,
            window_start: None,
            records: Vec::new(),
        }
    }

    /// Add one poll's records taken at `at`
    ///
    /// When the current window is at least one aggregation period old it is
    /// closed and returned before the new records open the next window.
    pub fn push(&mut self, at: DateTime<Utc>, records: Vec<SslogRecord>) -> Option<Batch> {
        let closed = match self.window_start {
            Some(start) if at - start >= self.window => self.take(),
            _ => None,
        };

        if self.window_start.is_none() {
            self.window_start = Some(at);
        }
        self.records.extend(records);
        closed
    }

    /// Close the current window regardless of its age
    pub fn take(&mut self) -> Option<Batch> {
        let window_start = self.window_start.take()?;
        Some(Batch {
            window_start,
            records: std::mem::take(&mut self.records),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
