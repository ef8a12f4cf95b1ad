//! Bounded in-memory record of past `/predict/image` calls.

use serde::{Serialize, Serializer, ser::SerializeMap};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const HISTORY_CAPACITY: usize = 100;
pub const RECENT_WINDOW: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub num_detections: usize,
    pub objects: Vec<String>,
}

impl HistoryEntry {
    pub fn new(timestamp: impl Into<String>, objects: Vec<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            num_detections: objects.len(),
            objects,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySnapshot {
    /// Entries currently retained, not just the ones returned.
    pub total_detections: usize,
    pub history: Vec<HistoryEntry>,
}

/// Per-class counts in the order each class was first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassBreakdown(Vec<(String, usize)>);

impl ClassBreakdown {
    fn increment(&mut self, name: &str) {
        match self.0.iter_mut().find(|(n, _)| n == name) {
            Some((_, count)) => *count += 1,
            None => self.0.push((name.to_string(), 1)),
        }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, c)| *c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(n, c)| (n.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest count; on a tie the class seen first wins.
    pub fn most_common(&self) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        for (name, count) in self.iter() {
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((name, count));
            }
        }
        best.map(|(name, _)| name)
    }
}

impl Serialize for ClassBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, count) in &self.0 {
            map.serialize_entry(name, count)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total_sessions: usize,
    pub total_objects_detected: usize,
    pub most_detected: Option<String>,
    pub object_breakdown: ClassBreakdown,
}

#[derive(Debug)]
pub struct HistoryLedger {
    entries: Mutex<VecDeque<HistoryEntry>>,
    capacity: usize,
}

impl HistoryLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HistoryEntry>> {
        // Every mutation leaves the deque consistent, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends, evicting the oldest entries beyond capacity.
    pub fn append(&self, entry: HistoryEntry) {
        let mut entries = self.lock();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The newest `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> HistorySnapshot {
        let entries = self.lock();
        let skip = entries.len().saturating_sub(limit);
        HistorySnapshot {
            total_detections: entries.len(),
            history: entries.iter().skip(skip).cloned().collect(),
        }
    }

    pub fn stats(&self) -> Stats {
        let entries = self.lock();
        let mut breakdown = ClassBreakdown::default();
        let mut total_objects = 0;

        for entry in entries.iter() {
            for name in &entry.objects {
                breakdown.increment(name);
                total_objects += 1;
            }
        }

        Stats {
            total_sessions: entries.len(),
            total_objects_detected: total_objects,
            most_detected: breakdown.most_common().map(str::to_string),
            object_breakdown: breakdown,
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}
