use std::collections::VecDeque;

use crate::measurement::MeasurementRecord;

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Most recent measurements, newest first.
///
/// Repeated identical records are all kept; the trend view cares about
/// density, not uniqueness.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<MeasurementRecord>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: MeasurementRecord) {
        self.entries.push_front(record);
        self.entries.truncate(self.capacity);
    }

    /// Newest first.
    pub fn all(&self) -> Vec<MeasurementRecord> {
        self.entries.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeasurementRecord> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&MeasurementRecord> {
        self.entries.front()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::Severity;

    fn rec(px: f64) -> MeasurementRecord {
        MeasurementRecord::new(px, 0.0, Severity::Ok, 0.0)
    }

    #[test]
    fn overflow_evicts_oldest_and_reads_newest_first() {
        let mut h = HistoryBuffer::new(20);
        for i in 0..45 {
            h.push(rec(i as f64));
        }
        assert_eq!(h.len(), 20);
        let all = h.all();
        assert_eq!(all.first().unwrap().offset_pixels, 44.0);
        assert_eq!(all.last().unwrap().offset_pixels, 25.0);
        assert!(all.windows(2).all(|w| w[0].offset_pixels > w[1].offset_pixels));
    }

    #[test]
    fn duplicates_are_retained() {
        let mut h = HistoryBuffer::default();
        h.push(rec(3.0));
        h.push(rec(3.0));
        h.push(rec(3.0));
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn clear_and_zero_capacity() {
        let mut h = HistoryBuffer::new(0);
        assert_eq!(h.capacity(), 1);
        h.push(rec(1.0));
        h.push(rec(2.0));
        assert_eq!(h.all(), vec![rec(2.0)]);
        h.clear();
        assert!(h.is_empty());
        assert!(h.latest().is_none());
    }
}
