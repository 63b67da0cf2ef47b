//! Compact ordered set of sequence numbers
//!
//! Stored as disjoint, non-adjacent inclusive intervals keyed by their start,
//! so a run of consecutive sequence numbers costs one map entry.

use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Range {
    intervals: BTreeMap<i64, i64>,
}

impl Range {
    pub fn new() -> Self {
        Self::default()
    }

    /// Range holding every value in `start..=end`
    pub fn from_interval(start: i64, end: i64) -> Self {
        let mut range = Self::new();
        range.add_interval(start, end);
        range
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of values held
    pub fn len(&self) -> u64 {
        self.intervals
            .iter()
            .map(|(&start, &end)| end.abs_diff(start) + 1)
            .sum()
    }

    /// Number of stored intervals
    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    pub fn contains(&self, value: i64) -> bool {
        self.intervals
            .range(..=value)
            .next_back()
            .is_some_and(|(_, &end)| value <= end)
    }

    pub fn first(&self) -> Option<i64> {
        self.intervals.first_key_value().map(|(&start, _)| start)
    }

    pub fn last(&self) -> Option<i64> {
        self.intervals.last_key_value().map(|(_, &end)| end)
    }

    /// Add one value; returns false if it was already present
    pub fn add(&mut self, value: i64) -> bool {
        if self.contains(value) {
            return false;
        }
        self.add_interval(value, value);
        true
    }

    /// Add every value in `start..=end`, merging with overlapping or adjacent intervals
    pub fn add_interval(&mut self, start: i64, end: i64) {
        if start > end {
            return;
        }
        let mut merged_start = start;
        let mut merged_end = end;

        if let Some((&prev_start, &prev_end)) = self.intervals.range(..start).next_back() {
            if prev_end >= start.saturating_sub(1) {
                merged_start = prev_start;
                merged_end = merged_end.max(prev_end);
                self.intervals.remove(&prev_start);
            }
        }

        let following: Vec<i64> = self
            .intervals
            .range(start..=end.saturating_add(1))
            .map(|(&s, _)| s)
            .collect();
        for next_start in following {
            if let Some(next_end) = self.intervals.remove(&next_start) {
                merged_end = merged_end.max(next_end);
            }
        }

        self.intervals.insert(merged_start, merged_end);
    }

    /// Remove one value; returns false if it was not present
    pub fn remove(&mut self, value: i64) -> bool {
        if !self.contains(value) {
            return false;
        }
        self.remove_interval(value, value);
        true
    }

    /// Remove every value in `start..=end`, splitting intervals as needed
    pub fn remove_interval(&mut self, start: i64, end: i64) {
        if start > end {
            return;
        }
        let mut affected: Vec<(i64, i64)> = Vec::new();
        if let Some((&s, &e)) = self.intervals.range(..start).next_back() {
            if e >= start {
                affected.push((s, e));
            }
        }
        affected.extend(self.intervals.range(start..=end).map(|(&s, &e)| (s, e)));

        for (s, e) in affected {
            self.intervals.remove(&s);
            if s < start {
                self.intervals.insert(s, start - 1);
            }
            if e > end {
                self.intervals.insert(end + 1, e);
            }
        }
    }

    /// Remove and return the smallest value
    pub fn pop_first(&mut self) -> Option<i64> {
        let first = self.first()?;
        self.remove_interval(first, first);
        Some(first)
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
    }

    /// Add every value of `other`
    pub fn union(&mut self, other: &Range) {
        for (&start, &end) in &other.intervals {
            self.add_interval(start, end);
        }
    }

    /// Remove every value of `other`
    pub fn difference(&mut self, other: &Range) {
        for (&start, &end) in &other.intervals {
            self.remove_interval(start, end);
        }
    }

    /// Ascending iterator over the held values
    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.intervals.iter().flat_map(|(&start, &end)| start..=end)
    }

    /// The stored `(start, end)` intervals in ascending order
    pub fn intervals(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.intervals.iter().map(|(&s, &e)| (s, e))
    }
}

impl FromIterator<i64> for Range {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        let mut range = Range::new();
        range.extend(iter);
        range
    }
}

impl Extend<i64> for Range {
    fn extend<I: IntoIterator<Item = i64>>(&mut self, iter: I) {
        for value in iter {
            self.add(value);
        }
    }
}
