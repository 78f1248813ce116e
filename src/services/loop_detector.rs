//! Non-progress detection over recent state snapshots.

use std::collections::VecDeque;

use crate::domain::models::StateSnapshot;

/// Default number of snapshots retained.
pub const DEFAULT_WINDOW: usize = 20;
/// Default multiplicity above which the latest snapshot counts as a loop.
pub const DEFAULT_REPEAT_THRESHOLD: usize = 2;

/// Bounded history of serialized snapshots.
///
/// A statistical heuristic: a run that keeps landing on the same counts is
/// treated as stuck, even if the plateau is legitimate.
#[derive(Debug, Clone)]
pub struct LoopDetector {
    history: VecDeque<String>,
    window: usize,
    threshold: usize,
}

impl LoopDetector {
    pub fn new(window: usize, threshold: usize) -> Self {
        let window = window.max(1);
        Self {
            history: VecDeque::with_capacity(window),
            window,
            threshold,
        }
    }

    /// Append a snapshot, evicting the oldest entry when full.
    pub fn record(&mut self, snapshot: &StateSnapshot) {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(snapshot.key());
    }

    /// Whether the latest snapshot appears more than `threshold` times.
    pub fn is_loop(&self) -> bool {
        let Some(latest) = self.history.back() else {
            return false;
        };
        self.history.iter().filter(|key| *key == latest).count() > self.threshold
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_REPEAT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn snap(pending: usize, completed: usize) -> StateSnapshot {
        StateSnapshot {
            pending,
            completed,
            failed: 0,
            cancelled: 0,
        }
    }

    #[test]
    fn test_three_repeats_is_a_loop() {
        let mut detector = LoopDetector::default();
        detector.record(&snap(2, 1));
        detector.record(&snap(2, 1));
        assert!(!detector.is_loop());
        detector.record(&snap(2, 1));
        assert!(detector.is_loop());

        detector.reset();
        assert!(!detector.is_loop());
        assert!(detector.is_empty());
    }

    #[test]
    fn test_only_latest_snapshot_counts() {
        let mut detector = LoopDetector::default();
        for _ in 0..3 {
            detector.record(&snap(1, 0));
        }
        detector.record(&snap(0, 1));
        assert!(!detector.is_loop());
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut detector = LoopDetector::new(3, 2);
        detector.record(&snap(1, 1));
        detector.record(&snap(1, 1));
        detector.record(&snap(5, 5));
        detector.record(&snap(5, 6));
        assert_eq!(detector.len(), 3);
        detector.record(&snap(1, 1));
        // the two earlier (1,1) entries have been evicted
        assert!(!detector.is_loop());
    }

    #[test]
    fn test_progressing_run_never_loops() {
        let mut detector = LoopDetector::default();
        for i in 0..50 {
            detector.record(&snap(10, i));
            assert!(!detector.is_loop());
        }
        assert_eq!(detector.len(), DEFAULT_WINDOW);
    }
}
