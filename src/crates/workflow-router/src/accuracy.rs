//! Historical routing accuracy per agent, surfaced in the routing
//! explanation narrative when enough observations exist.

use std::collections::HashMap;
use std::sync::Mutex;

const MIN_SAMPLES_FOR_REPORTING: usize = 5;

#[derive(Default)]
struct AgentTally {
    correct: u64,
    total: u64,
}

#[derive(Default)]
pub struct AccuracyTracker {
    tallies: Mutex<HashMap<String, AgentTally>>,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, agent: &str, was_correct: bool) {
        let mut tallies = self.tallies.lock().unwrap();
        let tally = tallies.entry(agent.to_string()).or_default();
        tally.total += 1;
        if was_correct {
            tally.correct += 1;
        }
    }

    /// Fraction of correct routes for `agent`, or `None` if too few samples
    /// have been recorded to be meaningful.
    pub fn get_accuracy(&self, agent: &str) -> Option<f64> {
        let tallies = self.tallies.lock().unwrap();
        let tally = tallies.get(agent)?;
        if tally.total < MIN_SAMPLES_FOR_REPORTING as u64 {
            return None;
        }
        Some(tally.correct as f64 / tally.total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_hidden_until_minimum_sample_count() {
        let tracker = AccuracyTracker::new();
        for _ in 0..4 {
            tracker.record("agent-a", true);
        }
        assert_eq!(tracker.get_accuracy("agent-a"), None);
        tracker.record("agent-a", false);
        assert!(tracker.get_accuracy("agent-a").is_some());
    }

    #[test]
    fn accuracy_is_correct_over_total() {
        let tracker = AccuracyTracker::new();
        for _ in 0..8 {
            tracker.record("agent-a", true);
        }
        for _ in 0..2 {
            tracker.record("agent-a", false);
        }
        assert_eq!(tracker.get_accuracy("agent-a"), Some(0.8));
    }
}
