//! Persistent training state
//!
//! Process state that outlives a single training cycle and must survive
//! checkpoint/restore with exact values. It is owned by the training loop
//! and threaded explicitly through every component that reads or mutates
//! it; nothing here is global.

use serde::{Deserialize, Serialize};

/// Counters and running estimates carried across training cycles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainState {
    /// Total environment steps taken, across all pooled environments
    pub num_steps: u64,

    /// Total episodes completed
    pub num_episodes: u64,

    /// Slow exponential-moving-average of the batch pseudo-entropy
    ///
    /// Used by the `smooth` value-loss rescaling mode; updated by the
    /// objective's EMA-pull term and mirrored here at checkpoint
    /// boundaries.
    pub smoothed_pseudo_entropy: f64,
}

impl Default for TrainState {
    fn default() -> Self {
        Self { num_steps: 0, num_episodes: 0, smoothed_pseudo_entropy: 1.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_roundtrip_is_exact() {
        let state = TrainState {
            num_steps: 123_456_789,
            num_episodes: 4242,
            smoothed_pseudo_entropy: 0.123456789012345,
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: TrainState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn test_cold_start_defaults() {
        let state = TrainState::default();
        assert_eq!(state.num_steps, 0);
        assert_eq!(state.num_episodes, 0);
        assert_eq!(state.smoothed_pseudo_entropy, 1.0);
    }
}
