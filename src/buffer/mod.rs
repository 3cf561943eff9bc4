//! Experience storage for on-policy training
//!
//! Rollouts are recorded time-major across all pooled environments, turned
//! into discounted returns and GAE advantages, and flattened into aligned
//! arrays ready for shuffled minibatch training.

pub mod rollout;

pub use rollout::{Batch, RolloutBuffer};
