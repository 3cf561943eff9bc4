//! Rollout storage and return/advantage estimation
//!
//! Transitions are recorded in time-major order: for each of `T` timesteps,
//! one entry per environment, so index `t * num_envs + e` addresses
//! timestep `t` of environment `e` in every parallel array. That layout is
//! an invariant: flattened returns and advantages stay aligned
//! index-for-index with the transitions they were computed from, and the
//! joint shuffle permutes every array with the same permutation.
//!
//! # Estimation
//!
//! Given rewards `r[t]`, continuation masks `mask[t] = 1 - done[t]`, value
//! estimates `v[0..T]` and a bootstrap value `v[T]`:
//!
//! ```text
//! A[t]  = r[t] + γ·mask[t]·v[t+1] − v[t]          (one-step advantage)
//! A[t] += γ·λ·mask[t]·A[t+1]                       (backward GAE recursion)
//! R[T−1] += mask[T−1]·γ·v[T]                       (bootstrap fold)
//! R[t] += γ·mask[t]·R[t+1]                         (backward return recursion)
//! ```
//!
//! `mask[t] = 0` truncates both recursions: nothing propagates across an
//! episode boundary.

use rand::seq::SliceRandom;
use rand::Rng;

/// Time-major transition storage for one rollout
///
/// Entries must be pushed one full timestep at a time: all environments in
/// slot order for timestep 0, then all for timestep 1, and so on.
#[derive(Debug)]
pub struct RolloutBuffer {
    num_envs: usize,
    states: Vec<Vec<f32>>,
    actions: Vec<i64>,
    behavior_probs: Vec<f32>,
    rewards: Vec<f32>,
    masks: Vec<f32>,
    values: Vec<f32>,
}

impl RolloutBuffer {
    /// Create a buffer for `num_envs` environments
    pub fn new(num_envs: usize, steps_hint: usize) -> Self {
        let capacity = num_envs * steps_hint;
        Self {
            num_envs,
            states: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            behavior_probs: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            masks: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Record one transition
    ///
    /// `behavior_prob` is the probability the policy assigned to `action`
    /// at the moment it was sampled; the objective later compares it
    /// against the updated policy.
    pub fn push(
        &mut self,
        state: Vec<f32>,
        action: i64,
        behavior_prob: f32,
        reward: f32,
        done: bool,
        value: f32,
    ) {
        self.states.push(state);
        self.actions.push(action);
        self.behavior_probs.push(behavior_prob);
        self.rewards.push(reward);
        self.masks.push(if done { 0.0 } else { 1.0 });
        self.values.push(value);
    }

    /// Number of recorded transitions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the buffer holds no transitions
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Compute returns and advantages, consuming the buffer into a [`Batch`]
    ///
    /// `bootstrap` holds the value estimate of each environment's
    /// post-horizon state, terminating the backward recursions. When
    /// `reward_clip > 0` rewards are clipped element-wise to
    /// `[-reward_clip, reward_clip]` before estimation.
    pub fn finish(self, bootstrap: &[f32], gamma: f32, lambda: f32, reward_clip: f32) -> Batch {
        let n = self.num_envs;
        assert_eq!(bootstrap.len(), n, "bootstrap values must match the environment count");
        assert!(!self.is_empty(), "cannot finish an empty rollout");
        assert_eq!(self.len() % n, 0, "rollout must hold complete timesteps");
        let steps = self.len() / n;

        let mut rewards = self.rewards;
        if reward_clip > 0.0 {
            for r in &mut rewards {
                *r = r.clamp(-reward_clip, reward_clip);
            }
        }

        // One-step advantages over the whole grid first; the recursion below
        // then folds in the λ-weighted tail.
        let mut advantages = vec![0.0_f32; rewards.len()];
        for t in 0..steps {
            for e in 0..n {
                let i = t * n + e;
                let next_value = if t + 1 == steps { bootstrap[e] } else { self.values[i + n] };
                advantages[i] =
                    rewards[i] + gamma * self.masks[i] * next_value - self.values[i];
            }
        }

        // Returns reuse the (clipped) rewards in place, bootstrap folded
        // into the final timestep.
        let mut returns = rewards;
        for e in 0..n {
            let i = (steps - 1) * n + e;
            returns[i] += self.masks[i] * gamma * bootstrap[e];
        }
        for t in (0..steps.saturating_sub(1)).rev() {
            for e in 0..n {
                let i = t * n + e;
                returns[i] += gamma * self.masks[i] * returns[i + n];
                advantages[i] += gamma * lambda * self.masks[i] * advantages[i + n];
            }
        }

        Batch {
            states: self.states,
            actions: self.actions,
            behavior_probs: self.behavior_probs,
            returns,
            advantages,
            values: self.values,
        }
    }
}

/// A finished rollout, flattened and ready for training
///
/// All arrays are aligned: index `i` denotes the same transition in every
/// field.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Observations at decision time
    pub states: Vec<Vec<f32>>,

    /// Actions taken
    pub actions: Vec<i64>,

    /// Probability of each action under the policy that sampled it
    pub behavior_probs: Vec<f32>,

    /// Discounted returns (bootstrap folded in)
    pub returns: Vec<f32>,

    /// GAE advantages
    pub advantages: Vec<f32>,

    /// Value estimates at decision time
    pub values: Vec<f32>,
}

impl Batch {
    /// Number of transitions in the batch
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Apply one joint random permutation to every aligned array
    ///
    /// A single permutation is drawn and applied in lockstep, so pairwise
    /// correspondence between arrays is preserved.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        let mut perm: Vec<usize> = (0..self.len()).collect();
        perm.shuffle(rng);

        self.states = perm.iter().map(|&i| std::mem::take(&mut self.states[i])).collect();
        self.actions = perm.iter().map(|&i| self.actions[i]).collect();
        self.behavior_probs = perm.iter().map(|&i| self.behavior_probs[i]).collect();
        self.returns = perm.iter().map(|&i| self.returns[i]).collect();
        self.advantages = perm.iter().map(|&i| self.advantages[i]).collect();
        self.values = perm.iter().map(|&i| self.values[i]).collect();
    }

    /// Start offsets of the full minibatch windows of `size` transitions
    ///
    /// The trailing transitions that do not fill a complete window are
    /// dropped.
    pub fn minibatch_offsets(&self, size: usize) -> impl Iterator<Item = usize> {
        let len = self.len();
        (0..len.saturating_sub(size.saturating_sub(1))).step_by(size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn single_env_buffer(rewards: &[f32], dones: &[bool], values: &[f32]) -> RolloutBuffer {
        let mut buffer = RolloutBuffer::new(1, rewards.len());
        for i in 0..rewards.len() {
            buffer.push(vec![i as f32], 0, 0.5, rewards[i], dones[i], values[i]);
        }
        buffer
    }

    #[test]
    fn test_discounted_return_recursion() {
        // Constant reward, no terminals, zero values, zero bootstrap:
        // R[i] = r + γ·R[i+1] and R[0] = r·(1−γⁿ)/(1−γ).
        let gamma = 0.9_f32;
        let r = 2.0_f32;
        let n = 5;
        let buffer = single_env_buffer(&[r; 5], &[false; 5], &[0.0; 5]);
        let batch = buffer.finish(&[0.0], gamma, 0.95, 0.0);

        for i in 0..n - 1 {
            assert!((batch.returns[i] - (r + gamma * batch.returns[i + 1])).abs() < 1e-5);
        }
        let closed_form = r * (1.0 - gamma.powi(n as i32)) / (1.0 - gamma);
        assert!((batch.returns[0] - closed_form).abs() < 1e-4);
    }

    #[test]
    fn test_gae_numeric_scenario() {
        // γ = λ = 0.9, two steps, v = [1, 1] with bootstrap 1, zero reward.
        let buffer = single_env_buffer(&[0.0, 0.0], &[false, false], &[1.0, 1.0]);
        let batch = buffer.finish(&[1.0], 0.9, 0.9, 0.0);

        assert!((batch.advantages[0] - (-0.181)).abs() < 1e-5);
        assert!((batch.advantages[1] - (-0.1)).abs() < 1e-5);
        assert!((batch.returns[0] - 0.81).abs() < 1e-5);
        assert!((batch.returns[1] - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_mask_truncates_both_recursions() {
        // Terminal at t=1: nothing after it may leak into t <= 1.
        let a = single_env_buffer(&[1.0, 1.0, 1.0], &[false, true, false], &[0.0, 0.0, 0.0]);
        let b = single_env_buffer(&[1.0, 1.0, 50.0], &[false, true, false], &[0.0, 0.0, 0.0]);

        let a = a.finish(&[0.0], 0.99, 0.95, 0.0);
        let b = b.finish(&[7.0], 0.99, 0.95, 0.0);

        assert_eq!(a.advantages[0], b.advantages[0]);
        assert_eq!(a.advantages[1], b.advantages[1]);
        assert_eq!(a.returns[0], b.returns[0]);
        assert_eq!(a.returns[1], b.returns[1]);
        assert_ne!(a.returns[2], b.returns[2]);
    }

    #[test]
    fn test_bootstrap_reaches_last_slot_only_when_running() {
        let running = single_env_buffer(&[0.0], &[false], &[0.0]);
        let done = single_env_buffer(&[0.0], &[true], &[0.0]);

        let running = running.finish(&[2.0], 0.5, 0.95, 0.0);
        let done = done.finish(&[2.0], 0.5, 0.95, 0.0);

        assert!((running.returns[0] - 1.0).abs() < 1e-6);
        assert_eq!(done.returns[0], 0.0);
    }

    #[test]
    fn test_reward_clipping() {
        let buffer = single_env_buffer(&[10.0, -10.0], &[false, false], &[0.0, 0.0]);
        let batch = buffer.finish(&[0.0], 0.0, 0.95, 1.0);
        assert_eq!(batch.returns, vec![1.0, -1.0]);
    }

    #[test]
    fn test_time_major_interleaving() {
        // Two environments: env 0 sees reward 1, env 1 sees reward 2, for
        // two timesteps. γ = 0 isolates each slot's own reward.
        let mut buffer = RolloutBuffer::new(2, 2);
        for _t in 0..2 {
            buffer.push(vec![0.0], 0, 0.5, 1.0, false, 0.0);
            buffer.push(vec![1.0], 0, 0.5, 2.0, false, 0.0);
        }
        let batch = buffer.finish(&[0.0, 0.0], 0.0, 0.95, 0.0);
        assert_eq!(batch.returns, vec![1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_lockstep_shuffle_preserves_correspondence() {
        let n = 64;
        let mut batch = Batch {
            states: (0..n).map(|i| vec![i as f32]).collect(),
            actions: (0..n as i64).collect(),
            behavior_probs: (0..n).map(|i| i as f32 * 0.01).collect(),
            returns: (0..n).map(|i| i as f32 * 2.0).collect(),
            advantages: (0..n).map(|i| i as f32 * 3.0).collect(),
            values: (0..n).map(|i| i as f32 * 4.0).collect(),
        };

        let mut rng = StdRng::seed_from_u64(7);
        batch.shuffle(&mut rng);

        let mut seen = vec![false; n];
        for j in 0..n {
            let i = batch.actions[j] as usize;
            assert_eq!(batch.states[j], vec![i as f32]);
            assert_eq!(batch.behavior_probs[j], i as f32 * 0.01);
            assert_eq!(batch.returns[j], i as f32 * 2.0);
            assert_eq!(batch.advantages[j], i as f32 * 3.0);
            assert_eq!(batch.values[j], i as f32 * 4.0);
            seen[i] = true;
        }
        assert!(seen.iter().all(|&s| s), "shuffle must be a permutation");
    }

    #[test]
    fn test_minibatch_offsets_drop_partial_tail() {
        let batch = Batch {
            states: vec![vec![0.0]; 10],
            actions: vec![0; 10],
            behavior_probs: vec![0.5; 10],
            returns: vec![0.0; 10],
            advantages: vec![0.0; 10],
            values: vec![0.0; 10],
        };

        let offsets: Vec<usize> = batch.minibatch_offsets(4).collect();
        assert_eq!(offsets, vec![0, 4]);

        let offsets: Vec<usize> = batch.minibatch_offsets(5).collect();
        assert_eq!(offsets, vec![0, 5]);

        let offsets: Vec<usize> = batch.minibatch_offsets(16).collect();
        assert!(offsets.is_empty());
    }
}
