//! Batched environment pool
//!
//! N independently-stepping environments, all advanced once per timestep.
//! The payoff is batching: one policy forward pass covers every slot, and
//! one telemetry/checkpoint operation covers the whole pool. Stepping uses
//! Rayon's indexed iteration, so results come back in slot order and runs
//! are reproducible; there is no cross-slot coupling of any kind.

use anyhow::Result;
use rayon::prelude::*;

use crate::env::auto_reset::AutoReset;
use crate::env::{Environment, SpaceInfo, Step};

/// A pool of auto-resetting environments stepped in lockstep
pub struct EnvPool<E: Environment> {
    slots: Vec<AutoReset<E>>,
}

impl<E: Environment + Send> EnvPool<E> {
    /// Build a pool from a set of environments
    ///
    /// Every environment is reset once to obtain its initial observation.
    pub fn new(envs: Vec<E>) -> Result<Self> {
        anyhow::ensure!(!envs.is_empty(), "environment pool cannot be empty");
        let slots = envs
            .into_iter()
            .map(AutoReset::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { slots })
    }

    /// Number of environments in the pool
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool is empty (never true for a constructed pool)
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Snapshot the current observation of every slot, in slot order
    pub fn observations(&self) -> Vec<Vec<f32>> {
        self.slots.iter().map(|slot| slot.observation().to_vec()).collect()
    }

    /// Step every environment once with its own action
    ///
    /// Results are returned in slot order. A failure in any environment
    /// propagates; the engine does not mask collaborator failures.
    pub fn step(&mut self, actions: &[i64]) -> Result<Vec<Step>> {
        anyhow::ensure!(
            actions.len() == self.slots.len(),
            "got {} actions for {} environments",
            actions.len(),
            self.slots.len()
        );

        self.slots
            .par_iter_mut()
            .zip(actions.par_iter())
            .map(|(slot, &action)| slot.step(action))
            .collect()
    }

    /// Observation space of the pooled environments
    pub fn observation_space(&self) -> SpaceInfo {
        self.slots[0].observation_space()
    }

    /// Action space of the pooled environments
    pub fn action_space(&self) -> SpaceInfo {
        self.slots[0].action_space()
    }
}
