//! Environment traits and implementations
//!
//! This module defines the environment interface the training engine
//! consumes. An environment produces flat `f32` observations, accepts
//! discrete actions, and signals episode completion with a single `done`
//! flag; episode statistics travel in [`StepInfo`] on the terminal step.
//!
//! Environments handed to the engine are wrapped in [`auto_reset::AutoReset`]
//! so that a terminated episode is transparently restarted, and grouped into
//! an [`pool::EnvPool`] which steps all of them once per timestep.

use anyhow::Result;

pub mod auto_reset;
pub mod cartpole;
pub mod pool;

/// Core trait for RL environments
///
/// The engine only requires the batched-`f32` contract: observations are
/// flat vectors of a fixed dimension and actions are discrete indices.
pub trait Environment {
    /// Reset the environment and return the initial observation
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Step the environment with an action
    fn step(&mut self, action: i64) -> Result<Step>;

    /// Get the observation space dimensions
    fn observation_space(&self) -> SpaceInfo;

    /// Get the action space dimensions
    fn action_space(&self) -> SpaceInfo;
}

/// Result of an environment step
#[derive(Debug, Clone)]
pub struct Step {
    /// Next observation
    pub observation: Vec<f32>,

    /// Reward received
    pub reward: f32,

    /// Whether the episode ended on this step
    pub done: bool,

    /// Additional info; episode statistics are present when `done` is true
    pub info: StepInfo,
}

/// Additional step information
#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    /// Statistics for the episode that ended on this step, if any
    pub episode: Option<EpisodeStats>,
}

/// Summary of a completed episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeStats {
    /// Total undiscounted reward accumulated over the episode
    pub reward: f32,

    /// Number of steps the episode lasted
    pub length: u64,
}

/// Space information for observations and actions
#[derive(Debug, Clone)]
pub struct SpaceInfo {
    /// Shape of the space
    pub shape: Vec<usize>,

    /// Data type
    pub dtype: SpaceType,
}

/// Space data types
#[derive(Debug, Clone, Copy)]
pub enum SpaceType {
    /// Discrete space with n options
    Discrete(usize),

    /// Continuous space
    Continuous,
}
