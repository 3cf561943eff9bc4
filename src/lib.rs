//! # Torque
//!
//! A Proximal Policy Optimization training engine in Rust + libtorch
//!
//! Torque trains a parametric policy against a pool of simulated
//! environments. The engine owns rollout collection, return/advantage
//! estimation, the clipped surrogate objective, gradient-clipped
//! optimization, and a resumable checkpointed training loop; the policy
//! network and the environment simulators are collaborators supplied by the
//! caller.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use torque_rl::env::cartpole::CartPole;
//! use torque_rl::policy::mlp::MlpPolicy;
//! use torque_rl::telemetry::NullSink;
//! use torque_rl::train::ppo::{PpoConfig, PpoEngine, TrainOptions};
//!
//! let envs: Vec<CartPole> = (0..8).map(|_| CartPole::new()).collect();
//! let policy = MlpPolicy::new(4, 2, 64);
//! let mut engine = PpoEngine::new(
//!     PpoConfig::new(),
//!     envs,
//!     policy,
//!     "data/cartpole",
//!     Box::new(NullSink),
//! ).unwrap();
//! engine.train(100_000, &TrainOptions::default()).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Environment contract, auto-reset wrapper, and the batched pool
pub mod env;

/// Policy contract and the built-in MLP policy network
pub mod policy;

/// Rollout storage and return/advantage estimation
pub mod buffer;

/// PPO objective, optimizer step, and the training loop
pub mod train;

/// Checkpoint persistence and restoration
pub mod checkpoint;

/// Telemetry sinks and bounded statistics buffers
pub mod telemetry;

/// Current version of torque-rl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
