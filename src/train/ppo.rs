//! Proximal Policy Optimization
//!
//! The engine repeats a collect → estimate → shuffle → minibatch-train
//! cycle until a step budget is exhausted, checkpointing and flushing
//! telemetry on configured cadences.
//!
//! ```text
//! For each cycle:
//!   1. Collect steps_per_env transitions from every pooled environment
//!   2. Compute discounted returns and GAE advantages
//!   3. Jointly shuffle all aligned batch arrays once
//!   4. For each epoch, slide a fixed minibatch window over the batch:
//!      evaluate the clipped objective, clip gradients, take an Adam step
//! ```
//!
//! The policy objective is a sign-folded variant of the clipped surrogate:
//! the advantage's sign is folded into the clipped quantity instead of
//! clipping a probability ratio directly. See [`loss`] for the exact form.

pub mod config;
pub mod engine;
pub mod loss;
pub mod stats;
pub mod trainer;

pub use config::{PolicyRectifier, PpoConfig, TrainOptions, ValueGradRescaling};
pub use engine::PpoEngine;
pub use stats::StepStats;
