//! Training algorithms and persistent training state

pub mod ppo;
pub mod state;

pub use state::TrainState;
