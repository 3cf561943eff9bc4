//! Policy traits and implementations
//!
//! The training engine treats the policy network as an opaque,
//! differentiable collaborator: a batched forward pass producing an action
//! distribution and a value estimate, plus access to the trainable
//! parameter store for optimization and persistence.

use tch::{nn, Device, Tensor};

pub mod mlp;

/// Contract for trainable policies
///
/// `forward` must return `(probs, values)` where `probs` is a
/// `[batch, num_actions]` tensor of action probabilities (rows summing to
/// one) and `values` is a `[batch]` tensor of state-value estimates. Both
/// outputs must be differentiable with respect to the variables in the
/// policy's `VarStore`.
pub trait Policy {
    /// Batched forward pass: action probabilities and value estimates
    fn forward(&self, states: &Tensor) -> (Tensor, Tensor);

    /// The variable store holding the trainable parameters
    fn var_store(&self) -> &nn::VarStore;

    /// Mutable access to the variable store (checkpoint loading)
    fn var_store_mut(&mut self) -> &mut nn::VarStore;

    /// Device the policy's parameters live on
    fn device(&self) -> Device {
        self.var_store().device()
    }
}
