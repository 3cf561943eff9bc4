//! Gradient computation and optimizer stepping
//!
//! Wraps an Adam optimizer over the policy's variable store. Each step
//! backpropagates the combined objective, measures the global gradient
//! norm, optionally rescales gradients so the norm stays within the
//! configured bound, and applies one parameter update.

use anyhow::Result;
use tch::{nn, nn::OptimizerConfig, Kind, Tensor};

/// Applies clipped gradient updates to the policy parameters
#[derive(Debug)]
pub struct Trainer {
    optimizer: nn::Optimizer,
    max_gradient_norm: f64,
}

impl Trainer {
    /// Numerical-stability epsilon for the adaptive-moment estimates
    const ADAM_EPS: f64 = 1e-6;

    /// Build a trainer over `vs` with a constant learning rate
    ///
    /// A non-positive `max_gradient_norm` disables gradient clipping
    /// entirely; this is an explicit, supported mode rather than an error.
    pub fn new(vs: &nn::VarStore, learning_rate: f64, max_gradient_norm: f64) -> Result<Self> {
        let optimizer =
            nn::Adam { eps: Self::ADAM_EPS, ..Default::default() }.build(vs, learning_rate)?;
        Ok(Self { optimizer, max_gradient_norm })
    }

    /// Backpropagate `loss` and take one optimizer step
    ///
    /// Returns the global L2 norm of the gradient measured before
    /// clipping.
    pub fn step(&mut self, vs: &nn::VarStore, loss: &Tensor) -> f64 {
        self.optimizer.zero_grad();
        loss.backward();

        let grad_norm = global_grad_norm(vs);
        if self.max_gradient_norm > 0.0 {
            self.optimizer.clip_grad_norm(self.max_gradient_norm);
        }
        self.optimizer.step();
        grad_norm
    }
}

/// Global L2 norm over the gradients of every trainable variable
fn global_grad_norm(vs: &nn::VarStore) -> f64 {
    let mut sum_squares = 0.0;
    for var in vs.trainable_variables() {
        let grad = var.grad();
        if grad.defined() {
            sum_squares += f64::try_from(grad.square().sum(Kind::Float)).unwrap_or(0.0);
        }
    }
    sum_squares.sqrt()
}
