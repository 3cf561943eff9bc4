//! Multi-layer perceptron policy for discrete actions
//!
//! A small actor-critic network: two shared tanh layers feeding a softmax
//! policy head and a scalar value head. Orthogonal initialization is used
//! for the hidden layers (gain √2) with a small-gain output layer, which
//! tends to behave better than Gaussian init for on-policy RL.

use anyhow::Result;
use tch::nn::{self, Init, Module};
use tch::{Device, Kind, Tensor};

use crate::policy::Policy;

/// Feedforward policy network with shared trunk and two heads
pub struct MlpPolicy {
    vs: nn::VarStore,
    shared: nn::Sequential,
    policy_head: nn::Linear,
    value_head: nn::Linear,
}

impl MlpPolicy {
    /// Create a policy for `obs_dim` observations and `action_dim` actions
    pub fn new(obs_dim: i64, action_dim: i64, hidden_dim: i64) -> Self {
        let device = Device::cuda_if_available();
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let hidden_config = nn::LinearConfig {
            ws_init: Init::Orthogonal { gain: 2.0_f64.sqrt() },
            ..Default::default()
        };
        let output_config = nn::LinearConfig {
            ws_init: Init::Orthogonal { gain: 0.01 },
            ..Default::default()
        };

        let shared = nn::seq()
            .add(nn::linear(&root / "shared" / "fc1", obs_dim, hidden_dim, hidden_config))
            .add_fn(|x| x.tanh())
            .add(nn::linear(&root / "shared" / "fc2", hidden_dim, hidden_dim, hidden_config))
            .add_fn(|x| x.tanh());

        let policy_head = nn::linear(&root / "policy", hidden_dim, action_dim, output_config);
        let value_head = nn::linear(&root / "value", hidden_dim, 1, output_config);

        Self { vs, shared, policy_head, value_head }
    }

    /// Save model parameters to a file
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        self.vs.save(path)?;
        Ok(())
    }

    /// Load model parameters from a file
    pub fn load<P: AsRef<std::path::Path>>(&mut self, path: P) -> Result<()> {
        self.vs.load(path)?;
        Ok(())
    }
}

impl Policy for MlpPolicy {
    fn forward(&self, states: &Tensor) -> (Tensor, Tensor) {
        let features = self.shared.forward(states);
        let probs = self.policy_head.forward(&features).softmax(-1, Kind::Float);
        let values = self.value_head.forward(&features).squeeze_dim(-1);
        (probs, values)
    }

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }
}
