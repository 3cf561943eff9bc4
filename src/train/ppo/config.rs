//! PPO configuration and hyperparameters
//!
//! [`PpoConfig`] is the validated option surface of the engine. Unknown
//! option names are rejected when deserializing, so constructing an engine
//! from an untyped source fails closed before anything else is built.
//! [`TrainOptions`] holds the loop-shape parameters (horizon, minibatch
//! size, cadences) passed to `train` itself.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// How the value loss is rescaled to track the policy gradient's magnitude
///
/// Policy gradients shrink as the action distribution saturates; rescaling
/// the value loss by a pseudo-entropy estimate keeps the two terms at
/// comparable relative magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueGradRescaling {
    /// No rescaling
    None,
    /// Rescale by the slow-moving smoothed pseudo-entropy
    Smooth,
    /// Rescale by the minibatch-average pseudo-entropy
    PerBatch,
    /// Rescale each sample by its own state's pseudo-entropy
    PerState,
}

/// Smoothing rectifier applied to the clipped policy objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRectifier {
    /// Hard floor: `max(x, -ε)`
    Relu,
    /// Smooth exponential floor: `ε·elu(x/ε)`
    Elu,
}

/// PPO hyperparameters
///
/// These control the objective and optimization; loop shape lives in
/// [`TrainOptions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PpoConfig {
    /// Discount factor
    pub gamma: f64,

    /// Generalized advantage estimation parameter
    pub lambda: f64,

    /// Constant optimizer learning rate
    pub learning_rate: f64,

    /// Entropy regularization coefficient
    pub entropy_reg: f64,

    /// Regularization only applies below this entropy level
    pub entropy_clip: f64,

    /// Value loss coefficient in the total objective
    pub vf_coef: f64,

    /// Global L2 bound on gradients; a non-positive value disables clipping
    pub max_gradient_norm: f64,

    /// Clip width ε for both the policy and value objectives
    pub eps_clip: f64,

    /// Element-wise reward clip bound; 0 disables reward clipping
    pub reward_clip: f64,

    /// Value-loss rescaling mode
    pub value_grad_rescaling: ValueGradRescaling,

    /// Rectifier used to clip the policy objective
    pub policy_rectifier: PolicyRectifier,

    /// Scale ε by `1 − old_prob` so clipping stays active as the new
    /// probability approaches 1 (non-standard)
    pub scale_prob_clipping: bool,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            lambda: 0.95,
            learning_rate: 1e-4,
            entropy_reg: 0.01,
            entropy_clip: 1.0,
            vf_coef: 0.5,
            max_gradient_norm: 5.0,
            eps_clip: 0.2,
            reward_clip: 0.0,
            value_grad_rescaling: ValueGradRescaling::Smooth,
            policy_rectifier: PolicyRectifier::Relu,
            scale_prob_clipping: false,
        }
    }
}

impl PpoConfig {
    /// Create a configuration with default hyperparameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON
    ///
    /// Any option name outside the known set is an error; nothing else is
    /// constructed when parsing fails.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| anyhow!("invalid configuration: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate hyperparameter ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.gamma) {
            anyhow::bail!("gamma must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            anyhow::bail!("lambda must be in [0, 1]");
        }
        if self.learning_rate <= 0.0 {
            anyhow::bail!("learning_rate must be positive");
        }
        if self.entropy_reg < 0.0 {
            anyhow::bail!("entropy_reg must be non-negative");
        }
        if self.entropy_clip < 0.0 {
            anyhow::bail!("entropy_clip must be non-negative");
        }
        if self.vf_coef < 0.0 {
            anyhow::bail!("vf_coef must be non-negative");
        }
        if self.eps_clip <= 0.0 {
            anyhow::bail!("eps_clip must be positive");
        }
        if self.reward_clip < 0.0 {
            anyhow::bail!("reward_clip must be non-negative");
        }
        Ok(())
    }

    /// Set the discount factor
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the GAE parameter
    pub fn lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    /// Set the learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set the entropy regularization coefficient
    pub fn entropy_reg(mut self, reg: f64) -> Self {
        self.entropy_reg = reg;
        self
    }

    /// Set the entropy regularization threshold
    pub fn entropy_clip(mut self, clip: f64) -> Self {
        self.entropy_clip = clip;
        self
    }

    /// Set the value loss coefficient
    pub fn vf_coef(mut self, coef: f64) -> Self {
        self.vf_coef = coef;
        self
    }

    /// Set the gradient norm bound (non-positive disables clipping)
    pub fn max_gradient_norm(mut self, norm: f64) -> Self {
        self.max_gradient_norm = norm;
        self
    }

    /// Set the clip width ε
    pub fn eps_clip(mut self, eps: f64) -> Self {
        self.eps_clip = eps;
        self
    }

    /// Set the reward clip bound (0 disables)
    pub fn reward_clip(mut self, clip: f64) -> Self {
        self.reward_clip = clip;
        self
    }

    /// Set the value-loss rescaling mode
    pub fn value_grad_rescaling(mut self, mode: ValueGradRescaling) -> Self {
        self.value_grad_rescaling = mode;
        self
    }

    /// Set the policy rectifier
    pub fn policy_rectifier(mut self, rectifier: PolicyRectifier) -> Self {
        self.policy_rectifier = rectifier;
        self
    }

    /// Enable or disable ε scaling by `1 − old_prob`
    pub fn scale_prob_clipping(mut self, enabled: bool) -> Self {
        self.scale_prob_clipping = enabled;
        self
    }
}

/// Loop-shape parameters for a training run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainOptions {
    /// Rollout horizon: transitions collected per environment per cycle
    pub steps_per_env: usize,

    /// Minibatch window size
    pub batch_size: usize,

    /// Passes over each collected batch
    pub epochs: usize,

    /// Telemetry buffer capacity; a flush happens when it fills
    pub report_every: usize,

    /// Checkpoint every this many global steps
    pub save_every: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self { steps_per_env: 20, batch_size: 32, epochs: 3, report_every: 2000, save_every: 5000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PpoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gamma, 0.99);
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.value_grad_rescaling, ValueGradRescaling::Smooth);
    }

    #[test]
    fn test_validation_rejects_bad_ranges() {
        assert!(PpoConfig::new().gamma(1.5).validate().is_err());
        assert!(PpoConfig::new().lambda(-0.1).validate().is_err());
        assert!(PpoConfig::new().learning_rate(0.0).validate().is_err());
        assert!(PpoConfig::new().eps_clip(-0.2).validate().is_err());
        assert!(PpoConfig::new().reward_clip(-1.0).validate().is_err());
    }

    #[test]
    fn test_non_positive_gradient_norm_is_valid() {
        // Disables clipping rather than erroring.
        assert!(PpoConfig::new().max_gradient_norm(0.0).validate().is_ok());
        assert!(PpoConfig::new().max_gradient_norm(-1.0).validate().is_ok());
    }

    #[test]
    fn test_from_json_known_options() {
        let config = PpoConfig::from_json(
            r#"{
                "gamma": 0.9,
                "value_grad_rescaling": "per_state",
                "policy_rectifier": "elu",
                "scale_prob_clipping": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.gamma, 0.9);
        assert_eq!(config.value_grad_rescaling, ValueGradRescaling::PerState);
        assert_eq!(config.policy_rectifier, PolicyRectifier::Elu);
        assert!(config.scale_prob_clipping);
        // Unspecified options keep their defaults.
        assert_eq!(config.lambda, 0.95);
    }

    #[test]
    fn test_from_json_rejects_unknown_option() {
        let err = PpoConfig::from_json(r#"{"gamma": 0.9, "momentum": 0.5}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_from_json_rejects_unknown_rescaling_mode() {
        let err = PpoConfig::from_json(r#"{"value_grad_rescaling": "sometimes"}"#);
        assert!(err.is_err());
    }
}
