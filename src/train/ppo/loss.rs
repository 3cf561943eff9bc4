//! The clipped training objective
//!
//! Three terms, evaluated per minibatch and summed into one scalar that is
//! minimized by gradient descent:
//!
//! - **Policy**: with `ratio = new_prob / old_prob`, the clipped quantity is
//!   `diff = sign(advantage)·(1 − ratio)`, rectified against the clip width
//!   ε by either a hard floor `max(diff, −ε)` or a smooth floor
//!   `ε·elu(diff/ε)`. Folding the advantage's sign into the clip instead of
//!   clipping the ratio directly is deliberate; do not "fix" it to the
//!   textbook form. With scaled probability clipping, ε is multiplied by
//!   `1 − old_prob` so clipping stays active even as the new probability
//!   approaches 1.
//! - **Value**: squared error against the returns, with the prediction's
//!   deviation from its rollout-time value clipped to `[−ε, ε]` and the
//!   worse of the two errors kept. Optionally rescaled by a pseudo-entropy
//!   estimate so its magnitude tracks the shrinking policy gradient.
//! - **Entropy**: pseudo-entropy `Σ p·(1−p)` is used instead of analytic
//!   entropy, whose derivative diverges at zero. A secondary quadratic term
//!   pulls the persistent smoothed pseudo-entropy variable toward the batch
//!   value; only the smoothed variable receives gradient from it.

use tch::{Kind, Tensor};

use crate::train::ppo::config::{PolicyRectifier, PpoConfig, ValueGradRescaling};

/// One minibatch of aligned training tensors
#[derive(Debug)]
pub struct Minibatch {
    /// Observations `[batch, obs_dim]`
    pub states: Tensor,

    /// Actions taken `[batch]` (int64)
    pub actions: Tensor,

    /// Behavior probabilities of the taken actions `[batch]`
    pub behavior_probs: Tensor,

    /// Discounted returns `[batch]`
    pub returns: Tensor,

    /// GAE advantages `[batch]`
    pub advantages: Tensor,

    /// Rollout-time value estimates `[batch]`
    pub values: Tensor,
}

/// Loss terms for one minibatch evaluation
#[derive(Debug)]
pub struct Losses {
    /// Combined objective to minimize
    pub total: Tensor,

    /// Policy term (already meaned)
    pub policy: Tensor,

    /// Value term (already meaned and coefficient-free)
    pub value: Tensor,
}

/// Evaluates the combined objective for minibatches
///
/// Owns the persistent smoothed-pseudo-entropy variable; the variable lives
/// in the policy's `VarStore` so the optimizer updates it through the
/// EMA-pull term and checkpoints carry it.
#[derive(Debug)]
pub struct Objective {
    eps_clip: f64,
    entropy_reg: f64,
    entropy_clip: f64,
    vf_coef: f64,
    rectifier: PolicyRectifier,
    rescaling: ValueGradRescaling,
    scale_prob_clipping: bool,
    smoothed_pseudo_entropy: Tensor,
}

impl Objective {
    /// Build an objective from the configuration and the smoothed
    /// pseudo-entropy variable
    pub fn new(config: &PpoConfig, smoothed_pseudo_entropy: Tensor) -> Self {
        Self {
            eps_clip: config.eps_clip,
            entropy_reg: config.entropy_reg,
            entropy_clip: config.entropy_clip,
            vf_coef: config.vf_coef,
            rectifier: config.policy_rectifier,
            rescaling: config.value_grad_rescaling,
            scale_prob_clipping: config.scale_prob_clipping,
            smoothed_pseudo_entropy,
        }
    }

    /// Evaluate all loss terms for one minibatch
    ///
    /// `probs` and `values` are the current policy's outputs for the
    /// minibatch states and must carry gradients.
    pub fn evaluate(&self, mb: &Minibatch, probs: &Tensor, values: &Tensor) -> Losses {
        // Policy term. The new probability is gathered for the taken action;
        // diff is positive when the update moved probability away from the
        // sampled action under a positive advantage.
        let taken = probs
            .gather(1, &mb.actions.unsqueeze(-1), false)
            .squeeze_dim(-1);
        let ratio = &taken / &mb.behavior_probs;
        let prob_diff = mb.advantages.sign() * (ratio.neg() + 1.0);

        let eps = if self.scale_prob_clipping {
            (mb.behavior_probs.neg() + 1.0) * self.eps_clip
        } else {
            mb.behavior_probs.ones_like() * self.eps_clip
        };
        let rectified = match self.rectifier {
            PolicyRectifier::Relu => prob_diff.maximum(&eps.neg()),
            PolicyRectifier::Elu => (&prob_diff / &eps).elu() * &eps,
        };
        let policy_loss = (&mb.advantages * rectified).mean(Kind::Float);

        // Pseudo-entropy of the current distribution, per state and averaged.
        let pseudo_entropy =
            (probs * (probs.neg() + 1.0)).sum_dim_intlist(-1, false, Kind::Float);
        let avg_pseudo_entropy = pseudo_entropy.mean(Kind::Float);

        // Value term with clipped deviation from the rollout-time estimate.
        let v_clip = &mb.values + (values - &mb.values).clamp(-self.eps_clip, self.eps_clip);
        let squared = (values - &mb.returns).square();
        let squared_clipped = (v_clip - &mb.returns).square();
        let per_sample = squared.maximum(&squared_clipped);
        let per_sample = match self.rescaling {
            ValueGradRescaling::None => per_sample,
            ValueGradRescaling::PerState => per_sample * pseudo_entropy.detach(),
            ValueGradRescaling::PerBatch => per_sample * avg_pseudo_entropy.detach(),
            ValueGradRescaling::Smooth => per_sample * self.smoothed_pseudo_entropy.detach(),
        };
        let value_loss = 0.5 * per_sample.mean(Kind::Float);

        // Entropy term: regularize only below entropy_clip, and pull the
        // smoothed variable toward the batch value. The batch side is
        // detached so the pull only moves the smoothed variable.
        let entropy_loss: Tensor = avg_pseudo_entropy.clamp_max(self.entropy_clip) * (-self.entropy_reg)
            + 0.5 * (avg_pseudo_entropy.detach() - &self.smoothed_pseudo_entropy).square();

        let total = &policy_loss + self.vf_coef * &value_loss + entropy_loss.sum(Kind::Float);

        Losses { total, policy: policy_loss, value: value_loss }
    }

    /// Current value of the smoothed pseudo-entropy variable
    pub fn smoothed_pseudo_entropy(&self) -> f64 {
        f64::try_from(&self.smoothed_pseudo_entropy).unwrap_or(1.0)
    }

    /// Overwrite the smoothed pseudo-entropy variable (checkpoint restore)
    pub fn set_smoothed_pseudo_entropy(&mut self, value: f64) {
        tch::no_grad(|| {
            self.smoothed_pseudo_entropy.copy_(&Tensor::from(value));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::ppo::config::PpoConfig;
    use tch::Device;

    fn minibatch() -> Minibatch {
        Minibatch {
            states: Tensor::zeros([1, 1], (Kind::Float, Device::Cpu)),
            actions: Tensor::from_slice(&[0_i64]),
            behavior_probs: Tensor::from_slice(&[0.5_f32]),
            returns: Tensor::from_slice(&[1.0_f32]),
            advantages: Tensor::from_slice(&[2.0_f32]),
            values: Tensor::from_slice(&[0.0_f32]),
        }
    }

    fn outputs() -> (Tensor, Tensor) {
        let probs = Tensor::from_slice(&[0.6_f32, 0.4]).view([1, 2]);
        let values = Tensor::from_slice(&[0.3_f32]);
        (probs, values)
    }

    fn objective(config: &PpoConfig) -> Objective {
        Objective::new(config, Tensor::from_slice(&[1.0_f32]))
    }

    fn scalar(t: &Tensor) -> f64 {
        f64::try_from(t).unwrap()
    }

    #[test]
    fn test_policy_loss_relu() {
        // diff = sign(2)·(1 − 0.6/0.5) = −0.2; max(−0.2, −0.2) = −0.2;
        // mean(2·−0.2) = −0.4.
        let config = PpoConfig::new().value_grad_rescaling(ValueGradRescaling::None);
        let obj = objective(&config);
        let (probs, values) = outputs();
        let losses = obj.evaluate(&minibatch(), &probs, &values);
        assert!((scalar(&losses.policy) - (-0.4)).abs() < 1e-5);
    }

    #[test]
    fn test_policy_loss_elu() {
        // 0.2·elu(−0.2/0.2) = 0.2·(e^−1 − 1) ≈ −0.126424;
        // loss = 2·that ≈ −0.252848.
        let config = PpoConfig::new()
            .policy_rectifier(PolicyRectifier::Elu)
            .value_grad_rescaling(ValueGradRescaling::None);
        let obj = objective(&config);
        let (probs, values) = outputs();
        let losses = obj.evaluate(&minibatch(), &probs, &values);
        assert!((scalar(&losses.policy) - (-0.252848)).abs() < 1e-4);
    }

    #[test]
    fn test_scaled_prob_clipping_tightens_the_floor() {
        // ε becomes 0.2·(1 − 0.5) = 0.1, so the −0.2 diff clips to −0.1.
        let config = PpoConfig::new()
            .scale_prob_clipping(true)
            .value_grad_rescaling(ValueGradRescaling::None);
        let obj = objective(&config);
        let (probs, values) = outputs();
        let losses = obj.evaluate(&minibatch(), &probs, &values);
        assert!((scalar(&losses.policy) - (-0.2)).abs() < 1e-5);
    }

    #[test]
    fn test_value_loss_clipped() {
        // v = 0.3 clips to 0.2 from old value 0; the unclipped error wins:
        // max(0.49, 0.64) = 0.64; ×0.5 = 0.32.
        let config = PpoConfig::new().value_grad_rescaling(ValueGradRescaling::None);
        let obj = objective(&config);
        let (probs, values) = outputs();
        let losses = obj.evaluate(&minibatch(), &probs, &values);
        assert!((scalar(&losses.value) - 0.32).abs() < 1e-5);
    }

    #[test]
    fn test_value_loss_per_state_rescaling() {
        // Pseudo-entropy of [0.6, 0.4] is 0.48; 0.5·0.64·0.48 = 0.1536.
        let config = PpoConfig::new().value_grad_rescaling(ValueGradRescaling::PerState);
        let obj = objective(&config);
        let (probs, values) = outputs();
        let losses = obj.evaluate(&minibatch(), &probs, &values);
        assert!((scalar(&losses.value) - 0.1536).abs() < 1e-5);
    }

    #[test]
    fn test_value_loss_smooth_rescaling_uses_variable() {
        let config = PpoConfig::new().value_grad_rescaling(ValueGradRescaling::Smooth);
        let mut obj = objective(&config);
        obj.set_smoothed_pseudo_entropy(0.25);
        let (probs, values) = outputs();
        let losses = obj.evaluate(&minibatch(), &probs, &values);
        assert!((scalar(&losses.value) - 0.5 * 0.64 * 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_total_combines_terms() {
        // policy −0.4; vf_coef·value = 0.5·0.32 = 0.16;
        // entropy = −0.01·min(0.48, 1) + 0.5·(0.48 − 1)² = 0.1304.
        let config = PpoConfig::new().value_grad_rescaling(ValueGradRescaling::None);
        let obj = objective(&config);
        let (probs, values) = outputs();
        let losses = obj.evaluate(&minibatch(), &probs, &values);
        let expected = -0.4 + 0.16 + (-0.0048 + 0.1352);
        assert!((scalar(&losses.total) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_smoothed_roundtrip() {
        let config = PpoConfig::new();
        let mut obj = objective(&config);
        assert!((obj.smoothed_pseudo_entropy() - 1.0).abs() < 1e-6);
        obj.set_smoothed_pseudo_entropy(0.42);
        assert!((obj.smoothed_pseudo_entropy() - 0.42).abs() < 1e-6);
    }
}
