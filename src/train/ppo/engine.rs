//! The PPO training engine
//!
//! [`PpoEngine`] owns everything with state: the environment pool, the
//! policy and its optimizer, the persistent training counters, the
//! checkpoint manager, and the bounded telemetry buffers. Control flow is a
//! single logical thread: environment stepping, inference, and optimization
//! are synchronous calls issued in strict sequence, so state mutation only
//! commits at well-defined cycle boundaries and the loop can be stopped
//! between cycles without corrupting anything.

use std::path::Path;

use anyhow::Result;
use tch::nn::Init;
use tch::{Device, Kind, Tensor};

use crate::buffer::rollout::{Batch, RolloutBuffer};
use crate::checkpoint::CheckpointManager;
use crate::env::pool::EnvPool;
use crate::env::{Environment, EpisodeStats};
use crate::policy::Policy;
use crate::telemetry::{BoundedBuffer, TelemetrySink};
use crate::train::ppo::config::{PpoConfig, TrainOptions};
use crate::train::ppo::loss::{Minibatch, Objective};
use crate::train::ppo::stats::StepStats;
use crate::train::ppo::trainer::Trainer;
use crate::train::state::TrainState;

/// PPO training engine over a pool of environments
pub struct PpoEngine<E: Environment + Send, P: Policy> {
    config: PpoConfig,
    pool: EnvPool<E>,
    policy: P,
    objective: Objective,
    trainer: Trainer,
    state: TrainState,
    checkpoints: CheckpointManager,
    sink: Box<dyn TelemetrySink>,
    recent_states: BoundedBuffer<Vec<f32>>,
    training_stats: BoundedBuffer<StepStats>,
    obs_dim: i64,
    device: Device,
}

impl<E: Environment + Send, P: Policy> PpoEngine<E, P> {
    /// Build an engine
    ///
    /// The configuration is validated before anything else is constructed;
    /// an invalid configuration leaves no partial state behind. If the
    /// working directory holds a usable checkpoint, training resumes from
    /// it, otherwise the engine cold-starts.
    pub fn new(
        config: PpoConfig,
        envs: Vec<E>,
        mut policy: P,
        logdir: impl AsRef<Path>,
        sink: Box<dyn TelemetrySink>,
    ) -> Result<Self> {
        config.validate()?;

        let pool = EnvPool::new(envs)?;
        let obs_dim = pool.observation_space().shape.iter().product::<usize>() as i64;
        let device = policy.device();

        // The smoothed pseudo-entropy lives in the policy's variable store:
        // the optimizer pulls it toward each batch's pseudo-entropy through
        // the objective's EMA term, and checkpoints carry it with the
        // parameters.
        let smoothed = policy
            .var_store()
            .root()
            .var("smoothed_pseudo_entropy", &[1], Init::Const(1.0));
        let trainer = Trainer::new(policy.var_store(), config.learning_rate, config.max_gradient_norm)?;
        let mut objective = Objective::new(&config, smoothed);

        let checkpoints = CheckpointManager::new(logdir.as_ref())?;
        let mut state = TrainState::default();
        if let Some(restored) = checkpoints.restore(policy.var_store_mut()) {
            tracing::info!(
                "restored checkpoint: {} episodes, {} steps",
                restored.num_episodes,
                restored.num_steps
            );
            objective.set_smoothed_pseudo_entropy(restored.smoothed_pseudo_entropy);
            state = restored;
        }

        Ok(Self {
            config,
            pool,
            policy,
            objective,
            trainer,
            state,
            checkpoints,
            sink,
            recent_states: BoundedBuffer::new(1),
            training_stats: BoundedBuffer::new(1),
            obs_dim,
            device,
        })
    }

    /// Run the training loop until `total_steps` environment steps
    ///
    /// Each cycle collects one rollout, estimates returns and advantages,
    /// shuffles once, and trains over sliding minibatch windows for the
    /// configured number of epochs. Checkpoints are written whenever the
    /// step counter crosses a `save_every` boundary (integer-division
    /// comparison, so multi-step cycles never skip one), and telemetry is
    /// flushed whenever the bounded buffers fill.
    pub fn train(&mut self, total_steps: u64, opts: &TrainOptions) -> Result<()> {
        self.recent_states = BoundedBuffer::new(opts.report_every);
        self.training_stats = BoundedBuffer::new(opts.report_every);

        let save_every = opts.save_every.max(1) as i64;
        let mut last_save = self.state.num_steps as i64 - 1;
        while self.state.num_steps < total_steps {
            self.train_cycle(opts)?;

            let steps = self.state.num_steps as i64;
            if last_save.div_euclid(save_every) < steps.div_euclid(save_every) {
                self.save_checkpoint()?;
                last_save = steps;
            }
            if self.recent_states.is_full() {
                self.flush_telemetry()?;
            }
        }
        tracing::info!("finished training at {} steps", self.state.num_steps);
        Ok(())
    }

    /// One collect → shuffle → minibatch-train cycle
    fn train_cycle(&mut self, opts: &TrainOptions) -> Result<()> {
        let mut batch = self.collect_rollout(opts.steps_per_env)?;
        batch.shuffle(&mut rand::thread_rng());

        let full = self.batch_tensors(&batch);
        for _ in 0..opts.epochs {
            for offset in batch.minibatch_offsets(opts.batch_size) {
                let mb = narrow(&full, offset as i64, opts.batch_size as i64);
                let (probs, values) = self.policy.forward(&mb.states);
                let losses = self.objective.evaluate(&mb, &probs, &values);
                let grad_norm = self.trainer.step(self.policy.var_store(), &losses.total);
                self.training_stats.push(StepStats {
                    grad_norm,
                    policy_loss: f64::try_from(&losses.policy)?,
                    value_loss: f64::try_from(&losses.value)?,
                });
            }
        }
        Ok(())
    }

    /// Drive the pool for `steps_per_env` timesteps and estimate the batch
    ///
    /// Each timestep batches the current state of every environment into
    /// one forward pass, samples one action per environment from its
    /// categorical distribution, and steps the whole pool. A final forward
    /// pass on the post-horizon states provides the bootstrap values.
    fn collect_rollout(&mut self, steps_per_env: usize) -> Result<Batch> {
        let mut buffer = RolloutBuffer::new(self.pool.len(), steps_per_env);

        for _ in 0..steps_per_env {
            let states = self.pool.observations();
            let obs = self.states_to_tensor(&states);
            let (probs, values) = tch::no_grad(|| self.policy.forward(&obs));

            let actions_t = probs.multinomial(1, true).squeeze_dim(-1);
            let behavior_t = probs.gather(1, &actions_t.unsqueeze(-1), false).squeeze_dim(-1);
            let actions: Vec<i64> = Vec::try_from(&actions_t)?;
            let behavior: Vec<f32> = Vec::try_from(&behavior_t)?;
            let values: Vec<f32> = Vec::try_from(&values)?;

            let steps = self.pool.step(&actions)?;
            for (slot, step) in steps.iter().enumerate() {
                self.state.num_steps += 1;
                if let Some(episode) = &step.info.episode {
                    self.log_episode(episode);
                }
                buffer.push(
                    states[slot].clone(),
                    actions[slot],
                    behavior[slot],
                    step.reward,
                    step.done,
                    values[slot],
                );
            }
            for state in states {
                self.recent_states.push(state);
            }
        }

        let obs = self.states_to_tensor(&self.pool.observations());
        let (_, bootstrap) = tch::no_grad(|| self.policy.forward(&obs));
        let bootstrap: Vec<f32> = Vec::try_from(&bootstrap)?;

        Ok(buffer.finish(
            &bootstrap,
            self.config.gamma as f32,
            self.config.lambda as f32,
            self.config.reward_clip as f32,
        ))
    }

    /// Persist model parameters and training state now
    pub fn save_checkpoint(&mut self) -> Result<()> {
        self.state.smoothed_pseudo_entropy = self.objective.smoothed_pseudo_entropy();
        self.checkpoints.save(self.policy.var_store(), &self.state)
    }

    /// Aggregate and emit buffered telemetry, clearing both buffers
    fn flush_telemetry(&mut self) -> Result<()> {
        let states = self.recent_states.drain();
        let stats = self.training_stats.drain();
        if states.is_empty() {
            return Ok(());
        }
        let step = self.state.num_steps;

        let obs = self.states_to_tensor(&states);
        let (probs, values) = tch::no_grad(|| self.policy.forward(&obs));

        let values: Vec<f32> = Vec::try_from(&values)?;
        self.sink.scalar("network/value_func", mean(&values), step);
        self.sink.histogram("network/value_func", &values, step);

        // Analytic entropy is fine for reporting; only the objective needs
        // the pseudo-entropy surrogate.
        let entropy_t = ((&probs + 1e-12).log() * &probs)
            .sum_dim_intlist(-1, false, Kind::Float)
            .neg();
        let entropy: Vec<f32> = Vec::try_from(&entropy_t)?;
        self.sink.scalar("network/entropy", mean(&entropy), step);
        self.sink.histogram("network/entropy", &entropy, step);

        let pseudo = (&probs * (probs.neg() + 1.0)).sum_dim_intlist(-1, false, Kind::Float);
        let pseudo_mean = f64::try_from(pseudo.mean(Kind::Float))? as f32;
        self.sink.scalar("network/pseudo_entropy", pseudo_mean, step);
        self.sink.scalar(
            "network/pseudo_entropy_smooth",
            self.objective.smoothed_pseudo_entropy() as f32,
            step,
        );

        let grads: Vec<f32> = stats.iter().map(|s| s.grad_norm as f32).collect();
        let policy_losses: Vec<f32> = stats.iter().map(|s| s.policy_loss as f32).collect();
        let value_losses: Vec<f32> = stats.iter().map(|s| s.value_loss as f32).collect();
        self.sink.histogram("training/gradients", &grads, step);
        self.sink.histogram("training/policy_loss", &policy_losses, step);
        self.sink.histogram("training/value_loss", &value_losses, step);

        Ok(())
    }

    fn log_episode(&mut self, episode: &EpisodeStats) {
        self.state.num_episodes += 1;
        let step = self.state.num_steps;
        self.sink.scalar("episode/reward", episode.reward, step);
        self.sink.scalar("episode/length", episode.length as f32, step);
        self.sink.scalar("episode/completed", self.state.num_episodes as f32, step);
        tracing::info!(
            "episode {}: length={}, reward={:.1}",
            self.state.num_episodes,
            episode.length,
            episode.reward
        );
    }

    fn states_to_tensor(&self, states: &[Vec<f32>]) -> Tensor {
        let flat: Vec<f32> = states.iter().flatten().copied().collect();
        Tensor::from_slice(&flat)
            .view([states.len() as i64, self.obs_dim])
            .to_device(self.device)
    }

    fn batch_tensors(&self, batch: &Batch) -> Minibatch {
        Minibatch {
            states: self.states_to_tensor(&batch.states),
            actions: Tensor::from_slice(&batch.actions).to_device(self.device),
            behavior_probs: Tensor::from_slice(&batch.behavior_probs).to_device(self.device),
            returns: Tensor::from_slice(&batch.returns).to_device(self.device),
            advantages: Tensor::from_slice(&batch.advantages).to_device(self.device),
            values: Tensor::from_slice(&batch.values).to_device(self.device),
        }
    }

    /// Persistent training state (counters and the smoothed pseudo-entropy)
    pub fn state(&self) -> &TrainState {
        &self.state
    }

    /// The trained policy
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// The engine configuration
    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    /// Entries currently buffered for the next telemetry flush:
    /// `(recent states, training stats)`
    pub fn telemetry_backlog(&self) -> (usize, usize) {
        (self.recent_states.len(), self.training_stats.len())
    }
}

/// View one minibatch window of the full batch tensors
fn narrow(full: &Minibatch, offset: i64, size: i64) -> Minibatch {
    Minibatch {
        states: full.states.narrow(0, offset, size),
        actions: full.actions.narrow(0, offset, size),
        behavior_probs: full.behavior_probs.narrow(0, offset, size),
        returns: full.returns.narrow(0, offset, size),
        advantages: full.advantages.narrow(0, offset, size),
        values: full.values.narrow(0, offset, size),
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::cartpole::CartPole;
    use crate::policy::mlp::MlpPolicy;
    use crate::telemetry::NullSink;

    fn engine(dir: &Path) -> PpoEngine<CartPole, MlpPolicy> {
        let envs: Vec<CartPole> = (0..2).map(|_| CartPole::new()).collect();
        let policy = MlpPolicy::new(4, 2, 16);
        PpoEngine::new(PpoConfig::new(), envs, policy, dir, Box::new(NullSink)).unwrap()
    }

    #[test]
    fn test_collect_counts_every_environment_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());

        let batch = engine.collect_rollout(5).unwrap();
        assert_eq!(batch.len(), 10);
        assert_eq!(engine.state().num_steps, 10);
    }

    #[test]
    fn test_collected_probabilities_are_valid() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());

        let batch = engine.collect_rollout(8).unwrap();
        for &p in &batch.behavior_probs {
            assert!(p > 0.0 && p <= 1.0, "behavior probability out of range: {}", p);
        }
        for &a in &batch.actions {
            assert!(a == 0 || a == 1);
        }
    }

    #[test]
    fn test_train_advances_and_records_stats() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());

        let opts = TrainOptions {
            steps_per_env: 4,
            batch_size: 8,
            epochs: 2,
            report_every: 1000,
            save_every: 1_000_000,
        };
        engine.train(8, &opts).unwrap();

        assert!(engine.state().num_steps >= 8);
        let (states, stats) = engine.telemetry_backlog();
        assert_eq!(states, 8);
        assert_eq!(stats, 2, "one full window per epoch");
    }

    #[test]
    fn test_invalid_config_rejected_before_construction() {
        let dir = tempfile::tempdir().unwrap();
        let envs: Vec<CartPole> = (0..2).map(|_| CartPole::new()).collect();
        let policy = MlpPolicy::new(4, 2, 16);
        let bad = PpoConfig::new().gamma(2.0);
        assert!(PpoEngine::new(bad, envs, policy, dir.path(), Box::new(NullSink)).is_err());
    }
}
