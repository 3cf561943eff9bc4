//! Train PPO on CartPole
//!
//! End-to-end smoke training run for the engine. Event files and
//! checkpoints land in the log directory (first CLI argument, default
//! `data/cartpole`); rerunning with the same directory resumes from the
//! latest checkpoint, including a directory copied from another machine.
//!
//! ```bash
//! cargo run --bin train_cartpole -- data/cartpole
//! ```

use anyhow::Result;
use torque_rl::env::cartpole::CartPole;
use torque_rl::policy::mlp::MlpPolicy;
use torque_rl::telemetry::TensorBoardSink;
use torque_rl::train::ppo::{PpoConfig, PpoEngine, TrainOptions};

const NUM_ENVS: usize = 8;
const TOTAL_STEPS: u64 = 200_000;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let logdir = std::env::args().nth(1).unwrap_or_else(|| "data/cartpole".to_string());
    tracing::info!("training CartPole with {} environments, logdir {}", NUM_ENVS, logdir);

    let envs: Vec<CartPole> = (0..NUM_ENVS).map(|_| CartPole::new()).collect();
    let policy = MlpPolicy::new(4, 2, 64);

    let config = PpoConfig::new()
        .gamma(0.99)
        .lambda(0.95)
        .learning_rate(3e-4)
        .entropy_reg(0.01)
        .eps_clip(0.2)
        .max_gradient_norm(0.5);

    let sink = Box::new(TensorBoardSink::new(&logdir));
    let mut engine = PpoEngine::new(config, envs, policy, &logdir, sink)?;

    let opts = TrainOptions {
        steps_per_env: 128,
        batch_size: 64,
        epochs: 4,
        report_every: 4096,
        save_every: 20_000,
    };
    engine.train(TOTAL_STEPS, &opts)?;

    Ok(())
}
