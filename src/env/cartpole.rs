//! CartPole balancing environment
//!
//! The classic control benchmark: a pole hinged on a cart must be kept
//! upright by pushing the cart left or right. Useful as a fast smoke-test
//! environment for the training engine.
//!
//! Dynamics follow the Gym CartPole-v1 formulation:
//! <https://github.com/openai/gym/blob/master/gym/envs/classic_control/cartpole.py>

use anyhow::Result;
use rand::Rng;

use crate::env::{Environment, SpaceInfo, SpaceType, Step, StepInfo};

const GRAVITY: f32 = 9.8;
const MASS_CART: f32 = 1.0;
const MASS_POLE: f32 = 0.1;
const TOTAL_MASS: f32 = MASS_CART + MASS_POLE;
const POLE_HALF_LENGTH: f32 = 0.5;
const POLE_MASS_LENGTH: f32 = MASS_POLE * POLE_HALF_LENGTH;
const FORCE_MAG: f32 = 10.0;
const TAU: f32 = 0.02;

/// CartPole environment
///
/// Observation: `[x, x_dot, theta, theta_dot]`. Actions: 0 pushes left,
/// 1 pushes right. Reward is 1.0 per step while the pole stays up; the
/// episode ends when the pole tips past ±12°, the cart leaves ±2.4, or the
/// step limit is reached.
#[derive(Debug)]
pub struct CartPole {
    x: f32,
    x_dot: f32,
    theta: f32,
    theta_dot: f32,

    steps: usize,
    max_steps: usize,

    theta_threshold: f32,
    x_threshold: f32,
}

impl CartPole {
    /// Create a CartPole with the standard 500-step episode limit
    pub fn new() -> Self {
        Self {
            x: 0.0,
            x_dot: 0.0,
            theta: 0.0,
            theta_dot: 0.0,
            steps: 0,
            max_steps: 500,
            theta_threshold: 12.0 * 2.0 * std::f32::consts::PI / 360.0,
            x_threshold: 2.4,
        }
    }

    fn observation(&self) -> Vec<f32> {
        vec![self.x, self.x_dot, self.theta, self.theta_dot]
    }

    /// One Euler integration step of the cart-pole dynamics
    fn integrate(&mut self, action: i64) {
        let force = if action == 1 { FORCE_MAG } else { -FORCE_MAG };
        let cos_theta = self.theta.cos();
        let sin_theta = self.theta.sin();

        let temp =
            (force + POLE_MASS_LENGTH * self.theta_dot * self.theta_dot * sin_theta) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (POLE_HALF_LENGTH * (4.0 / 3.0 - MASS_POLE * cos_theta * cos_theta / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos_theta / TOTAL_MASS;

        self.x_dot += TAU * x_acc;
        self.x += TAU * self.x_dot;
        self.theta_dot += TAU * theta_acc;
        self.theta += TAU * self.theta_dot;
    }

    fn fallen(&self) -> bool {
        self.x.abs() > self.x_threshold || self.theta.abs() > self.theta_threshold
    }
}

impl Default for CartPole {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for CartPole {
    fn reset(&mut self) -> Result<Vec<f32>> {
        let mut rng = rand::thread_rng();
        self.x = rng.gen_range(-0.05..0.05);
        self.x_dot = rng.gen_range(-0.05..0.05);
        self.theta = rng.gen_range(-0.05..0.05);
        self.theta_dot = rng.gen_range(-0.05..0.05);
        self.steps = 0;
        Ok(self.observation())
    }

    fn step(&mut self, action: i64) -> Result<Step> {
        self.integrate(action);
        self.steps += 1;

        let done = self.fallen() || self.steps >= self.max_steps;
        let reward = if done { 0.0 } else { 1.0 };

        Ok(Step { observation: self.observation(), reward, done, info: StepInfo::default() })
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![4], dtype: SpaceType::Continuous }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![], dtype: SpaceType::Discrete(2) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_near_equilibrium() {
        let mut env = CartPole::new();
        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), 4);
        for &v in &obs {
            assert!(v.abs() < 0.1, "initial state should be a small perturbation, got {}", v);
        }
    }

    #[test]
    fn test_step_changes_state() {
        let mut env = CartPole::new();
        env.reset().unwrap();
        let before = env.x;
        env.step(1).unwrap();
        assert_ne!(env.x, before);
    }

    #[test]
    fn test_terminates_when_cart_leaves_track() {
        let mut env = CartPole::new();
        env.reset().unwrap();
        env.x = 3.0;
        let step = env.step(0).unwrap();
        assert!(step.done);
    }

    #[test]
    fn test_terminates_when_pole_falls() {
        let mut env = CartPole::new();
        env.reset().unwrap();
        env.theta = 0.5;
        let step = env.step(0).unwrap();
        assert!(step.done);
    }

    #[test]
    fn test_step_limit() {
        let mut env = CartPole::new();
        env.reset().unwrap();
        env.steps = env.max_steps - 1;
        // Keep the pole upright so only the limit can end the episode.
        env.x = 0.0;
        env.theta = 0.0;
        let step = env.step(0).unwrap();
        assert!(step.done);
    }

    #[test]
    fn test_episode_terminates_eventually() {
        let mut env = CartPole::new();
        env.reset().unwrap();
        let mut steps = 0;
        loop {
            let result = env.step(steps % 2).unwrap();
            steps += 1;
            if result.done {
                break;
            }
            assert!(steps <= 500, "episode must end within the step limit");
        }
        assert!(steps > 0);
    }
}
