//! Transparent auto-reset wrapper
//!
//! Stepping a terminated episode must not require the caller to reset: the
//! wrapper restarts the inner environment and returns the fresh initial
//! observation, while still reporting the terminal `done` flag and reward of
//! the step that ended the episode. Episode reward/length accounting lives
//! here so raw environments don't have to track it.

use anyhow::Result;

use crate::env::{Environment, EpisodeStats, SpaceInfo, Step, StepInfo};

/// Per-slot episode state
///
/// A slot is `Running` while an episode is in progress. When the inner
/// environment reports `done`, the slot passes through `Terminal` (carrying
/// the finished episode's statistics), resets the inner environment, and
/// re-enters `Running`. The `Terminal` state is observable only in the
/// `Step` returned for the terminal transition.
#[derive(Debug, Clone, PartialEq)]
enum SlotState {
    Running {
        episode_reward: f32,
        episode_length: u64,
    },
    Terminal(EpisodeStats),
}

/// Auto-resetting environment wrapper
///
/// Also caches the most recent observation, so callers can snapshot the
/// current state of many environments before deciding on a batch of
/// actions.
#[derive(Debug)]
pub struct AutoReset<E: Environment> {
    env: E,
    observation: Vec<f32>,
    state: SlotState,
}

impl<E: Environment> AutoReset<E> {
    /// Wrap an environment, resetting it to obtain the initial observation
    pub fn new(mut env: E) -> Result<Self> {
        let observation = env.reset()?;
        Ok(Self {
            env,
            observation,
            state: SlotState::Running { episode_reward: 0.0, episode_length: 0 },
        })
    }

    /// The current observation (the state a step decision would be based on)
    pub fn observation(&self) -> &[f32] {
        &self.observation
    }

    /// Access the wrapped environment
    pub fn inner(&self) -> &E {
        &self.env
    }
}

impl<E: Environment> Environment for AutoReset<E> {
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.observation = self.env.reset()?;
        self.state = SlotState::Running { episode_reward: 0.0, episode_length: 0 };
        Ok(self.observation.clone())
    }

    fn step(&mut self, action: i64) -> Result<Step> {
        let step = self.env.step(action)?;

        let (episode_reward, episode_length) = match &mut self.state {
            SlotState::Running { episode_reward, episode_length } => {
                *episode_reward += step.reward;
                *episode_length += 1;
                (*episode_reward, *episode_length)
            }
            // A terminal slot was already reset on the step that ended the
            // episode, so stepping always finds the slot running.
            SlotState::Terminal(_) => unreachable!("terminal slot was not reset"),
        };

        if step.done {
            let stats = EpisodeStats { reward: episode_reward, length: episode_length };
            self.state = SlotState::Terminal(stats);
            // Restart immediately: the caller sees the terminal step once,
            // paired with the next episode's initial observation.
            self.observation = self.env.reset()?;
            self.state = SlotState::Running { episode_reward: 0.0, episode_length: 0 };
            Ok(Step {
                observation: self.observation.clone(),
                reward: step.reward,
                done: true,
                info: StepInfo { episode: Some(stats) },
            })
        } else {
            self.observation = step.observation.clone();
            Ok(Step { observation: step.observation, reward: step.reward, done: false, info: step.info })
        }
    }

    fn observation_space(&self) -> SpaceInfo {
        self.env.observation_space()
    }

    fn action_space(&self) -> SpaceInfo {
        self.env.action_space()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SpaceType;

    /// Scripted environment: episodes last `episode_len` steps, reward 1.0
    /// per step, and each reset returns an observation tagged with the
    /// number of resets so far.
    struct Scripted {
        episode_len: u64,
        step_in_episode: u64,
        resets: f32,
    }

    impl Scripted {
        fn new(episode_len: u64) -> Self {
            Self { episode_len, step_in_episode: 0, resets: 0.0 }
        }
    }

    impl Environment for Scripted {
        fn reset(&mut self) -> Result<Vec<f32>> {
            self.resets += 1.0;
            self.step_in_episode = 0;
            Ok(vec![self.resets, 0.0])
        }

        fn step(&mut self, _action: i64) -> Result<Step> {
            self.step_in_episode += 1;
            let done = self.step_in_episode >= self.episode_len;
            Ok(Step {
                observation: vec![self.resets, self.step_in_episode as f32],
                reward: 1.0,
                done,
                info: StepInfo::default(),
            })
        }

        fn observation_space(&self) -> SpaceInfo {
            SpaceInfo { shape: vec![2], dtype: SpaceType::Continuous }
        }

        fn action_space(&self) -> SpaceInfo {
            SpaceInfo { shape: vec![], dtype: SpaceType::Discrete(2) }
        }
    }

    #[test]
    fn test_terminal_step_reports_episode_and_fresh_observation() {
        let mut env = AutoReset::new(Scripted::new(3)).unwrap();
        assert_eq!(env.observation(), &[1.0, 0.0]);

        let s1 = env.step(0).unwrap();
        assert!(!s1.done);
        assert!(s1.info.episode.is_none());

        env.step(0).unwrap();
        let terminal = env.step(0).unwrap();
        assert!(terminal.done);
        let stats = terminal.info.episode.expect("terminal step carries episode stats");
        assert_eq!(stats.length, 3);
        assert_eq!(stats.reward, 3.0);

        // The returned observation belongs to the next episode.
        assert_eq!(terminal.observation, vec![2.0, 0.0]);
        assert_eq!(env.observation(), &[2.0, 0.0]);
    }

    #[test]
    fn test_accounting_restarts_after_reset() {
        let mut env = AutoReset::new(Scripted::new(2)).unwrap();
        env.step(0).unwrap();
        env.step(0).unwrap(); // terminal

        env.step(0).unwrap();
        let terminal = env.step(0).unwrap();
        let stats = terminal.info.episode.unwrap();
        assert_eq!(stats.length, 2);
        assert_eq!(stats.reward, 2.0);
    }

    #[test]
    fn test_done_observed_exactly_once_per_episode() {
        let mut env = AutoReset::new(Scripted::new(2)).unwrap();
        let mut dones = 0;
        for _ in 0..10 {
            if env.step(0).unwrap().done {
                dones += 1;
            }
        }
        assert_eq!(dones, 5);
    }
}
