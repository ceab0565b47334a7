use crate::config::AgentConfig;
use crate::policy::{Action, N_SENSORS, PolicyTable, State};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::{Bernoulli, Uniform};

/// Radar distance covered by one state bucket.
pub const SENSOR_BUCKET_WIDTH: f64 = 40.0;

/// Probability that a table entry is perturbed when reproducing.
pub const ENTRY_MUTATION_PROB: f64 = 0.05;
/// Half-width of the uniform noise added to a perturbed entry.
pub const ENTRY_MUTATION_NOISE: f64 = 0.5;
/// Half-width of the uniform noise added to the exploration rate.
pub const EPSILON_MUTATION_NOISE: f64 = 0.05;

pub const EPSILON_MIN: f64 = 0.01;
pub const EPSILON_MAX: f64 = 0.5;

/// On-policy (SARSA) learner with an evolvable exploration rate.
#[derive(Debug, Clone)]
pub struct Agent {
    table: PolicyTable,
    alpha: f64,
    gamma: f64,
    epsilon: f64,
}

impl Agent {
    /// Create an untrained agent with an empty table.
    pub fn new(cfg: &AgentConfig) -> Self {
        Self {
            table: PolicyTable::new(),
            alpha: cfg.alpha,
            gamma: cfg.gamma,
            epsilon: cfg.epsilon.clamp(EPSILON_MIN, EPSILON_MAX),
        }
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Set the exploration rate, clamped to its valid range.
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(EPSILON_MIN, EPSILON_MAX);
    }

    /// Bucket radar distances and truncated speed into a [`State`].
    pub fn discretize(distances: &[f64; N_SENSORS], speed: f64) -> State {
        let mut buckets = [0u8; N_SENSORS + 1];
        for (bucket, &distance) in buckets.iter_mut().zip(distances) {
            // Float-to-int casts saturate, so negative or NaN readings land in bucket 0.
            *bucket = (distance / SENSOR_BUCKET_WIDTH) as u8;
        }
        buckets[N_SENSORS] = speed as u8;
        State::new(buckets)
    }

    /// Epsilon-greedy action choice.
    pub fn select_action<R: Rng + ?Sized>(&self, state: State, rng: &mut R) -> Result<Action> {
        let explore_dist = Bernoulli::new(self.epsilon)?;
        if explore_dist.sample(rng) {
            let &action = Action::ALL
                .choose(rng)
                .context("failed to choose a random action")?;
            return Ok(action);
        }
        Ok(self.table.best_action(state))
    }

    /// SARSA(0) update using the action actually taken in `next_state`.
    pub fn update(
        &mut self,
        state: State,
        action: Action,
        reward: f64,
        next_state: State,
        next_action: Action,
    ) {
        let old = self.table.get(state, action);
        let next = self.table.get(next_state, next_action);
        let new = old + self.alpha * (reward + self.gamma * next - old);
        self.table.set(state, action, new);
    }

    /// Create an offspring with an independent, randomly perturbed copy of this agent's table.
    pub fn reproduce_with_mutation<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Self> {
        let mut child = self.clone();

        let mut_dist = Bernoulli::new(ENTRY_MUTATION_PROB)?;
        let noise_dist = Uniform::new_inclusive(-ENTRY_MUTATION_NOISE, ENTRY_MUTATION_NOISE)?;
        for value in child.table.values_mut() {
            if mut_dist.sample(rng) {
                *value += noise_dist.sample(rng);
            }
        }

        let eps_dist = Uniform::new_inclusive(-EPSILON_MUTATION_NOISE, EPSILON_MUTATION_NOISE)?;
        child.set_epsilon(self.epsilon + eps_dist.sample(rng));

        Ok(child)
    }
}

#[cfg(test)]
impl Agent {
    /// Untrained agent that never explores; bypasses the exploration-rate clamp.
    pub(crate) fn greedy(cfg: &AgentConfig) -> Self {
        let mut agent = Self::new(cfg);
        agent.force_epsilon(0.0);
        agent
    }

    /// Set the exploration rate without clamping, even to an invalid probability.
    pub(crate) fn force_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon;
    }

    pub(crate) fn table_mut(&mut self) -> &mut PolicyTable {
        &mut self.table
    }
}
