//! Episode runner: one tick of sensing, acting, rewarding and learning for one member.

use crate::agent::Agent;
use crate::car::{Car, Radar, SENSOR_ANGLES};
use crate::policy::{Action, N_SENSORS, State};
use crate::track::Track;
use anyhow::{Context, Result};
use rand::Rng;

const SPEED_REWARD: f64 = 0.5;
const OFFSET_PENALTY: f64 = 0.1;
/// Minimum radar distance below which a collision is considered imminent.
pub const PROXIMITY_THRESHOLD: f64 = 15.0;
pub const PROXIMITY_PENALTY: f64 = 2.0;
pub const CRASH_PENALTY: f64 = 50.0;
pub const FINISH_REWARD: f64 = 1000.0;
/// Progress credited for crossing the finish line.
pub const FINISH_BONUS: f64 = 2000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Running,
    Crashed,
    Finished,
}

/// Episode state of one population slot.
#[derive(Debug, Clone)]
pub struct Member {
    car: Car,
    outcome: Outcome,
    radars: Vec<Radar>,
    crash_unreported: bool,
    prev: Option<(State, Action)>,
}

impl Default for Member {
    fn default() -> Self {
        Self::new(Car::default())
    }
}

impl Member {
    pub fn new(car: Car) -> Self {
        Self {
            car,
            outcome: Outcome::Running,
            radars: Vec::with_capacity(N_SENSORS),
            crash_unreported: false,
            prev: None,
        }
    }

    pub fn car(&self) -> &Car {
        &self.car
    }

    pub fn is_alive(&self) -> bool {
        self.outcome == Outcome::Running
    }

    /// Cumulative progress distance, including any finish bonus.
    pub fn progress(&self) -> f64 {
        self.car.distance
    }

    pub fn radars(&self) -> &[Radar] {
        &self.radars
    }

    /// Return whether the member crashed since the last call, clearing the flag.
    pub fn take_crash_flag(&mut self) -> bool {
        std::mem::take(&mut self.crash_unreported)
    }

    /// Advance this member by one tick.
    ///
    /// Returns the reward fed to the learner, or `None` if the member had already terminated.
    pub fn step<T, R>(&mut self, agent: &mut Agent, track: &T, rng: &mut R) -> Result<Option<f64>>
    where
        T: Track + ?Sized,
        R: Rng + ?Sized,
    {
        if !self.is_alive() {
            return Ok(None);
        }

        // Sense.
        let mut distances = [0.0; N_SENSORS];
        for (distance, &angle) in distances.iter_mut().zip(&SENSOR_ANGLES) {
            *distance = track.cast_radar(self.car.x, self.car.y, self.car.heading + angle);
        }

        // Decide. This is the only fallible part, so a failed tick leaves the member untouched.
        let state = Agent::discretize(&distances, self.car.speed);
        let action = agent
            .select_action(state, rng)
            .context("failed to select action")?;

        self.radars.clear();
        self.radars.extend(
            distances
                .iter()
                .zip(&SENSOR_ANGLES)
                .map(|(&distance, &angle)| Radar { distance, angle }),
        );

        // Act.
        let prev_x = self.car.x;
        let (steering, throttle) = action.controls();
        self.car.advance(steering, throttle);

        // Reward.
        let mut reward = self.car.speed * SPEED_REWARD
            - track.offset_from_centerline(self.car.x, self.car.y) * OFFSET_PENALTY;

        let min_distance = distances.iter().copied().fold(f64::INFINITY, f64::min);
        if min_distance < PROXIMITY_THRESHOLD {
            reward -= PROXIMITY_PENALTY;
        }

        if !track.is_on_track(self.car.x, self.car.y) {
            reward -= CRASH_PENALTY;
            self.outcome = Outcome::Crashed;
            self.crash_unreported = true;
        } else if track.has_crossed_finish(prev_x, self.car.x, self.car.y) {
            reward += FINISH_REWARD;
            self.car.distance += FINISH_BONUS;
            self.outcome = Outcome::Finished;
        }

        // Learn.
        if let Some((prev_state, prev_action)) = self.prev {
            agent.update(prev_state, prev_action, reward, state, action);
        }
        self.prev = Some((state, action));

        Ok(Some(reward))
    }
}

#[cfg(test)]
impl Member {
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn previous(&self) -> Option<(State, Action)> {
        self.prev
    }
}
