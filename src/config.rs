use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path, time::Duration};

/// Simulation configuration.
///
/// Loaded from a TOML file and validated before use.
/// Every field has a default, so missing sections or keys are allowed.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub population: PopulationConfig,
    pub agent: AgentConfig,
    pub run: RunConfig,
}

/// Population parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PopulationConfig {
    /// Number of population slots.
    pub size: usize,
    /// Maximum number of ticks per generation.
    pub max_steps: usize,
}

/// Learning hyperparameters of freshly created agents.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Learning rate.
    pub alpha: f64,
    /// Discount factor.
    pub gamma: f64,
    /// Initial exploration rate.
    pub epsilon: f64,
}

/// Loop pacing and output parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Random seed (OS entropy if absent).
    pub seed: Option<u64>,
    /// Initial number of ticks per emitted snapshot.
    pub speed_multiplier: usize,
    /// Largest speed multiplier accepted from a command.
    pub max_speed_multiplier: usize,
    pub frame_interval_ms: u64,
    pub generation_pause_ms: u64,
    pub reset_pause_ms: u64,
    pub pause_poll_ms: u64,
    /// Capacity of the outbound event queue.
    pub event_buffer: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: 5,
            max_steps: 1500,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.95,
            epsilon: 0.2,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: None,
            speed_multiplier: 1,
            max_speed_multiplier: 1000,
            frame_interval_ms: 33,
            generation_pause_ms: 500,
            reset_pause_ms: 500,
            pause_poll_ms: 100,
            event_buffer: 256,
        }
    }
}

impl RunConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn generation_pause(&self) -> Duration {
        Duration::from_millis(self.generation_pause_ms)
    }

    pub fn reset_pause(&self) -> Duration {
        Duration::from_millis(self.reset_pause_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).context("failed to serialize config")
    }

    pub fn validate(&self) -> Result<()> {
        check_num(self.population.size, 1..=64).context("invalid population size")?;
        check_num(self.population.max_steps, 1..=1_000_000)
            .context("invalid number of steps per generation")?;

        check_num(self.agent.alpha, f64::MIN_POSITIVE..=1.0).context("invalid learning rate")?;
        check_num(self.agent.gamma, 0.0..=1.0).context("invalid discount factor")?;
        check_num(self.agent.epsilon, 0.01..=0.5).context("invalid exploration rate")?;

        check_num(self.run.max_speed_multiplier, 1..=100_000)
            .context("invalid maximum speed multiplier")?;
        check_num(self.run.speed_multiplier, 1..=self.run.max_speed_multiplier)
            .context("invalid speed multiplier")?;
        check_num(self.run.frame_interval_ms, 0..=10_000).context("invalid frame interval")?;
        check_num(self.run.generation_pause_ms, 0..=60_000)
            .context("invalid generation pause")?;
        check_num(self.run.reset_pause_ms, 0..=60_000).context("invalid reset pause")?;
        check_num(self.run.pause_poll_ms, 1..=10_000).context("invalid pause poll interval")?;
        check_num(self.run.event_buffer, 1..=1_000_000).context("invalid event buffer size")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.population.size, 5);
        assert_eq!(config.population.max_steps, 1500);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml("[population]\nsize = 8\n\n[run]\nseed = 3\n").unwrap();
        assert_eq!(config.population.size, 8);
        assert_eq!(config.population.max_steps, 1500);
        assert_eq!(config.run.seed, Some(3));
        assert_eq!(config.agent, AgentConfig::default());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(Config::from_toml("[population]\nsize = 0\n").is_err());
        assert!(Config::from_toml("[agent]\nepsilon = 0.9\n").is_err());
        assert!(Config::from_toml("[run]\nspeed_multiplier = 0\n").is_err());
        assert!(
            Config::from_toml("[run]\nspeed_multiplier = 20\nmax_speed_multiplier = 10\n")
                .is_err()
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("[population]\nsize = 5\ncolour = 1\n").is_err());
    }

    #[test]
    fn serialized_defaults_parse_back() {
        let text = Config::default().to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), Config::default());
    }
}
