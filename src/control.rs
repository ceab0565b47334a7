//! Control plane shared between the command handler and the simulation loop.
//!
//! Commands never touch simulation state. They only flip atomics that the loop
//! reads at the top of each iteration and between ticks of a burst.

use crate::config::RunConfig;
use crate::events::{Emitter, Event};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::{
    io::BufRead,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Inbound operator command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SetSpeed { speed: usize },
    TogglePause,
    RestartSim,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).context("failed to deserialize command")
    }
}

#[derive(Debug)]
pub struct ControlPlane {
    paused: AtomicBool,
    speed_multiplier: AtomicUsize,
    reset_requested: AtomicBool,
    max_speed_multiplier: usize,
}

impl ControlPlane {
    pub fn new(cfg: &RunConfig) -> Self {
        Self {
            paused: AtomicBool::new(false),
            speed_multiplier: AtomicUsize::new(cfg.speed_multiplier),
            reset_requested: AtomicBool::new(false),
            max_speed_multiplier: cfg.max_speed_multiplier,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Flip the pause flag and return the new state.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn speed_multiplier(&self) -> usize {
        self.speed_multiplier.load(Ordering::Relaxed)
    }

    /// Set the number of ticks per snapshot.
    ///
    /// Values outside `1..=max_speed_multiplier` are rejected and leave the current value unchanged.
    pub fn set_speed_multiplier(&self, speed: usize) -> Result<()> {
        if !(1..=self.max_speed_multiplier).contains(&speed) {
            bail!(
                "speed multiplier must be in the range 1..={}, but is {speed}",
                self.max_speed_multiplier
            );
        }
        self.speed_multiplier.store(speed, Ordering::Relaxed);
        Ok(())
    }

    pub fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::Relaxed);
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_requested.load(Ordering::Relaxed)
    }

    /// Consume a pending reset request.
    pub fn take_reset(&self) -> bool {
        self.reset_requested.swap(false, Ordering::Relaxed)
    }

    /// Apply a command, acknowledging it on `emitter` where the protocol expects one.
    pub fn apply(&self, command: Command, emitter: &Emitter) -> Result<()> {
        match command {
            Command::SetSpeed { speed } => {
                self.set_speed_multiplier(speed)?;
                log::info!("speed set to {speed}x");
            }
            Command::TogglePause => {
                let paused = self.toggle_pause();
                log::info!("simulation paused: {paused}");
                emitter.emit(Event::PauseState { paused });
            }
            Command::RestartSim => {
                self.request_reset();
                log::info!("restart signal received");
            }
        }
        Ok(())
    }
}

/// Read newline-delimited JSON commands until end of input.
///
/// Malformed or rejected commands are logged and ignored.
pub fn read_commands<R: BufRead>(reader: R, control: &ControlPlane, emitter: &Emitter) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                log::warn!("failed to read command: {error}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let result = Command::parse(line).and_then(|command| control.apply(command, emitter));
        if let Err(error) = result {
            log::warn!("ignoring command {line:?}: {error:#}");
        }
    }
    log::debug!("command input closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> ControlPlane {
        ControlPlane::new(&RunConfig {
            max_speed_multiplier: 50,
            ..Default::default()
        })
    }

    #[test]
    fn parses_wire_commands() {
        assert_eq!(
            Command::parse(r#"{"command":"set_speed","speed":8}"#).unwrap(),
            Command::SetSpeed { speed: 8 }
        );
        assert_eq!(
            Command::parse(r#"{"command":"toggle_pause"}"#).unwrap(),
            Command::TogglePause
        );
        assert_eq!(
            Command::parse(r#"{"command":"restart_sim"}"#).unwrap(),
            Command::RestartSim
        );
        assert!(Command::parse(r#"{"command":"set_speed","speed":"fast"}"#).is_err());
        assert!(Command::parse(r#"{"command":"set_speed","speed":-3}"#).is_err());
        assert!(Command::parse(r#"{"command":"warp"}"#).is_err());
        assert!(Command::parse("not json").is_err());
    }

    #[test]
    fn rejected_speed_keeps_previous_value() {
        let control = control();
        control.set_speed_multiplier(10).unwrap();
        assert!(control.set_speed_multiplier(0).is_err());
        assert!(control.set_speed_multiplier(51).is_err());
        assert_eq!(control.speed_multiplier(), 10);
    }

    #[test]
    fn double_toggle_restores_pause_state() {
        let control = control();
        let (emitter, queue) = Emitter::channel(8);
        control.apply(Command::TogglePause, &emitter).unwrap();
        assert!(control.is_paused());
        control.apply(Command::TogglePause, &emitter).unwrap();
        assert!(!control.is_paused());
        assert_eq!(
            queue.drain(),
            vec![
                Event::PauseState { paused: true },
                Event::PauseState { paused: false }
            ]
        );
    }

    #[test]
    fn reset_request_is_consumed_once() {
        let control = control();
        assert!(!control.take_reset());
        control.request_reset();
        control.request_reset();
        assert!(control.reset_pending());
        assert!(control.take_reset());
        assert!(!control.take_reset());
    }

    #[test]
    fn reader_skips_bad_lines() {
        let control = control();
        let (emitter, queue) = Emitter::channel(8);
        let input = concat!(
            "{\"command\":\"set_speed\",\"speed\":\"fast\"}\n",
            "\n",
            "{\"command\":\"set_speed\",\"speed\":4}\n",
            "garbage\n",
            "{\"command\":\"set_speed\",\"speed\":0}\n",
            "{\"command\":\"toggle_pause\"}\n",
            "{\"command\":\"restart_sim\"}\n",
        );
        read_commands(input.as_bytes(), &control, &emitter);

        assert_eq!(control.speed_multiplier(), 4);
        assert!(control.is_paused());
        assert!(control.reset_pending());
        assert_eq!(queue.drain(), vec![Event::PauseState { paused: true }]);
    }
}
