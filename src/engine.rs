use crate::config::{Config, RunConfig};
use crate::control::ControlPlane;
use crate::events::{Emitter, Event};
use crate::population::Population;
use crate::track::Track;
use anyhow::{Context, Result};
use std::{sync::Arc, thread};

/// Simulation loop.
///
/// Sole owner and mutator of the population. Reads the control plane at the top
/// of every iteration and before every tick of a burst, and publishes one
/// snapshot per iteration.
pub struct Engine<T: Track> {
    cfg: RunConfig,
    track: T,
    population: Population,
    control: Arc<ControlPlane>,
    emitter: Emitter,
}

impl<T: Track> Engine<T> {
    pub fn new(
        cfg: &Config,
        track: T,
        control: Arc<ControlPlane>,
        emitter: Emitter,
    ) -> Result<Self> {
        let population = Population::new(cfg).context("failed to create population")?;
        Ok(Self::with_population(cfg, track, population, control, emitter))
    }

    pub fn with_population(
        cfg: &Config,
        track: T,
        population: Population,
        control: Arc<ControlPlane>,
        emitter: Emitter,
    ) -> Self {
        Self {
            cfg: cfg.run.clone(),
            track,
            population,
            control,
            emitter,
        }
    }

    /// Run until the generation counter exceeds `max_generations`, or forever.
    ///
    /// Failures inside an iteration are logged and the loop carries on.
    pub fn run(&mut self, max_generations: Option<u64>) {
        log::info!("simulation loop started");
        loop {
            if let Some(max) = max_generations
                && self.population.generation() > max
            {
                break;
            }
            if let Err(error) = self.run_iteration() {
                log::error!("{error:#}");
                thread::sleep(self.cfg.frame_interval());
            }
        }
        log::info!("simulation loop finished");
    }

    /// Run one outer iteration: handle control flags, then a burst of ticks and a snapshot.
    pub fn run_iteration(&mut self) -> Result<()> {
        if self.control.take_reset() {
            self.hard_reset();
            thread::sleep(self.cfg.reset_pause());
            return Ok(());
        }

        if self.control.is_paused() {
            thread::sleep(self.cfg.pause_poll());
            return Ok(());
        }

        let speed = self.control.speed_multiplier();
        for _ in 0..speed {
            // Leave the reset to the next iteration; the pre-reset state is never published.
            if self.control.reset_pending() {
                return Ok(());
            }

            self.population
                .tick(&self.track)
                .context("failed to perform tick")?;

            // A reset raised during this tick cancels any generation transition it would trigger.
            if self.control.reset_pending() {
                return Ok(());
            }

            if self.population.check_generation_end() {
                self.finish_generation()
                    .context("failed to finish generation")?;
                thread::sleep(self.cfg.generation_pause());
                break;
            }
        }

        let snapshot = self.population.snapshot();
        self.emitter.emit(Event::Update(snapshot));

        thread::sleep(self.cfg.frame_interval());
        Ok(())
    }

    fn finish_generation(&mut self) -> Result<()> {
        if let Some(summary) = self.population.evolve()? {
            log::info!(
                "generation {} complete, best distance: {:.1}, elite epsilon: {:.3}",
                summary.generation,
                summary.distance,
                summary.epsilon
            );
            self.emitter.emit(Event::GenLog(summary));
        }

        self.population.begin_next_generation();
        self.emitter.emit(Event::Reset {
            generation: self.population.generation(),
        });
        Ok(())
    }

    fn hard_reset(&mut self) {
        log::info!("executing hard reset");
        self.population.hard_reset();
        self.emitter.emit(Event::HardReset {
            generation: self.population.generation(),
        });
        self.emitter.emit(Event::Update(self.population.snapshot()));
    }
}

#[cfg(test)]
impl<T: Track> Engine<T> {
    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn population_mut(&mut self) -> &mut Population {
        &mut self.population
    }
}
