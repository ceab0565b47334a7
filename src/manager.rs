use crate::config::Config;
use crate::control::{ControlPlane, read_commands};
use crate::engine::Engine;
use crate::events::{self, BoxedSink, Emitter, JsonLinesSink, MsgpackSink};
use crate::track::StadiumTrack;
use anyhow::{Context, Result, anyhow};
use std::{
    fs::File,
    io::{self, BufWriter},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

/// Options of a simulation run.
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Stop once this many generations have completed.
    pub max_generations: Option<u64>,
    /// Also record every event to this MessagePack file.
    pub record: Option<PathBuf>,
    /// Do not write events to stdout.
    pub quiet: bool,
}

pub struct Manager {
    cfg: Config,
}

impl Manager {
    /// Load the configuration from `config_file`, or use defaults.
    pub fn new(config_file: Option<&Path>) -> Result<Self> {
        let cfg = match config_file {
            Some(file) => Config::from_file(file).context("failed to construct cfg")?,
            None => Config::default(),
        };
        log::info!("{cfg:#?}");

        Ok(Self { cfg })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    /// Run the simulation with commands on stdin and events on stdout.
    pub fn run_simulation(&self, opts: RunOptions) -> Result<()> {
        let (emitter, queue) = Emitter::channel(self.cfg.run.event_buffer);

        let mut sinks: Vec<BoxedSink> = Vec::new();
        if !opts.quiet {
            sinks.push(Box::new(JsonLinesSink::new(io::stdout())));
        }
        if let Some(file) = &opts.record {
            let writer =
                File::create(file).with_context(|| format!("failed to create {file:?}"))?;
            sinks.push(Box::new(MsgpackSink::new(BufWriter::new(writer))));
            log::info!("recording events to {file:?}");
        }
        let writer = events::spawn_writer(queue, sinks)?;

        let control = Arc::new(ControlPlane::new(&self.cfg.run));
        {
            let control = Arc::clone(&control);
            let emitter = emitter.clone();
            thread::Builder::new()
                .name("commands".into())
                .spawn(move || read_commands(io::stdin().lock(), &control, &emitter))
                .context("failed to spawn command reader")?;
        }

        let mut engine = Engine::new(&self.cfg, StadiumTrack::default(), control, emitter.clone())
            .context("failed to construct engine")?;
        engine.run(opts.max_generations);

        emitter.close();
        writer
            .join()
            .map_err(|_| anyhow!("event writer panicked"))?;

        Ok(())
    }
}
