use crate::agent::Agent;
use crate::config::{AgentConfig, Config, PopulationConfig};
use crate::episode::Member;
use crate::events::{COLORS, CarSnapshot, GenerationSummary, Snapshot, round_to};
use crate::stats::Accumulator;
use crate::track::Track;
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;

/// Number of best-ranked agents eligible as parents.
const PARENT_POOL_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Ending,
}

/// Generation manager.
///
/// Owns every agent, its episode state, the counters and the random number
/// generator. The simulation loop is its only mutator.
pub struct Population {
    pop_cfg: PopulationConfig,
    agent_cfg: AgentConfig,
    agents: Vec<Agent>,
    members: Vec<Member>,
    generation: u64,
    steps: usize,
    phase: Phase,
    rng: ChaCha12Rng,
}

impl Population {
    /// Create generation 1 with untrained agents.
    pub fn new(cfg: &Config) -> Result<Self> {
        let rng = match cfg.run.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng().context("failed to seed rng")?,
        };
        Ok(Self::with_rng(cfg, rng))
    }

    pub fn with_rng(cfg: &Config, rng: ChaCha12Rng) -> Self {
        let n = cfg.population.size;
        Self {
            pop_cfg: cfg.population.clone(),
            agent_cfg: cfg.agent.clone(),
            agents: (0..n).map(|_| Agent::new(&cfg.agent)).collect(),
            members: (0..n).map(|_| Member::default()).collect(),
            generation: 1,
            steps: 0,
            phase: Phase::Running,
            rng,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn alive_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_alive()).count()
    }

    /// Advance every live member by one tick.
    ///
    /// Members are independent, so a failure in one does not stop the others;
    /// the first failure is returned after the pass.
    pub fn tick<T: Track + ?Sized>(&mut self, track: &T) -> Result<()> {
        if self.phase != Phase::Running {
            return Ok(());
        }
        self.steps += 1;

        let mut first_error = None;
        for (slot, (member, agent)) in self.members.iter_mut().zip(&mut self.agents).enumerate() {
            if let Err(error) = member.step(agent, track, &mut self.rng)
                && first_error.is_none()
            {
                first_error = Some(error.context(format!("failed to step slot {slot}")));
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Move to [`Phase::Ending`] once every member has terminated or the step budget is spent.
    pub fn check_generation_end(&mut self) -> bool {
        if self.phase == Phase::Running
            && (self.alive_count() == 0 || self.steps >= self.pop_cfg.max_steps)
        {
            self.phase = Phase::Ending;
        }
        self.phase == Phase::Ending
    }

    /// Slots ordered by progress, best first; ties keep slot order.
    pub fn ranking(&self) -> Vec<usize> {
        let mut ranked: Vec<usize> = (0..self.members.len()).collect();
        ranked.sort_by(|&a, &b| {
            self.members[b]
                .progress()
                .total_cmp(&self.members[a].progress())
        });
        ranked
    }

    /// Elite slot and the slots eligible as parents for the remaining slots.
    pub fn select_parents(&self) -> Result<(usize, Vec<usize>)> {
        let ranked = self.ranking();
        let &elite = ranked.first().context("population is empty")?;
        let pool = ranked.into_iter().take(PARENT_POOL_SIZE).collect();
        Ok((elite, pool))
    }

    /// Replace the agents with the offspring of the ending generation.
    ///
    /// Skipped on generation 1, whose agents carry over unchanged. The population
    /// is only replaced once every offspring has been produced.
    pub fn evolve(&mut self) -> Result<Option<GenerationSummary>> {
        if self.phase != Phase::Ending {
            bail!("generation {} is not ending", self.generation);
        }
        if self.generation <= 1 {
            return Ok(None);
        }

        let (elite, pool) = self.select_parents()?;
        let elite_agent = &self.agents[elite];
        let progress: Accumulator = self.members.iter().map(Member::progress).collect();
        let summary = GenerationSummary {
            generation: self.generation,
            distance: round_to(self.members[elite].progress(), 1),
            epsilon: round_to(elite_agent.epsilon(), 3),
            mean_distance: round_to(progress.mean(), 1),
            std_distance: if progress.count() < 2 {
                0.0
            } else {
                round_to(progress.std_dev(), 1)
            },
        };

        let mut next = Vec::with_capacity(self.agents.len());

        let mut elite_clone = elite_agent
            .reproduce_with_mutation(&mut self.rng)
            .context("failed to clone elite")?;
        elite_clone.set_epsilon(elite_agent.epsilon());
        next.push(elite_clone);

        for _ in 1..self.agents.len() {
            let &parent = pool
                .choose(&mut self.rng)
                .context("failed to choose a parent")?;
            let child = self.agents[parent]
                .reproduce_with_mutation(&mut self.rng)
                .context("failed to reproduce parent")?;
            next.push(child);
        }

        self.agents = next;
        Ok(Some(summary))
    }

    /// Re-place every member and start the next generation.
    pub fn begin_next_generation(&mut self) {
        self.reset_members();
        self.generation += 1;
        self.phase = Phase::Running;
    }

    /// Discard every agent and restart from generation 1.
    ///
    /// Valid from any phase; an ending generation is dropped without evolving.
    pub fn hard_reset(&mut self) {
        let n = self.pop_cfg.size;
        self.agents = (0..n).map(|_| Agent::new(&self.agent_cfg)).collect();
        self.reset_members();
        self.generation = 1;
        self.phase = Phase::Running;
    }

    fn reset_members(&mut self) {
        self.members.iter_mut().for_each(|m| *m = Member::default());
        self.steps = 0;
    }

    /// Build the per-frame snapshot, consuming the crash flags it reports.
    pub fn snapshot(&mut self) -> Snapshot {
        let alive = self.alive_count();
        let cars = self
            .members
            .iter_mut()
            .zip(&self.agents)
            .enumerate()
            .map(|(id, (member, agent))| {
                let car = member.car();
                CarSnapshot {
                    id,
                    x: round_to(car.x, 1),
                    y: round_to(car.y, 1),
                    angle: round_to(car.heading, 2),
                    alive: member.is_alive(),
                    crashed: member.take_crash_flag(),
                    sensors: member
                        .radars()
                        .iter()
                        .map(|r| (r.distance, r.angle))
                        .collect(),
                    color: COLORS[id % COLORS.len()].to_string(),
                    policy_entries: agent.table().len(),
                }
            })
            .collect();

        Snapshot {
            generation: self.generation,
            steps: self.steps,
            alive,
            cars,
        }
    }
}

#[cfg(test)]
impl Population {
    /// Ticks elapsed in the current generation.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::Car;
    use crate::policy::{Action, N_SENSORS, State};
    use crate::track::StadiumTrack;

    fn config(size: usize) -> Config {
        let mut cfg = Config::default();
        cfg.population.size = size;
        cfg.population.max_steps = 20;
        cfg
    }

    fn population(size: usize) -> Population {
        Population::with_rng(&config(size), ChaCha12Rng::seed_from_u64(11))
    }

    fn set_progress(pop: &mut Population, distances: &[f64]) {
        for (member, &distance) in pop.members.iter_mut().zip(distances) {
            *member = Member::new(Car {
                distance,
                ..Default::default()
            });
        }
    }

    fn state(fill: u8) -> State {
        State::new([fill; N_SENSORS + 1])
    }

    #[test]
    fn elite_is_farthest_and_top_three_are_parents() {
        let mut pop = population(3);
        set_progress(&mut pop, &[50.0, 30.0, 70.0]);

        let (elite, mut pool) = pop.select_parents().unwrap();
        assert_eq!(elite, 2);
        pool.sort();
        assert_eq!(pool, vec![0, 1, 2]);
        assert_eq!(pop.ranking(), vec![2, 0, 1]);
    }

    #[test]
    fn parent_pool_is_capped_at_three() {
        let mut pop = population(5);
        set_progress(&mut pop, &[10.0, 40.0, 20.0, 50.0, 30.0]);
        let (elite, pool) = pop.select_parents().unwrap();
        assert_eq!(elite, 3);
        assert_eq!(pool, vec![3, 1, 4]);
    }

    #[test]
    fn ties_rank_by_slot_order() {
        let mut pop = population(3);
        set_progress(&mut pop, &[5.0, 9.0, 9.0]);
        assert_eq!(pop.ranking(), vec![1, 2, 0]);
    }

    #[test]
    fn generation_ends_when_all_terminated_or_budget_spent() {
        let track = StadiumTrack::default();
        let mut pop = population(2);
        assert!(!pop.check_generation_end());

        for _ in 0..20 {
            assert_eq!(pop.phase(), Phase::Running);
            pop.tick(&track).unwrap();
            if pop.check_generation_end() {
                break;
            }
        }
        assert_eq!(pop.phase(), Phase::Ending);
        assert!(pop.alive_count() == 0 || pop.steps() == 20);

        // Ticks are ignored until the next generation starts.
        let steps = pop.steps();
        pop.tick(&track).unwrap();
        assert_eq!(pop.steps(), steps);
    }

    #[test]
    fn first_generation_keeps_its_agents() {
        let mut pop = population(3);
        pop.agents[1].table_mut().set(state(1), Action::Forward, 4.0);
        pop.phase = Phase::Ending;

        assert_eq!(pop.evolve().unwrap(), None);
        pop.begin_next_generation();

        assert_eq!(pop.generation(), 2);
        assert_eq!(pop.agents()[1].table().get(state(1), Action::Forward), 4.0);
        assert!(pop.members().iter().all(|m| m.is_alive() && m.progress() == 0.0));
    }

    #[test]
    fn evolution_clones_elite_with_pinned_epsilon() {
        let mut pop = population(4);
        pop.generation = 3;
        for (i, agent) in pop.agents.iter_mut().enumerate() {
            agent.set_epsilon(0.1 + 0.1 * i as f64);
            agent.table_mut().set(state(i as u8), Action::Forward, 1.0);
        }
        set_progress(&mut pop, &[10.0, 80.0, 20.0, 5.0]);
        pop.phase = Phase::Ending;

        let summary = pop.evolve().unwrap().unwrap();
        assert_eq!(summary.generation, 3);
        assert_eq!(summary.distance, 80.0);
        assert_eq!(summary.epsilon, 0.2);
        assert!((summary.mean_distance - 28.75).abs() <= 0.05);

        assert_eq!(pop.agents().len(), 4);
        assert_eq!(pop.agents()[0].epsilon(), 0.2);
        assert_eq!(pop.agents()[0].table().len(), 1);
        let elite_value = pop.agents()[0].table().get(state(1), Action::Forward);
        assert!((0.5..=1.5).contains(&elite_value));

        // Offspring descend from the top three (slots 1, 2 and 0), never from slot 3.
        for child in &pop.agents()[1..] {
            assert_eq!(child.table().len(), 1);
            assert_eq!(child.table().get(state(3), Action::Forward), 0.0);
        }

        pop.begin_next_generation();
        assert_eq!(pop.generation(), 4);
        assert_eq!(pop.steps(), 0);
        assert!(pop.members().iter().all(|m| m.previous().is_none()));
    }

    #[test]
    fn single_member_summary_has_zero_spread() {
        let mut pop = population(1);
        pop.generation = 2;
        set_progress(&mut pop, &[42.0]);
        pop.phase = Phase::Ending;

        let summary = pop.evolve().unwrap().unwrap();
        assert_eq!(summary.distance, 42.0);
        assert_eq!(summary.mean_distance, 42.0);
        assert_eq!(summary.std_distance, 0.0);
        assert_eq!(pop.agents().len(), 1);
    }

    #[test]
    fn evolve_requires_ending_phase() {
        let mut pop = population(2);
        pop.generation = 2;
        assert!(pop.evolve().is_err());
    }

    #[test]
    fn hard_reset_wipes_agents_and_counters() {
        let track = StadiumTrack::default();
        let mut pop = population(3);
        pop.generation = 9;
        pop.phase = Phase::Ending;
        for agent in &mut pop.agents {
            agent.table_mut().set(state(0), Action::Coast, 1.0);
            agent.set_epsilon(0.45);
        }

        pop.hard_reset();

        assert_eq!(pop.generation(), 1);
        assert_eq!(pop.steps(), 0);
        assert_eq!(pop.phase(), Phase::Running);
        assert_eq!(pop.agents().len(), 3);
        for agent in pop.agents() {
            assert!(agent.table().is_empty());
            assert_eq!(agent.epsilon(), AgentConfig::default().epsilon);
        }
        pop.tick(&track).unwrap();
        assert_eq!(pop.steps(), 1);
    }

    #[test]
    fn snapshot_reports_each_slot() {
        let track = StadiumTrack::default();
        let mut pop = population(3);
        pop.tick(&track).unwrap();

        let snapshot = pop.snapshot();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.steps, 1);
        assert_eq!(snapshot.cars.len(), 3);
        for (id, car) in snapshot.cars.iter().enumerate() {
            assert_eq!(car.id, id);
            assert_eq!(car.color, COLORS[id]);
            assert_eq!(car.sensors.len(), N_SENSORS);
        }
        assert_eq!(snapshot.alive, pop.alive_count());
    }
}
