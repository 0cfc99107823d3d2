//! The search-and-commit loop. Each round populates the futures set, builds
//! a roster of candidate nexts, scores them against every future, commits
//! the winner to the master emulator, and adapts the population. A stuck or
//! scheduled backtrack rewinds to a checkpoint and lets replacement
//! candidates compete against the span they would replace.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use autoplay_core::emulator::{Emulator, EmulatorFactory};
use autoplay_core::motifs::{Motif, MotifStore};
use autoplay_core::movie::{collapse_subtitles, serialize_movie, Movie};
use autoplay_core::objectives::WeightedObjectives;
use autoplay_core::pfstate::{parse_state, serialize_state, Checkpoint, PersistentState};
use autoplay_core::rng::ArcFour;
use tracing::{debug, info, warn};

use crate::backtrack::propose_replacements;
use crate::config::SearchParams;
use crate::evaluate::{score_nexts, NextScore};
use crate::futures::FuturesPopulation;
use crate::helper::HelperPool;
use crate::nexts::{generate_nexts, Next, NextOrigin};
use crate::report::{write_report, RunReport};

/// Where checkpoint-time artifacts land. Any subset may be disabled.
#[derive(Clone, Debug, Default)]
pub struct OutputPaths {
    pub state: Option<PathBuf>,
    pub movie: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

pub struct Engine<F: EmulatorFactory> {
    factory: F,
    emu: F::Emu,
    objectives: WeightedObjectives,
    motifs: MotifStore,
    futures: FuturesPopulation,
    rng: ArcFour,
    params: SearchParams,
    game: String,

    movie: Vec<u8>,
    subtitles: Vec<String>,
    memories: Vec<Vec<u8>>,
    checkpoints: Vec<Checkpoint>,
    watermark: i32,

    rounds: usize,
    negative_streak: usize,
    rounds_since_backtrack: usize,
    backtracks: usize,
    improvements: usize,

    jobs: Option<usize>,
    helpers: Option<HelperPool>,
    output: OutputPaths,
}

impl<F: EmulatorFactory> Engine<F> {
    pub fn new(
        factory: F,
        objectives: WeightedObjectives,
        motifs: Vec<Motif>,
        params: SearchParams,
        game: &str,
        seed: &[u8],
    ) -> Result<Self> {
        params.validate()?;
        if motifs.is_empty() {
            bail!("cannot search without motifs");
        }

        let mut emu = factory.spawn();
        let initial = Checkpoint {
            movenum: 0,
            savestate: emu.save(),
        };
        let motifs = MotifStore::new(
            motifs,
            params.motif_alpha,
            params.motif_min_frac,
            params.motif_max_frac,
        );
        let futures = FuturesPopulation::new(&params);
        let mut objectives = objectives;
        objectives.observe(&emu.memory());

        Ok(Self {
            factory,
            emu,
            objectives,
            motifs,
            futures,
            rng: ArcFour::new(seed),
            params,
            game: game.to_string(),
            movie: Vec::new(),
            subtitles: Vec::new(),
            memories: Vec::new(),
            checkpoints: vec![initial],
            watermark: 0,
            rounds: 0,
            negative_streak: 0,
            rounds_since_backtrack: 0,
            backtracks: 0,
            improvements: 0,
            jobs: None,
            helpers: None,
            output: OutputPaths::default(),
        })
    }

    pub fn set_watermark(&mut self, watermark: i32) {
        self.watermark = watermark;
    }

    pub fn set_jobs(&mut self, jobs: Option<usize>) {
        self.jobs = jobs;
    }

    pub fn set_helpers(&mut self, helpers: Option<HelperPool>) {
        self.helpers = helpers;
    }

    pub fn set_output(&mut self, output: OutputPaths) {
        self.output = output;
    }

    pub fn movie(&self) -> &[u8] {
        &self.movie
    }

    pub fn subtitles(&self) -> &[String] {
        &self.subtitles
    }

    pub fn memories(&self) -> &[Vec<u8>] {
        &self.memories
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn backtracks(&self) -> usize {
        self.backtracks
    }

    pub fn run(&mut self, rounds: usize) -> Result<()> {
        for _ in 0..rounds {
            self.run_round()?;
        }
        self.persist()
    }

    /// One round: either commits exactly one next (plus at most one
    /// checkpoint), or fails without touching the movie.
    pub fn run_round(&mut self) -> Result<()> {
        self.motifs.begin_round();
        self.futures.populate(&self.motifs, &mut self.rng);

        let nexts = generate_nexts(&self.futures, &self.motifs, &mut self.rng, &self.params);
        if nexts.is_empty() {
            bail!("no candidate nexts generated");
        }

        let state = self.emu.save();
        let scores = score_nexts(
            &self.factory,
            &self.objectives,
            &state,
            &nexts,
            self.futures.futures(),
            self.jobs,
            self.helpers.as_ref(),
        );
        let best = select_best(&scores);
        let best_score = scores[best].clone();
        debug!(
            round = self.rounds,
            candidates = nexts.len(),
            total = best_score.total(),
            immediate = best_score.immediate,
            pick = %nexts[best].explanation,
            "round scored"
        );

        self.futures.record_totals(&best_score.per_future);
        self.futures.adapt_working_set();
        self.futures.prune_and_mutate(&mut self.rng);

        self.commit(&nexts[best], &best_score)?;

        self.rounds += 1;
        self.rounds_since_backtrack += 1;
        if best_score.total() < 0.0 {
            self.negative_streak += 1;
        } else {
            self.negative_streak = 0;
        }

        if self.should_backtrack() {
            self.backtrack()?;
        }
        Ok(())
    }

    fn commit(&mut self, next: &Next, score: &NextScore) -> Result<()> {
        for &input in &next.inputs {
            let memory = self.emu.step(input);
            self.movie.push(input);
            self.subtitles.push(next.explanation.clone());
            self.objectives.observe(&memory);
            self.memories.push(memory);
        }

        if let NextOrigin::Backfill { motif } = next.origin {
            if !next.inputs.is_empty() {
                let normalized = score.immediate / next.inputs.len() as f64;
                self.motifs.reweight(motif, normalized);
            }
        }

        self.maybe_checkpoint()
    }

    fn maybe_checkpoint(&mut self) -> Result<()> {
        let last = self.checkpoints.last().map(|c| c.movenum).unwrap_or(0);
        if self.movie.len() as i32 - last < self.params.checkpoint_every as i32 {
            return Ok(());
        }
        let savestate = self.emu.save();
        self.checkpoints.push(Checkpoint {
            movenum: self.movie.len() as i32,
            savestate,
        });
        self.persist()
    }

    fn persist(&mut self) -> Result<()> {
        if let Some(path) = self.output.state.clone() {
            self.save_snapshot(&path)?;
        }
        if let Some(path) = self.output.movie.clone() {
            self.export_movie(&path)?;
        }
        if let Some(path) = self.output.report.clone() {
            write_report(&path, &self.report())?;
        }
        Ok(())
    }

    fn should_backtrack(&self) -> bool {
        if (self.movie.len() as i32) <= self.watermark {
            return false;
        }
        let threshold = (self.params.stuck_threshold_frac
            * self.params.try_backtrack_every as f64)
            .ceil() as usize;
        if threshold > 0 && self.negative_streak >= threshold {
            return true;
        }
        self.rounds_since_backtrack >= self.params.try_backtrack_every
    }

    /// Rewind to an eligible checkpoint and let replacement candidates
    /// compete against the span they would replace. The movie tail is
    /// rewritten atomically: nothing changes until a winner is committed.
    fn backtrack(&mut self) -> Result<()> {
        let target = self.movie.len() as i32 - self.params.min_backtrack_distance as i32;
        let Some(checkpoint) = self
            .checkpoints
            .iter()
            .rev()
            .find(|c| c.movenum <= target && c.movenum >= self.watermark)
            .cloned()
        else {
            debug!("no checkpoint eligible for backtracking, trigger stays armed");
            return Ok(());
        };

        let start = checkpoint.movenum.max(0) as usize;
        let improveme = self.movie[start..].to_vec();
        if improveme.is_empty() {
            return Ok(());
        }
        // The cadence clocks reset only once a backtrack actually runs.
        self.rounds_since_backtrack = 0;
        self.negative_streak = 0;
        self.backtracks += 1;

        let mut scratch = self.factory.spawn();
        let accepted = propose_replacements(
            &mut scratch,
            &self.objectives,
            &checkpoint.savestate,
            &improveme,
            &self.motifs,
            &mut self.rng,
            &self.params,
        );
        info!(
            movenum = checkpoint.movenum,
            span = improveme.len(),
            accepted = accepted.len(),
            "backtracking"
        );

        let mut candidates = vec![Next {
            inputs: improveme,
            origin: NextOrigin::Improve,
            explanation: "improveme".to_string(),
        }];
        for replacement in &accepted {
            candidates.push(Next {
                inputs: replacement.inputs.clone(),
                origin: NextOrigin::Improve,
                explanation: format!("improve-{}", replacement.strategy),
            });
        }

        let scores = score_nexts(
            &self.factory,
            &self.objectives,
            &checkpoint.savestate,
            &candidates,
            self.futures.futures(),
            self.jobs,
            self.helpers.as_ref(),
        );
        let best = select_best(&scores);
        let best_score = scores[best].clone();
        if best != 0 {
            self.improvements += 1;
            info!(pick = %candidates[best].explanation, "replacement won");
        }

        self.emu.load(&checkpoint.savestate);
        self.movie.truncate(start);
        self.subtitles.truncate(start);
        self.memories.truncate(start);
        self.checkpoints.retain(|c| c.movenum <= checkpoint.movenum);

        self.futures.record_totals(&best_score.per_future);
        self.futures.adapt_working_set();
        self.futures.prune_and_mutate(&mut self.rng);

        self.commit(&candidates[best], &best_score)
    }

    pub fn report(&self) -> RunReport {
        let (mut weight_min, mut weight_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for motif in self.motifs.motifs() {
            weight_min = weight_min.min(motif.weight);
            weight_max = weight_max.max(motif.weight);
        }
        RunReport {
            game: self.game.clone(),
            rounds: self.rounds,
            frames: self.movie.len(),
            watermark: self.watermark,
            nfutures: self.futures.nfutures(),
            motif_weight_min: weight_min,
            motif_weight_max: weight_max,
            observed_memories: self.objectives.observed_memories(),
            backtracks: self.backtracks,
            improvements: self.improvements,
            negative_streak: self.negative_streak,
        }
    }

    fn persistent_state(&mut self) -> PersistentState {
        let checkpoint = self
            .checkpoints
            .last()
            .cloned()
            .unwrap_or_else(|| Checkpoint {
                movenum: 0,
                savestate: self.emu.save(),
            });
        PersistentState {
            game: self.game.clone(),
            watermark: self.watermark,
            movie: self.movie.clone(),
            subtitles: self.subtitles.clone(),
            memories: self.memories.clone(),
            checkpoint,
            motif_weights: self.motifs.export_weights(),
            nfutures: self.futures.nfutures() as u32,
            rng_state: self.rng.state(),
        }
    }

    pub fn save_snapshot(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        let bytes = serialize_state(&self.persistent_state());
        fs::write(path, bytes).with_context(|| format!("failed writing {}", path.display()))
    }

    pub fn export_movie(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        let movie = Movie {
            inputs: self.movie.clone(),
            subtitles: collapse_subtitles(&self.subtitles),
        };
        fs::write(path, serialize_movie(&movie))
            .with_context(|| format!("failed writing {}", path.display()))
    }

    /// Resume from a snapshot file. Returns true when the run continues from
    /// the snapshot; any corruption falls back to the cold state and logs.
    pub fn load_snapshot(&mut self, path: &Path) -> bool {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(path = %path.display(), %err, "no snapshot, warming up cold");
                return false;
            }
        };
        let state = match parse_state(&bytes) {
            Ok(state) => state,
            Err(err) => {
                warn!(path = %path.display(), %err, "corrupt snapshot, warming up cold");
                return false;
            }
        };
        if state.game != self.game {
            warn!(
                expected = %self.game,
                found = %state.game,
                "snapshot belongs to a different game, warming up cold"
            );
            return false;
        }
        let Some(rng) = ArcFour::restore(&state.rng_state) else {
            warn!("snapshot rng state corrupt, warming up cold");
            return false;
        };
        let replay_from = state.checkpoint.movenum.max(0) as usize;
        if replay_from > state.movie.len() {
            warn!("snapshot checkpoint lies past the movie, warming up cold");
            return false;
        }

        self.rng = rng;
        self.watermark = state.watermark;
        self.movie = state.movie;
        self.subtitles = state.subtitles;
        self.memories = state.memories;
        self.motifs.restore_weights(state.motif_weights);
        self.futures.set_nfutures(state.nfutures as usize);
        self.checkpoints = vec![state.checkpoint.clone()];

        // Bring the master emulator to the end of the movie, then re-feed
        // the committed memories through the evaluator.
        self.emu.load(&state.checkpoint.savestate);
        for idx in replay_from..self.movie.len() {
            let input = self.movie[idx];
            self.emu.step(input);
        }
        let memories = std::mem::take(&mut self.memories);
        for memory in &memories {
            self.objectives.observe(memory);
        }
        self.memories = memories;

        self.rounds = 0;
        self.negative_streak = 0;
        self.rounds_since_backtrack = 0;

        info!(
            frames = self.movie.len(),
            nfutures = self.futures.nfutures(),
            "resumed from snapshot"
        );
        true
    }
}

/// Index of the highest-ranking score; ties break to the earliest index and
/// NaN never wins.
fn select_best(scores: &[NextScore]) -> usize {
    let mut best = 0;
    let mut best_rank = f64::NEG_INFINITY;
    for (idx, score) in scores.iter().enumerate() {
        let rank = score.ranking();
        if rank > best_rank {
            best = idx;
            best_rank = rank;
        }
    }
    best
}
