use std::env;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Tunables of the search loop. Defaults are the shipped profile; a JSON
/// params file overrides defaults, and `AUTOPLAY_*` environment variables
/// override the file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    // Nexts generation.
    pub min_nexts: usize,
    pub max_nexts: usize,
    pub next_len: usize,
    pub backfill_count: usize,

    // Futures population.
    pub min_futures: usize,
    pub max_futures: usize,
    pub initial_futures: usize,
    pub min_future_length: usize,
    pub max_future_length: usize,
    pub nfutures_step_frac: f64,
    pub desired_length_step_frac: f64,
    pub drop_futures: usize,
    pub mutate_futures: usize,

    // Backtracking.
    pub try_backtrack_every: usize,
    pub min_backtrack_distance: usize,
    pub stuck_threshold_frac: f64,
    pub random_candidates: usize,
    pub opposite_span_candidates: usize,
    pub ablation_candidates: usize,
    pub ablation_mask_p: f64,
    pub chop_candidates: usize,

    // Motif reweighting.
    pub motif_alpha: f64,
    pub motif_min_frac: f64,
    pub motif_max_frac: f64,

    // Persistence.
    pub checkpoint_every: usize,

    // Distributed helpers.
    pub helper_connect_timeout_ms: u64,
    pub helper_io_timeout_ms: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            min_nexts: 16,
            max_nexts: 40,
            next_len: 10,
            backfill_count: 12,

            min_futures: 10,
            max_futures: 80,
            initial_futures: 40,
            min_future_length: 50,
            max_future_length: 800,
            nfutures_step_frac: 0.05,
            desired_length_step_frac: 0.10,
            drop_futures: 5,
            mutate_futures: 5,

            try_backtrack_every: 18,
            min_backtrack_distance: 60,
            stuck_threshold_frac: 0.5,
            random_candidates: 6,
            opposite_span_candidates: 6,
            ablation_candidates: 6,
            ablation_mask_p: 0.5,
            chop_candidates: 4,

            motif_alpha: 0.8,
            motif_min_frac: 0.0001,
            motif_max_frac: 0.1,

            checkpoint_every: 50,

            helper_connect_timeout_ms: 250,
            helper_io_timeout_ms: 5_000,
        }
    }
}

impl SearchParams {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading params file {}", path.display()))?;
        let params: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed parsing params file {}", path.display()))?;
        Ok(params)
    }

    /// Apply `AUTOPLAY_<FIELD>` environment overrides in place.
    pub fn apply_env(&mut self) {
        read_env_usize("AUTOPLAY_MIN_NEXTS", &mut self.min_nexts);
        read_env_usize("AUTOPLAY_MAX_NEXTS", &mut self.max_nexts);
        read_env_usize("AUTOPLAY_NEXT_LEN", &mut self.next_len);
        read_env_usize("AUTOPLAY_BACKFILL_COUNT", &mut self.backfill_count);
        read_env_usize("AUTOPLAY_MIN_FUTURES", &mut self.min_futures);
        read_env_usize("AUTOPLAY_MAX_FUTURES", &mut self.max_futures);
        read_env_usize("AUTOPLAY_INITIAL_FUTURES", &mut self.initial_futures);
        read_env_usize("AUTOPLAY_MIN_FUTURE_LENGTH", &mut self.min_future_length);
        read_env_usize("AUTOPLAY_MAX_FUTURE_LENGTH", &mut self.max_future_length);
        read_env_f64("AUTOPLAY_NFUTURES_STEP_FRAC", &mut self.nfutures_step_frac);
        read_env_f64(
            "AUTOPLAY_DESIRED_LENGTH_STEP_FRAC",
            &mut self.desired_length_step_frac,
        );
        read_env_usize("AUTOPLAY_DROP_FUTURES", &mut self.drop_futures);
        read_env_usize("AUTOPLAY_MUTATE_FUTURES", &mut self.mutate_futures);
        read_env_usize("AUTOPLAY_TRY_BACKTRACK_EVERY", &mut self.try_backtrack_every);
        read_env_usize(
            "AUTOPLAY_MIN_BACKTRACK_DISTANCE",
            &mut self.min_backtrack_distance,
        );
        read_env_f64("AUTOPLAY_STUCK_THRESHOLD_FRAC", &mut self.stuck_threshold_frac);
        read_env_usize("AUTOPLAY_RANDOM_CANDIDATES", &mut self.random_candidates);
        read_env_usize(
            "AUTOPLAY_OPPOSITE_SPAN_CANDIDATES",
            &mut self.opposite_span_candidates,
        );
        read_env_usize("AUTOPLAY_ABLATION_CANDIDATES", &mut self.ablation_candidates);
        read_env_f64("AUTOPLAY_ABLATION_MASK_P", &mut self.ablation_mask_p);
        read_env_usize("AUTOPLAY_CHOP_CANDIDATES", &mut self.chop_candidates);
        read_env_f64("AUTOPLAY_MOTIF_ALPHA", &mut self.motif_alpha);
        read_env_f64("AUTOPLAY_MOTIF_MIN_FRAC", &mut self.motif_min_frac);
        read_env_f64("AUTOPLAY_MOTIF_MAX_FRAC", &mut self.motif_max_frac);
        read_env_usize("AUTOPLAY_CHECKPOINT_EVERY", &mut self.checkpoint_every);
        read_env_u64(
            "AUTOPLAY_HELPER_CONNECT_TIMEOUT_MS",
            &mut self.helper_connect_timeout_ms,
        );
        read_env_u64(
            "AUTOPLAY_HELPER_IO_TIMEOUT_MS",
            &mut self.helper_io_timeout_ms,
        );
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_nexts == 0 || self.min_nexts > self.max_nexts {
            bail!(
                "min_nexts/max_nexts out of order: {}..{}",
                self.min_nexts,
                self.max_nexts
            );
        }
        if self.next_len == 0 {
            bail!("next_len must be > 0");
        }
        if self.min_futures == 0 || self.min_futures > self.max_futures {
            bail!(
                "min_futures/max_futures out of order: {}..{}",
                self.min_futures,
                self.max_futures
            );
        }
        if self.min_future_length == 0 || self.min_future_length > self.max_future_length {
            bail!(
                "future length bounds out of order: {}..{}",
                self.min_future_length,
                self.max_future_length
            );
        }
        if !(self.motif_alpha > 0.0 && self.motif_alpha < 1.0) {
            bail!("motif_alpha must lie in (0, 1), got {}", self.motif_alpha);
        }
        if !(0.0..=1.0).contains(&self.motif_min_frac)
            || !(0.0..=1.0).contains(&self.motif_max_frac)
            || self.motif_min_frac > self.motif_max_frac
        {
            bail!(
                "motif weight fractions out of order: {}..{}",
                self.motif_min_frac,
                self.motif_max_frac
            );
        }
        if self.checkpoint_every == 0 {
            bail!("checkpoint_every must be > 0");
        }
        if self.try_backtrack_every == 0 {
            bail!("try_backtrack_every must be > 0");
        }
        if !(0.0..=1.0).contains(&self.ablation_mask_p) {
            bail!("ablation_mask_p must lie in [0, 1], got {}", self.ablation_mask_p);
        }
        if !(0.0..=1.0).contains(&self.stuck_threshold_frac) {
            bail!(
                "stuck_threshold_frac must lie in [0, 1], got {}",
                self.stuck_threshold_frac
            );
        }
        Ok(())
    }
}

fn read_env_usize(name: &str, slot: &mut usize) {
    if let Some(value) = env::var(name).ok().and_then(|v| v.parse().ok()) {
        *slot = value;
    }
}

fn read_env_u64(name: &str, slot: &mut u64) {
    if let Some(value) = env::var(name).ok().and_then(|v| v.parse().ok()) {
        *slot = value;
    }
}

fn read_env_f64(name: &str, slot: &mut f64) {
    if let Some(value) = env::var(name).ok().and_then(|v| v.parse().ok()) {
        *slot = value;
    }
}
