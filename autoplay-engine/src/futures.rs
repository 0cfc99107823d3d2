//! The futures working set: longer input plans used to forecast the value of
//! committing a short next. One record per future carries its inputs, its
//! sampling mode, its adaptive desired length, and the total from the last
//! scoring round, so pruning can never desynchronize parallel arrays.

use autoplay_core::input::{dualize_all, reverse_span};
use autoplay_core::motifs::MotifStore;
use autoplay_core::rng::ArcFour;

use crate::config::SearchParams;

#[derive(Clone, Debug)]
pub struct Future {
    pub inputs: Vec<u8>,
    pub weighted: bool,
    pub desired_length: usize,
    pub total: f64,
}

#[derive(Clone, Debug)]
pub struct FuturesPopulation {
    futures: Vec<Future>,
    nfutures: usize,
    min_futures: usize,
    max_futures: usize,
    min_length: usize,
    max_length: usize,
    nfutures_step_frac: f64,
    length_step_frac: f64,
    drop_count: usize,
    mutate_count: usize,
}

// Fresh futures retry a few times to dodge exact duplicates, then give up;
// uniqueness is a nicety, not an invariant.
const DUP_RETRIES: usize = 3;

impl FuturesPopulation {
    pub fn new(params: &SearchParams) -> Self {
        Self {
            futures: Vec::new(),
            nfutures: params
                .initial_futures
                .clamp(params.min_futures, params.max_futures),
            min_futures: params.min_futures,
            max_futures: params.max_futures,
            min_length: params.min_future_length,
            max_length: params.max_future_length,
            nfutures_step_frac: params.nfutures_step_frac,
            length_step_frac: params.desired_length_step_frac,
            drop_count: params.drop_futures,
            mutate_count: params.mutate_futures,
        }
    }

    pub fn futures(&self) -> &[Future] {
        &self.futures
    }

    pub fn nfutures(&self) -> usize {
        self.nfutures
    }

    /// Snapshot restore path; the stored value is clamped into the
    /// configured range.
    pub fn set_nfutures(&mut self, n: usize) {
        self.nfutures = n.clamp(self.min_futures, self.max_futures);
    }

    /// Bring every future to its desired length and grow the set to
    /// `nfutures`. After this, `futures().len() == nfutures()` and every
    /// future's `inputs.len() == desired_length`.
    pub fn populate(&mut self, motifs: &MotifStore, rng: &mut ArcFour) {
        for idx in 0..self.futures.len() {
            let desired = self.futures[idx].desired_length;
            let weighted = self.futures[idx].weighted;
            if self.futures[idx].inputs.len() > desired {
                self.futures[idx].inputs.truncate(desired);
            }
            while self.futures[idx].inputs.len() < desired {
                let motif = motifs.sample(rng, weighted);
                let inputs = motifs.inputs(motif).to_vec();
                self.futures[idx].inputs.extend_from_slice(&inputs);
            }
            self.futures[idx].inputs.truncate(desired);
        }

        while self.futures.len() < self.nfutures {
            let mut fresh = self.fresh_future(motifs, rng);
            for _ in 0..DUP_RETRIES {
                if !self.futures.iter().any(|f| f.inputs == fresh.inputs) {
                    break;
                }
                fresh = self.fresh_future(motifs, rng);
            }
            self.futures.push(fresh);
        }
        self.futures.truncate(self.nfutures);
    }

    fn fresh_future(&self, motifs: &MotifStore, rng: &mut ArcFour) -> Future {
        let span = self.max_length - self.min_length + 1;
        let desired_length = self.min_length + rng.next_below(span);
        let weighted = rng.next_f64_unit() < 0.5;

        let mut inputs = Vec::with_capacity(desired_length);
        while inputs.len() < desired_length {
            let motif = motifs.sample(rng, weighted);
            inputs.extend_from_slice(motifs.inputs(motif));
        }
        inputs.truncate(desired_length);

        Future {
            inputs,
            weighted,
            desired_length,
            total: 0.0,
        }
    }

    /// Record this round's per-future totals (for the committed next) and
    /// adapt each future's desired length: grow on a positive total, shrink
    /// otherwise.
    pub fn record_totals(&mut self, totals: &[f64]) {
        debug_assert_eq!(totals.len(), self.futures.len());
        for (future, &total) in self.futures.iter_mut().zip(totals) {
            future.total = total;
            let step = ((future.desired_length as f64 * self.length_step_frac).round() as usize)
                .max(1);
            future.desired_length = if total > 0.0 {
                (future.desired_length + step).min(self.max_length)
            } else {
                future.desired_length.saturating_sub(step).max(self.min_length)
            };
        }
    }

    /// Grow the working set when few futures look promising, shrink it when
    /// most do.
    pub fn adapt_working_set(&mut self) {
        if self.futures.is_empty() {
            return;
        }
        let promising = self.futures.iter().filter(|f| f.total > 0.0).count();
        let p = promising as f64 / self.nfutures as f64;
        let step = ((self.nfutures as f64 * self.nfutures_step_frac).round() as usize).max(1);
        if p < 0.4 {
            self.nfutures = (self.nfutures + step).min(self.max_futures);
        } else if p > 0.6 {
            self.nfutures = self.nfutures.saturating_sub(step).max(self.min_futures);
        }
    }

    /// Drop the `drop_count + mutate_count` lowest-total futures (ascending
    /// tie-break by index), then clone the best survivor `mutate_count`
    /// times with random perturbations. `populate` refills the rest.
    pub fn prune_and_mutate(&mut self, rng: &mut ArcFour) {
        if self.futures.len() < 2 {
            return;
        }
        let kill = (self.drop_count + self.mutate_count).min(self.futures.len() - 1);

        let mut order: Vec<usize> = (0..self.futures.len()).collect();
        order.sort_by(|&a, &b| {
            rank(self.futures[a].total)
                .partial_cmp(&rank(self.futures[b].total))
                .expect("rank is never NaN")
                .then(a.cmp(&b))
        });
        let doomed: Vec<usize> = order[..kill].to_vec();

        let mut keep_mask = vec![true; self.futures.len()];
        for &idx in &doomed {
            keep_mask[idx] = false;
        }
        let mut keep_iter = keep_mask.iter();
        self.futures.retain(|_| *keep_iter.next().expect("mask covers all futures"));

        if self.futures.is_empty() {
            return;
        }
        let best = self
            .futures
            .iter()
            .enumerate()
            .max_by(|(ai, a), (bi, b)| {
                rank(a.total)
                    .partial_cmp(&rank(b.total))
                    .expect("rank is never NaN")
                    .then(bi.cmp(ai))
            })
            .map(|(idx, _)| idx)
            .expect("non-empty futures");

        for _ in 0..self.mutate_count {
            let clone = self.mutate_clone(&self.futures[best].clone(), rng);
            self.futures.push(clone);
        }
    }

    fn mutate_clone(&self, source: &Future, rng: &mut ArcFour) -> Future {
        let mut future = source.clone();

        if rng.next_f64_unit() < 0.5 {
            future.weighted = !future.weighted;
        }
        if rng.next_f64_unit() < 0.5 && !future.inputs.is_empty() {
            let floor = self.min_length.min(future.inputs.len());
            let prefix = (1 + rng.next_below(future.inputs.len())).max(floor);
            future.inputs.truncate(prefix);
        }
        if rng.next_f64_unit() < 0.5 {
            future.inputs = dualize_all(&future.inputs);
        }
        if rng.next_f64_unit() < 0.5 && !future.inputs.is_empty() {
            let start = rng.next_below(future.inputs.len());
            let span = 1 + rng.next_below(future.inputs.len() - start);
            reverse_span(&mut future.inputs, start, span);
        }

        future.total = 0.0;
        future
    }
}

// NaN totals rank below every real total.
#[inline]
fn rank(total: f64) -> f64 {
    if total.is_nan() {
        f64::NEG_INFINITY
    } else {
        total
    }
}
