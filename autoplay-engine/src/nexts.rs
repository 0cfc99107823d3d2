//! Candidate short sequences for the next commit: prefixes of the current
//! futures plus weighted motif backfill, deduplicated and subsampled down to
//! a round-sized roster.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use autoplay_core::motifs::MotifStore;
use autoplay_core::rng::ArcFour;

use crate::config::SearchParams;
use crate::futures::FuturesPopulation;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NextOrigin {
    /// Prefix of the future at this index.
    Future(usize),
    /// Sampled straight from a motif.
    Backfill { motif: usize },
    /// Backtrack replacement; no motif gets credit.
    Improve,
}

#[derive(Clone, Debug)]
pub struct Next {
    pub inputs: Vec<u8>,
    pub origin: NextOrigin,
    pub explanation: String,
}

pub fn input_hash(inputs: &[u8]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    inputs.hash(&mut hasher);
    hasher.finish()
}

/// Build the candidate roster for one round. Reproducible given the RNG
/// state: candidate order, dedup, shuffles, and the final subsample are all
/// functions of the inputs.
pub fn generate_nexts(
    futures: &FuturesPopulation,
    motifs: &MotifStore,
    rng: &mut ArcFour,
    params: &SearchParams,
) -> Vec<Next> {
    let mut seen = HashSet::new();
    let mut from_futures = Vec::new();
    let mut from_backfill = Vec::new();

    for (idx, future) in futures.futures().iter().enumerate() {
        let len = params.next_len.min(future.inputs.len());
        if len == 0 {
            continue;
        }
        let inputs = future.inputs[..len].to_vec();
        if seen.insert(input_hash(&inputs)) {
            from_futures.push(Next {
                inputs,
                origin: NextOrigin::Future(idx),
                explanation: format!("ftr-{idx}"),
            });
        }
    }

    for _ in 0..params.backfill_count {
        let motif = motifs.sample(rng, true);
        let inputs = motifs.inputs(motif).to_vec();
        if inputs.is_empty() {
            continue;
        }
        if seen.insert(input_hash(&inputs)) {
            from_backfill.push(Next {
                inputs,
                origin: NextOrigin::Backfill { motif },
                explanation: "backfill".to_string(),
            });
        }
    }

    subsample(from_futures, from_backfill, rng, params)
}

/// Cut the roster to `[min_nexts, max_nexts]`: half futures-derived, the
/// rest backfill, topping up from futures-derived when backfill runs dry.
fn subsample(
    mut from_futures: Vec<Next>,
    mut from_backfill: Vec<Next>,
    rng: &mut ArcFour,
    params: &SearchParams,
) -> Vec<Next> {
    let available = from_futures.len() + from_backfill.len();
    let target = available.clamp(params.min_nexts.min(available), params.max_nexts);

    rng.shuffle(&mut from_futures);
    rng.shuffle(&mut from_backfill);

    let mut out = Vec::with_capacity(target);
    let half = target.div_ceil(2).min(from_futures.len());
    out.extend(from_futures.drain(..half));

    let fill = (target - out.len()).min(from_backfill.len());
    out.extend(from_backfill.drain(..fill));

    let top_up = (target - out.len()).min(from_futures.len());
    out.extend(from_futures.drain(..top_up));

    out
}
