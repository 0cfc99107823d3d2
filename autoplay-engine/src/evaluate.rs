//! Round scoring: every candidate next is played out on a private emulator,
//! then every future is integrated from the resulting state. Embarrassingly
//! parallel across nexts; all reductions run in fixed index order so a
//! round's outcome does not depend on worker scheduling.

use autoplay_core::emulator::{Emulator, EmulatorFactory};
use autoplay_core::integrate::score_integral;
use autoplay_core::objectives::WeightedObjectives;
use rayon::prelude::*;
use tracing::warn;

use crate::futures::Future;
use crate::helper::{EvalRequest, HelperPool};
use crate::nexts::Next;

#[derive(Clone, Debug)]
pub struct NextScore {
    pub immediate: f64,
    pub futsum: f64,
    pub per_future: Vec<f64>,
    pub worst_future: f64,
    pub best_future: f64,
}

impl NextScore {
    pub fn total(&self) -> f64 {
        self.immediate + self.futsum
    }

    /// Selection key: NaN never beats a real score.
    pub fn ranking(&self) -> f64 {
        let total = self.total();
        if total.is_nan() {
            f64::NEG_INFINITY
        } else {
            total
        }
    }
}

/// Play `next_inputs` from `state`, then integrate each future from the
/// resulting state. Returns the immediate score and one total per future:
/// `integral + pos + neg` of the terminal displacement.
pub fn evaluate_candidate<F, S>(
    factory: &F,
    objectives: &WeightedObjectives,
    state: &[u8],
    next_inputs: &[u8],
    future_inputs: &[S],
) -> (f64, Vec<f64>)
where
    F: EmulatorFactory,
    S: AsRef<[u8]>,
{
    let mut emu = factory.spawn();
    emu.load(state);

    let mut memory = emu.memory();
    let mut immediate = 0.0;
    for &input in next_inputs {
        let next = emu.step(input);
        immediate += objectives.evaluate_magnitude(&memory, &next);
        memory = next;
    }
    let post_state = emu.save();
    let post_memory = memory;

    let mut per_future = Vec::with_capacity(future_inputs.len());
    for inputs in future_inputs {
        let (integral, terminal) =
            score_integral(&mut emu, objectives, &post_state, inputs.as_ref());
        let (pos, neg) = objectives.delta_magnitude(&post_memory, &terminal);
        per_future.push(integral + pos + neg);
    }

    (immediate, per_future)
}

/// Score every next against every future. Results come back in input order.
/// When helpers are configured, each next is offered to a helper first and
/// re-executed locally on any failure; correctness never depends on them.
pub fn score_nexts<F: EmulatorFactory>(
    factory: &F,
    objectives: &WeightedObjectives,
    state: &[u8],
    nexts: &[Next],
    futures: &[Future],
    jobs: Option<usize>,
    helpers: Option<&HelperPool>,
) -> Vec<NextScore> {
    let future_inputs: Vec<&[u8]> = futures.iter().map(|f| f.inputs.as_slice()).collect();

    if let Some(pool) = helpers.filter(|pool| !pool.is_empty()) {
        return nexts
            .iter()
            .map(|next| {
                score_via_helper(pool, factory, objectives, state, next, &future_inputs)
            })
            .collect();
    }

    let score_one = |next: &Next| -> NextScore {
        let (immediate, per_future) =
            evaluate_candidate(factory, objectives, state, &next.inputs, &future_inputs);
        finish(immediate, per_future)
    };

    match jobs {
        Some(jobs) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .expect("failed to build rayon threadpool");
            pool.install(|| nexts.par_iter().map(score_one).collect())
        }
        None => nexts.par_iter().map(score_one).collect(),
    }
}

fn score_via_helper<F: EmulatorFactory>(
    pool: &HelperPool,
    factory: &F,
    objectives: &WeightedObjectives,
    state: &[u8],
    next: &Next,
    future_inputs: &[&[u8]],
) -> NextScore {
    let request = EvalRequest {
        state: state.to_vec(),
        next_inputs: next.inputs.clone(),
        futures: future_inputs.iter().map(|f| f.to_vec()).collect(),
    };

    if let Some(response) = pool.evaluate(&request) {
        // Partial vectors are useless; a short or long response means the
        // helper disagrees about the round shape.
        if response.per_future.len() == future_inputs.len() {
            let mut per_future = vec![0.0; future_inputs.len()];
            for (idx, value) in response.per_future.into_iter().enumerate() {
                if idx < per_future.len() {
                    per_future[idx] = value;
                }
            }
            return finish(response.immediate, per_future);
        }
        warn!(
            got = response.per_future.len(),
            want = future_inputs.len(),
            "helper returned a partial future vector, re-executing locally"
        );
    }

    let (immediate, per_future) =
        evaluate_candidate(factory, objectives, state, &next.inputs, future_inputs);
    finish(immediate, per_future)
}

fn finish(immediate: f64, per_future: Vec<f64>) -> NextScore {
    // Fixed index-order reduction; do not replace with a parallel sum.
    let futsum: f64 = per_future.iter().sum();
    let mut worst = f64::INFINITY;
    let mut best = f64::NEG_INFINITY;
    for &value in &per_future {
        if value < worst {
            worst = value;
        }
        if value > best {
            best = value;
        }
    }
    if per_future.is_empty() {
        worst = 0.0;
        best = 0.0;
    }
    NextScore {
        immediate,
        futsum,
        per_future,
        worst_future: worst,
        best_future: best,
    }
}
