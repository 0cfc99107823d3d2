//! TryImprove: generate replacements for the span of movie committed since a
//! checkpoint, keep the ones that provably do better, and let the normal
//! selection round choose among them. Four candidate families: fresh motif
//! material (RANDOM), mirrored/reversed variants (OPPOSITES), button-masked
//! variants (ABLATION), and shortened variants (CHOP).

use std::collections::HashSet;

use autoplay_core::emulator::Emulator;
use autoplay_core::input::{dualize_all, reverse_span};
use autoplay_core::integrate::score_integral;
use autoplay_core::motifs::MotifStore;
use autoplay_core::objectives::WeightedObjectives;
use autoplay_core::rng::ArcFour;
use tracing::debug;

use crate::config::SearchParams;
use crate::nexts::input_hash;

#[derive(Clone, Debug)]
pub struct Replacement {
    pub inputs: Vec<u8>,
    pub strategy: &'static str,
    pub score: f64,
}

/// The acceptance rule: a candidate replaces a span only when its integral
/// does not regress, is positive in its own right, and its endpoint beats
/// the old endpoint. Returns the ranking score when all three hold.
pub fn accept_score(end_integral: f64, new_integral: f64, n_minus_e: f64) -> Option<f64> {
    if new_integral >= end_integral && new_integral > 0.0 && n_minus_e > 0.0 {
        Some((new_integral - end_integral) + n_minus_e)
    } else {
        None
    }
}

/// Generate, test, and rank replacement candidates for `improveme` played
/// from `checkpoint_state`. The emulator is scratch space; every draw comes
/// from `rng`, so a fixed RNG state pins the whole candidate set.
pub fn propose_replacements<E: Emulator>(
    emu: &mut E,
    objectives: &WeightedObjectives,
    checkpoint_state: &[u8],
    improveme: &[u8],
    motifs: &MotifStore,
    rng: &mut ArcFour,
    params: &SearchParams,
) -> Vec<Replacement> {
    if improveme.is_empty() {
        return Vec::new();
    }

    let (end_integral, end_memory) = score_integral(emu, objectives, checkpoint_state, improveme);

    let mut seen = HashSet::new();
    seen.insert(input_hash(improveme));
    let mut candidates: Vec<(Vec<u8>, &'static str)> = Vec::new();
    let mut push = |candidates: &mut Vec<(Vec<u8>, &'static str)>,
                    inputs: Vec<u8>,
                    strategy: &'static str| {
        if !inputs.is_empty() && seen.insert(input_hash(&inputs)) {
            candidates.push((inputs, strategy));
        }
    };

    for _ in 0..params.random_candidates {
        push(&mut candidates, random_candidate(improveme.len(), motifs, rng), "random");
    }

    for inputs in opposite_candidates(improveme, rng, params.opposite_span_candidates) {
        push(&mut candidates, inputs, "opposite");
    }

    for _ in 0..params.ablation_candidates {
        if let Some(inputs) = ablation_candidate(improveme, rng, params.ablation_mask_p) {
            push(&mut candidates, inputs, "ablate");
        }
    }

    for _ in 0..params.chop_candidates {
        if let Some(inputs) =
            chop_candidate(emu, objectives, checkpoint_state, improveme, end_integral, &end_memory, rng)
        {
            push(&mut candidates, inputs, "chop");
        }
    }

    let mut accepted = Vec::new();
    for (inputs, strategy) in candidates {
        let (new_integral, new_memory) =
            score_integral(emu, objectives, checkpoint_state, &inputs);
        let n_minus_e = objectives.evaluate_magnitude(&end_memory, &new_memory);
        if let Some(score) = accept_score(end_integral, new_integral, n_minus_e) {
            accepted.push(Replacement {
                inputs,
                strategy,
                score,
            });
        }
    }

    accepted.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    debug!(
        span = improveme.len(),
        accepted = accepted.len(),
        end_integral,
        "replacement candidates tested"
    );
    accepted
}

/// RANDOM: motif material of the same length as the span.
fn random_candidate(len: usize, motifs: &MotifStore, rng: &mut ArcFour) -> Vec<u8> {
    let mut inputs = Vec::with_capacity(len);
    while inputs.len() < len {
        let motif = motifs.sample(rng, true);
        inputs.extend_from_slice(motifs.inputs(motif));
    }
    inputs.truncate(len);
    inputs
}

/// OPPOSITES: three whole-sequence variants plus random-span dualizations,
/// each keeping its span reversed half the time.
fn opposite_candidates(improveme: &[u8], rng: &mut ArcFour, span_count: usize) -> Vec<Vec<u8>> {
    let mut out = Vec::with_capacity(3 + span_count);

    let mut both = dualize_all(improveme);
    both.reverse();
    out.push(both);
    out.push(dualize_all(improveme));
    let mut reversed = improveme.to_vec();
    reversed.reverse();
    out.push(reversed);

    for _ in 0..span_count {
        let mut variant = improveme.to_vec();
        let start = rng.next_below(variant.len());
        let len = 1 + rng.next_below(variant.len() - start);
        let dual = dualize_all(&variant[start..start + len]);
        variant[start..start + len].copy_from_slice(&dual);
        if rng.next_f64_unit() < 0.5 {
            reverse_span(&mut variant, start, len);
        }
        out.push(variant);
    }
    out
}

/// ABLATION: clear each button with probability `mask_p`; the identity mask
/// would be a no-op candidate, so it is skipped.
fn ablation_candidate(improveme: &[u8], rng: &mut ArcFour, mask_p: f64) -> Option<Vec<u8>> {
    let mut mask = 0u8;
    for bit in 0..8 {
        if rng.next_f64_unit() >= mask_p {
            mask |= 1 << bit;
        }
    }
    if mask == 0xFF {
        return None;
    }
    Some(improveme.iter().map(|&input| input & mask).collect())
}

// CHOP keeps deleting spans while the result still passes acceptance against
// the original endpoints with a better score; attempts per round and total
// rounds are bounded so a flat landscape terminates.
const CHOP_ATTEMPTS: usize = 8;
const CHOP_ROUNDS: usize = 32;

fn chop_candidate<E: Emulator>(
    emu: &mut E,
    objectives: &WeightedObjectives,
    checkpoint_state: &[u8],
    improveme: &[u8],
    end_integral: f64,
    end_memory: &[u8],
    rng: &mut ArcFour,
) -> Option<Vec<u8>> {
    let mut current = improveme.to_vec();
    let mut current_score: Option<f64> = None;

    for _ in 0..CHOP_ROUNDS {
        let mut improved = false;
        for _ in 0..CHOP_ATTEMPTS {
            if current.len() <= 1 {
                break;
            }
            // Span length biased short: floor(len * U^2).
            let u = rng.next_f64_unit();
            let span = ((current.len() as f64) * u * u) as usize;
            if span == 0 || span >= current.len() {
                continue;
            }
            let start = rng.next_below(current.len() - span + 1);

            let mut candidate = current.clone();
            candidate.drain(start..start + span);

            let (new_integral, new_memory) =
                score_integral(emu, objectives, checkpoint_state, &candidate);
            let n_minus_e = objectives.evaluate_magnitude(end_memory, &new_memory);
            if let Some(score) = accept_score(end_integral, new_integral, n_minus_e) {
                if current_score.map_or(true, |best| score > best) {
                    current = candidate;
                    current_score = Some(score);
                    improved = true;
                    break;
                }
            }
        }
        if !improved {
            break;
        }
    }

    current_score.map(|_| current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoplay_core::input::{BUTTON_A, BUTTON_B, BUTTON_LEFT, BUTTON_RIGHT};
    use autoplay_core::motifs::Motif;
    use autoplay_core::sim::{demo_motifs, demo_objectives, MicroRig};

    #[test]
    fn acceptance_matches_the_rule() {
        // Better integral and better endpoint: accepted, score is the sum of
        // both margins.
        assert_eq!(accept_score(1.0, 1.5, 0.3), Some(0.8));
        // Worse endpoint kills it no matter the integral.
        assert_eq!(accept_score(1.0, 2.0, -0.1), None);
        // Integral regression kills it.
        assert_eq!(accept_score(1.0, 0.9, 0.5), None);
        // A non-positive integral kills it even when it does not regress.
        assert_eq!(accept_score(-2.0, -1.0, 0.5), None);
        assert_eq!(accept_score(0.0, 0.0, 0.5), None);
    }

    #[test]
    fn opposites_include_the_three_whole_sequence_variants() {
        let improveme = vec![BUTTON_LEFT, BUTTON_LEFT, BUTTON_A];
        let mut rng = ArcFour::new(b"opposites");
        let variants = opposite_candidates(&improveme, &mut rng, 2);
        assert_eq!(variants.len(), 5);
        // dualize + reverse
        assert_eq!(variants[0], vec![BUTTON_B, BUTTON_RIGHT, BUTTON_RIGHT]);
        // dualize only
        assert_eq!(variants[1], vec![BUTTON_RIGHT, BUTTON_RIGHT, BUTTON_B]);
        // reverse only
        assert_eq!(variants[2], vec![BUTTON_A, BUTTON_LEFT, BUTTON_LEFT]);
    }

    #[test]
    fn ablation_never_returns_the_identity_mask() {
        let improveme = vec![0xFFu8; 20];
        let mut rng = ArcFour::new(b"ablation");
        for _ in 0..100 {
            if let Some(candidate) = ablation_candidate(&improveme, &mut rng, 0.5) {
                assert!(candidate.iter().any(|&b| b != 0xFF));
                assert_eq!(candidate.len(), improveme.len());
            }
        }
    }

    #[test]
    fn ablation_masks_uniformly_across_frames() {
        let improveme = vec![0b1010_1010u8; 8];
        let mut rng = ArcFour::new(b"mask");
        let candidate = loop {
            if let Some(c) = ablation_candidate(&improveme, &mut rng, 0.5) {
                break c;
            }
        };
        // Same mask on every frame means every output byte is identical.
        assert!(candidate.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn walking_replacement_beats_an_idle_span() {
        // The committed span does nothing; walking right from the start area
        // is a strict improvement, so RANDOM material must surface something.
        let objectives = demo_objectives();
        let motifs = MotifStore::new(
            vec![Motif {
                inputs: vec![BUTTON_RIGHT; 10],
                weight: 1.0,
            }],
            0.8,
            0.0001,
            0.9,
        );
        let mut rig = MicroRig::new();
        let checkpoint_state = rig.save();
        let improveme = vec![0u8; 20];

        let mut rng = ArcFour::new(b"improve");
        let params = SearchParams::default();
        let accepted = propose_replacements(
            &mut rig,
            &objectives,
            &checkpoint_state,
            &improveme,
            &motifs,
            &mut rng,
            &params,
        );

        assert!(!accepted.is_empty());
        // Ranked descending.
        for pair in accepted.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(accepted[0].inputs, vec![BUTTON_RIGHT; 20]);
    }

    #[test]
    fn hopeless_spans_yield_no_replacements() {
        // Only idle motifs are available and the span already walks right:
        // nothing on offer can pass the endpoint test.
        let objectives = demo_objectives();
        let motifs = MotifStore::new(
            vec![Motif {
                inputs: vec![0u8; 10],
                weight: 1.0,
            }],
            0.8,
            0.0001,
            0.9,
        );
        let mut rig = MicroRig::new();
        let checkpoint_state = rig.save();
        let improveme = vec![BUTTON_RIGHT; 20];

        let mut rng = ArcFour::new(b"hopeless");
        let mut params = SearchParams::default();
        params.opposite_span_candidates = 0;
        params.ablation_candidates = 0;
        params.chop_candidates = 0;
        let accepted = propose_replacements(
            &mut rig,
            &objectives,
            &checkpoint_state,
            &improveme,
            &motifs,
            &mut rng,
            &params,
        );
        assert!(accepted.is_empty());
    }
}
