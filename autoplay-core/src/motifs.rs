//! Weighted motif store. Motifs are short input sequences mined from example
//! play; the engine samples them as building blocks and nudges their weights
//! toward whatever keeps scoring.

use tracing::warn;

use crate::error::MotifsError;
use crate::rng::ArcFour;

#[derive(Clone, Debug, PartialEq)]
pub struct Motif {
    pub inputs: Vec<u8>,
    pub weight: f64,
}

/// Parse the motifs text format: `<weight> <byte> <byte>...` per line,
/// bytes decimal or `0x`-hex, `#` comments allowed.
pub fn parse_motifs(text: &str) -> Result<Vec<Motif>, MotifsError> {
    let mut motifs = Vec::new();

    for (zero_line, raw) in text.lines().enumerate() {
        let line = zero_line + 1;
        let body = raw.split('#').next().unwrap_or("").trim();
        if body.is_empty() {
            continue;
        }

        let mut fields = body.split_whitespace();
        let weight_text = fields.next().expect("non-empty line has a first field");
        let weight: f64 = weight_text.parse().map_err(|_| MotifsError::BadWeight {
            line,
            text: weight_text.to_string(),
        })?;
        if weight <= 0.0 || !weight.is_finite() {
            return Err(MotifsError::NonPositiveWeight { line });
        }

        let mut inputs = Vec::new();
        for field in fields {
            let parsed = if let Some(hex) = field.strip_prefix("0x") {
                u8::from_str_radix(hex, 16).ok()
            } else {
                field.parse::<u8>().ok()
            };
            let byte = parsed.ok_or_else(|| MotifsError::BadInput {
                line,
                text: field.to_string(),
            })?;
            inputs.push(byte);
        }
        if inputs.is_empty() {
            return Err(MotifsError::MissingInputs { line });
        }

        motifs.push(Motif { inputs, weight });
    }

    if motifs.is_empty() {
        return Err(MotifsError::Empty);
    }
    Ok(motifs)
}

#[derive(Clone, Debug)]
pub struct MotifStore {
    motifs: Vec<Motif>,
    alpha: f64,
    min_frac: f64,
    max_frac: f64,
    underflow_logged: bool,
}

// Clipping is iterative because the bounds move with the total; it converges
// geometrically, so a fixed cap is plenty.
const MAX_CLIP_ITERATIONS: usize = 100;
const CLIP_EPSILON: f64 = 1e-12;

impl MotifStore {
    /// `alpha` must lie in (0, 1); `min_frac <= max_frac` as fractions of the
    /// total weight.
    pub fn new(motifs: Vec<Motif>, alpha: f64, min_frac: f64, max_frac: f64) -> Self {
        debug_assert!(alpha > 0.0 && alpha < 1.0);
        debug_assert!(min_frac >= 0.0 && min_frac <= max_frac);
        Self {
            motifs,
            alpha,
            min_frac,
            max_frac,
            underflow_logged: false,
        }
    }

    pub fn len(&self) -> usize {
        self.motifs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motifs.is_empty()
    }

    pub fn motifs(&self) -> &[Motif] {
        &self.motifs
    }

    pub fn total_weight(&self) -> f64 {
        self.motifs.iter().map(|m| m.weight).sum()
    }

    /// Draw a motif id. Weighted draws are proportional to current weights;
    /// uniform draws ignore them. Reproducible given the RNG state.
    pub fn sample(&self, rng: &mut ArcFour, weighted: bool) -> usize {
        debug_assert!(!self.motifs.is_empty());
        if !weighted {
            return rng.next_below(self.motifs.len());
        }

        let total = self.total_weight();
        let mut remaining = rng.next_f64_unit() * total;
        for (id, motif) in self.motifs.iter().enumerate() {
            remaining -= motif.weight;
            if remaining < 0.0 {
                return id;
            }
        }
        self.motifs.len() - 1
    }

    pub fn inputs(&self, id: usize) -> &[u8] {
        &self.motifs[id].inputs
    }

    /// Adjust one motif's weight from the normalized immediate score of a
    /// commit it produced, then re-clip every weight into
    /// `[min_frac * W, max_frac * W]`.
    pub fn reweight(&mut self, id: usize, delta_norm: f64) {
        if id >= self.motifs.len() || delta_norm == 0.0 || delta_norm.is_nan() {
            return;
        }
        if delta_norm > 0.0 {
            self.motifs[id].weight /= self.alpha;
        } else {
            self.motifs[id].weight *= self.alpha;
        }
        self.clip_weights();
    }

    /// Reset the once-per-round underflow log gate.
    pub fn begin_round(&mut self) {
        self.underflow_logged = false;
    }

    /// Weight table for snapshots: `(weight, inputs)` per motif.
    pub fn export_weights(&self) -> Vec<(f64, Vec<u8>)> {
        self.motifs
            .iter()
            .map(|m| (m.weight, m.inputs.clone()))
            .collect()
    }

    /// Replace the motif table from a snapshot export. The snapshot is
    /// authoritative; a motif's identity is its input bytes.
    pub fn restore_weights(&mut self, weights: Vec<(f64, Vec<u8>)>) {
        self.motifs = weights
            .into_iter()
            .map(|(weight, inputs)| Motif { inputs, weight })
            .collect();
    }

    fn clip_weights(&mut self) {
        for _ in 0..MAX_CLIP_ITERATIONS {
            let total = self.total_weight();
            if total <= 0.0 {
                return;
            }
            let lo = self.min_frac * total;
            let hi = self.max_frac * total;

            let mut moved = 0.0f64;
            for motif in &mut self.motifs {
                let clipped = motif.weight.clamp(lo, hi);
                if clipped > motif.weight && !self.underflow_logged {
                    warn!(weight = motif.weight, floor = lo, "motif weight underflow, clipping");
                    self.underflow_logged = true;
                }
                moved = moved.max((clipped - motif.weight).abs());
                motif.weight = clipped;
            }
            if moved < CLIP_EPSILON {
                return;
            }
        }
    }
}
