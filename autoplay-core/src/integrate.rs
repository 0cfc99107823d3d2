use crate::emulator::Emulator;
use crate::objectives::WeightedObjectives;

/// Integrate objective magnitudes along `inputs` starting from `start`.
/// Returns the running sum and the terminal memory snapshot. Pure given
/// `(start, inputs)`; the emulator is just scratch space.
pub fn score_integral<E: Emulator>(
    emu: &mut E,
    objectives: &WeightedObjectives,
    start: &[u8],
    inputs: &[u8],
) -> (f64, Vec<u8>) {
    emu.load(start);
    let mut memory = emu.memory();
    let mut sum = 0.0;
    for &input in inputs {
        let next = emu.step(input);
        sum += objectives.evaluate_magnitude(&memory, &next);
        memory = next;
    }
    (sum, memory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::BUTTON_RIGHT;
    use crate::sim::{demo_objectives, MicroRig};

    #[test]
    fn integral_matches_per_step_sum() {
        let objectives = demo_objectives();
        let mut rig = MicroRig::new();
        let start = rig.save();
        let inputs = vec![BUTTON_RIGHT; 40];

        let (sum, terminal) = score_integral(&mut rig, &objectives, &start, &inputs);

        let mut manual = MicroRig::new();
        manual.load(&start);
        let mut memory = manual.memory();
        let mut expected = 0.0;
        for &input in &inputs {
            let next = manual.step(input);
            expected += objectives.evaluate_magnitude(&memory, &next);
            memory = next;
        }
        assert_eq!(sum, expected);
        assert_eq!(terminal, memory);
    }

    #[test]
    fn empty_path_integrates_to_zero() {
        let objectives = demo_objectives();
        let mut rig = MicroRig::new();
        let start = rig.save();
        let (sum, terminal) = score_integral(&mut rig, &objectives, &start, &[]);
        assert_eq!(sum, 0.0);
        assert_eq!(terminal, rig.memory());
    }

    #[test]
    fn integral_is_pure_given_start_and_inputs() {
        let objectives = demo_objectives();
        let mut rig = MicroRig::new();
        let start = rig.save();
        let inputs: Vec<u8> = (0..60).map(|i| if i % 3 == 0 { BUTTON_RIGHT } else { 0 }).collect();

        let first = score_integral(&mut rig, &objectives, &start, &inputs);
        // The rig is now somewhere else entirely; the integral must not care.
        let second = score_integral(&mut rig, &objectives, &start, &inputs);
        assert_eq!(first, second);
    }
}
