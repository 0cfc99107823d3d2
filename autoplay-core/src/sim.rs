//! MicroRig, the built-in reference machine. A tiny side-scroller with a
//! 16-byte memory window: walk right to make progress across screens, jump
//! over a patrolling hazard, grab one coin per screen. Every register lives
//! in the memory window itself, so a savestate is exactly the memory and the
//! whole machine is a pure function of (state, input).

use crate::emulator::Emulator;
use crate::input::{BUTTON_A, BUTTON_LEFT, BUTTON_RIGHT};
use crate::motifs::Motif;
use crate::objectives::{Objective, WeightedObjectives, TOKEN_DECREASING};

pub const MEM_X: usize = 0;
pub const MEM_SCREEN: usize = 1;
pub const MEM_SCORE: usize = 2;
pub const MEM_LIVES: usize = 3;
pub const MEM_TIMER: usize = 4;
pub const MEM_HAZARD_X: usize = 5;
pub const MEM_COIN_X: usize = 6;
pub const MEM_COIN_TAKEN: usize = 7;
pub const MEM_Y: usize = 8;
pub const MEM_VY: usize = 9;

pub const MEMORY_LEN: usize = 16;

const STARTING_X: u8 = 16;
const STARTING_LIVES: u8 = 3;
const WALK_SPEED: u8 = 2;
const SCREEN_EDGE: u8 = 248;
const RESPAWN_X: u8 = 8;
const JUMP_VELOCITY: i8 = 6;
const MAX_HEIGHT: i16 = 64;
const HAZARD_KNOCKBACK: u8 = 32;

#[derive(Clone, Debug)]
pub struct MicroRig {
    mem: [u8; MEMORY_LEN],
}

impl MicroRig {
    pub fn new() -> Self {
        let mut mem = [0u8; MEMORY_LEN];
        mem[MEM_X] = STARTING_X;
        mem[MEM_LIVES] = STARTING_LIVES;
        mem[MEM_HAZARD_X] = hazard_x(0);
        mem[MEM_COIN_X] = coin_x(0);
        Self { mem }
    }
}

impl Default for MicroRig {
    fn default() -> Self {
        Self::new()
    }
}

fn hazard_x(timer: u8) -> u8 {
    64 + ((timer as u16 * 5) % 128) as u8
}

fn coin_x(screen: u8) -> u8 {
    40 + ((screen as u16 * 53 + 89) % 176) as u8
}

impl Emulator for MicroRig {
    fn save(&mut self) -> Vec<u8> {
        self.mem.to_vec()
    }

    fn load(&mut self, state: &[u8]) {
        assert_eq!(state.len(), MEMORY_LEN, "savestate has wrong length");
        self.mem.copy_from_slice(state);
    }

    fn step(&mut self, input: u8) -> Vec<u8> {
        let mem = &mut self.mem;
        let timer = mem[MEM_TIMER].wrapping_add(1);
        mem[MEM_TIMER] = timer;

        // Horizontal walk and screen advance.
        let mut x = mem[MEM_X];
        if input & BUTTON_RIGHT != 0 {
            x = x.saturating_add(WALK_SPEED);
        }
        if input & BUTTON_LEFT != 0 {
            x = x.saturating_sub(WALK_SPEED);
        }
        if x >= SCREEN_EDGE {
            x = RESPAWN_X;
            mem[MEM_SCREEN] = mem[MEM_SCREEN].saturating_add(1);
            mem[MEM_COIN_TAKEN] = 0;
        }

        // Vertical: fixed jump arc, ground at y == 0.
        let mut vy = mem[MEM_VY] as i8;
        let y = mem[MEM_Y];
        if input & BUTTON_A != 0 && y == 0 {
            vy = JUMP_VELOCITY;
        }
        let new_y = (y as i16 + vy as i16).clamp(0, MAX_HEIGHT) as u8;
        vy = if new_y > 0 { vy.saturating_sub(1) } else { 0 };
        mem[MEM_Y] = new_y;
        mem[MEM_VY] = vy as u8;

        // Patrolling hazard; grounded contact costs a life and knocks back.
        let hazard = hazard_x(timer);
        mem[MEM_HAZARD_X] = hazard;
        if mem[MEM_LIVES] > 0 && new_y < 2 && x.abs_diff(hazard) < 4 {
            mem[MEM_LIVES] -= 1;
            x = x.saturating_sub(HAZARD_KNOCKBACK);
        }

        // One airborne coin per screen.
        let coin = coin_x(mem[MEM_SCREEN]);
        mem[MEM_COIN_X] = coin;
        if mem[MEM_COIN_TAKEN] == 0 && new_y >= 4 && x.abs_diff(coin) <= 2 {
            mem[MEM_SCORE] = mem[MEM_SCORE].saturating_add(1);
            mem[MEM_COIN_TAKEN] = 1;
        }

        mem[MEM_X] = x;
        self.mem.to_vec()
    }

    fn memory(&self) -> Vec<u8> {
        self.mem.to_vec()
    }
}

/// Objectives a mining pass over example play of the rig would produce:
/// progress (screen, then x, lexicographic), score, lives, and a small time
/// cost so stalling scores negative.
pub fn demo_objectives() -> WeightedObjectives {
    WeightedObjectives::new(vec![
        Objective {
            weight: 4.0,
            tokens: vec![MEM_SCREEN as u32, MEM_X as u32],
        },
        Objective {
            weight: 2.0,
            tokens: vec![MEM_SCORE as u32],
        },
        Objective {
            weight: 3.0,
            tokens: vec![MEM_LIVES as u32],
        },
        Objective {
            weight: 0.05,
            tokens: vec![MEM_TIMER as u32 | TOKEN_DECREASING],
        },
    ])
}

/// Motifs matching how a human plays the rig: mostly walking right, some
/// jump-while-running patterns, a little of everything else.
pub fn demo_motifs() -> Vec<Motif> {
    let run = BUTTON_RIGHT;
    let jump_run = BUTTON_RIGHT | BUTTON_A;
    vec![
        Motif {
            inputs: vec![run; 10],
            weight: 3.0,
        },
        Motif {
            inputs: vec![jump_run, run, run, run, jump_run, run, run, run, run, run],
            weight: 2.0,
        },
        Motif {
            inputs: vec![run, run, jump_run, jump_run, run, run, run, jump_run, run, run],
            weight: 1.5,
        },
        Motif {
            inputs: vec![BUTTON_A, 0, 0, 0, 0, BUTTON_A, 0, 0, 0, 0],
            weight: 1.0,
        },
        Motif {
            inputs: vec![
                BUTTON_LEFT,
                BUTTON_LEFT,
                BUTTON_LEFT,
                BUTTON_LEFT,
                BUTTON_LEFT,
                run,
                run,
                run,
                run,
                run,
            ],
            weight: 0.8,
        },
        Motif {
            inputs: vec![0; 10],
            weight: 0.5,
        },
        Motif {
            inputs: vec![BUTTON_LEFT; 10],
            weight: 0.5,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_input_traces_are_identical() {
        let mut a = MicroRig::new();
        let mut b = MicroRig::new();
        for frame in 0..200u32 {
            let input = match frame % 7 {
                0 | 1 | 2 => BUTTON_RIGHT,
                3 => BUTTON_RIGHT | BUTTON_A,
                4 => BUTTON_A,
                _ => 0,
            };
            assert_eq!(a.step(input), b.step(input));
        }
    }

    #[test]
    fn savestate_round_trip_preserves_behavior() {
        let mut rig = MicroRig::new();
        for _ in 0..37 {
            rig.step(BUTTON_RIGHT | BUTTON_A);
        }
        let state = rig.save();

        let mut restored = MicroRig::new();
        restored.load(&state);
        for _ in 0..50 {
            assert_eq!(rig.step(BUTTON_RIGHT), restored.step(BUTTON_RIGHT));
        }
    }

    #[test]
    fn idle_frames_change_only_the_clock() {
        let mut rig = MicroRig::new();
        let before = rig.memory();
        for _ in 0..30 {
            rig.step(0);
        }
        let after = rig.memory();
        assert_eq!(after[MEM_X], before[MEM_X]);
        assert_eq!(after[MEM_Y], 0);
        assert_eq!(after[MEM_LIVES], STARTING_LIVES);
        assert_eq!(after[MEM_SCORE], 0);
        assert_eq!(after[MEM_TIMER], 30);
    }

    #[test]
    fn walking_right_clears_the_start_area_safely() {
        // The hazard patrols x in [64, 191]; ten frames of walking from the
        // start never reaches it.
        let mut rig = MicroRig::new();
        for _ in 0..10 {
            rig.step(BUTTON_RIGHT);
        }
        let mem = rig.memory();
        assert_eq!(mem[MEM_X], STARTING_X + 10 * WALK_SPEED);
        assert_eq!(mem[MEM_LIVES], STARTING_LIVES);
    }

    #[test]
    fn crossing_the_edge_advances_the_screen() {
        let mut rig = MicroRig::new();
        let mut state = rig.save();
        state[MEM_X] = SCREEN_EDGE - WALK_SPEED;
        state[MEM_COIN_TAKEN] = 1;
        rig.load(&state);

        let mem = rig.step(BUTTON_RIGHT);
        assert_eq!(mem[MEM_X], RESPAWN_X);
        assert_eq!(mem[MEM_SCREEN], 1);
        assert_eq!(mem[MEM_COIN_TAKEN], 0);
    }

    #[test]
    fn jump_arc_returns_to_ground() {
        let mut rig = MicroRig::new();
        let mem = rig.step(BUTTON_A);
        assert!(mem[MEM_Y] > 0);
        for _ in 0..20 {
            rig.step(0);
        }
        assert_eq!(rig.memory()[MEM_Y], 0);
    }

    #[test]
    fn grounded_hazard_contact_costs_a_life() {
        // timer becomes 84 on this step, putting the hazard at exactly 100.
        let mut rig = MicroRig::new();
        let mut state = rig.save();
        state[MEM_X] = 100;
        state[MEM_TIMER] = 83;
        rig.load(&state);

        let mem = rig.step(0);
        assert_eq!(mem[MEM_HAZARD_X], 100);
        assert_eq!(mem[MEM_LIVES], STARTING_LIVES - 1);
        assert_eq!(mem[MEM_X], 100 - HAZARD_KNOCKBACK);
    }

    #[test]
    fn airborne_coin_contact_scores_once() {
        // Screen 0 places the coin at x = 129.
        let mut rig = MicroRig::new();
        let mut state = rig.save();
        state[MEM_X] = 129;
        state[MEM_Y] = 10;
        rig.load(&state);

        let mem = rig.step(0);
        assert_eq!(mem[MEM_COIN_X], 129);
        assert_eq!(mem[MEM_SCORE], 1);
        assert_eq!(mem[MEM_COIN_TAKEN], 1);

        let again = rig.step(0);
        assert_eq!(again[MEM_SCORE], 1);
    }

    #[test]
    fn demo_objectives_reward_progress() {
        let objectives = demo_objectives();
        let mut rig = MicroRig::new();
        let before = rig.memory();
        let after = rig.step(BUTTON_RIGHT);
        // +2 on x under the progress objective, -1 tick on the clock.
        assert!(objectives.evaluate_magnitude(&before, &after) > 0.0);
    }
}
