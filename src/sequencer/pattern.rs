// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Step patterns: a per-pad grid of on/off cells plus tempo.

use crate::pads::PAD_COUNT;

/// The default tempo in beats per minute.
pub const DEFAULT_BPM: u32 = 92;
pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 200;

/// The default number of steps in a pattern.
pub const DEFAULT_STEPS: usize = 16;
pub const MIN_STEPS: usize = 1;
pub const MAX_STEPS: usize = 64;

/// Clamps a tempo to [MIN_BPM, MAX_BPM].
pub fn clamp_bpm(bpm: i64) -> u32 {
    // Within u32 range after the clamp.
    bpm.clamp(i64::from(MIN_BPM), i64::from(MAX_BPM)) as u32
}

/// Clamps a step count to [MIN_STEPS, MAX_STEPS].
pub fn clamp_steps(steps: i64) -> usize {
    steps.clamp(MIN_STEPS as i64, MAX_STEPS as i64) as usize
}

/// Clamps an unsigned step count. Counts too large for i64 clamp to MAX_STEPS.
fn clamp_step_count(steps: usize) -> usize {
    clamp_steps(i64::try_from(steps).unwrap_or(i64::MAX))
}

/// The duration of one step at the given tempo. Steps are sixteenth notes.
pub fn step_duration(bpm: u32) -> f64 {
    60.0 / f64::from(bpm.max(1)) / 4.0
}

/// A sequencer pattern.
///
/// Every row has exactly `steps` cells. Mutating operations build new rows instead of
/// touching rows shared with earlier clones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    steps: usize,
    bpm: u32,
    grid: [Vec<bool>; PAD_COUNT],
}

/// Creates an all-off pattern.
pub fn create_default_pattern(steps: usize, bpm: u32) -> Pattern {
    let steps = clamp_step_count(steps);
    Pattern {
        steps,
        bpm: clamp_bpm(i64::from(bpm)),
        grid: std::array::from_fn(|_| vec![false; steps]),
    }
}

/// Returns a pattern with a new step count. The overlapping prefix of every row is kept and
/// new cells are off.
pub fn resize_pattern(pattern: &Pattern, new_steps: usize) -> Pattern {
    let steps = clamp_step_count(new_steps);
    Pattern {
        steps,
        bpm: pattern.bpm,
        grid: std::array::from_fn(|pad| {
            (0..steps)
                .map(|step| pattern.grid[pad].get(step).copied().unwrap_or(false))
                .collect()
        }),
    }
}

impl Pattern {
    /// Builds a pattern from explicit rows. Missing rows are off, long rows are cut and short
    /// rows are padded. Rows past PAD_COUNT are ignored.
    pub fn from_rows(steps: usize, bpm: u32, rows: &[Vec<bool>]) -> Pattern {
        let steps = clamp_step_count(steps);
        Pattern {
            steps,
            bpm: clamp_bpm(i64::from(bpm)),
            grid: std::array::from_fn(|pad| {
                let row = rows.get(pad).map(Vec::as_slice).unwrap_or(&[]);
                (0..steps)
                    .map(|step| row.get(step).copied().unwrap_or(false))
                    .collect()
            }),
        }
    }

    /// The number of steps in every row.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// The tempo in beats per minute.
    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// The duration of one step in seconds.
    pub fn step_duration(&self) -> f64 {
        step_duration(self.bpm)
    }

    /// All rows in pad order.
    pub fn rows(&self) -> &[Vec<bool>; PAD_COUNT] {
        &self.grid
    }

    /// A single row.
    pub fn row(&self, pad: usize) -> Option<&[bool]> {
        self.grid.get(pad).map(Vec::as_slice)
    }

    /// Gets a cell. Out-of-range coordinates are off.
    pub fn get(&self, pad: usize, step: usize) -> bool {
        self.grid
            .get(pad)
            .and_then(|row| row.get(step))
            .copied()
            .unwrap_or(false)
    }

    /// Returns a pattern with one cell set. Out-of-range coordinates return an unchanged copy.
    pub fn with_step(&self, pad: usize, step: usize, active: bool) -> Pattern {
        let mut pattern = self.clone();
        if pad < PAD_COUNT && step < self.steps {
            let mut row = self.grid[pad].clone();
            row[step] = active;
            pattern.grid[pad] = row;
        }
        pattern
    }

    /// Returns a pattern with one cell flipped.
    pub fn with_step_toggled(&self, pad: usize, step: usize) -> Pattern {
        self.with_step(pad, step, !self.get(pad, step))
    }

    /// Returns a pattern with a new tempo, clamped.
    pub fn with_bpm(&self, bpm: u32) -> Pattern {
        Pattern {
            bpm: clamp_bpm(i64::from(bpm)),
            ..self.clone()
        }
    }

    /// Returns an all-off pattern with the same length and tempo.
    pub fn cleared(&self) -> Pattern {
        create_default_pattern(self.steps, self.bpm)
    }

    /// The pads with an active cell at the step, in ascending order.
    pub fn active_pads(&self, step: usize) -> impl Iterator<Item = usize> + '_ {
        (0..PAD_COUNT).filter(move |pad| self.get(*pad, step))
    }

    /// Returns true if no cell is on.
    pub fn is_empty(&self) -> bool {
        self.grid.iter().all(|row| row.iter().all(|cell| !cell))
    }
}

impl Default for Pattern {
    fn default() -> Self {
        create_default_pattern(DEFAULT_STEPS, DEFAULT_BPM)
    }
}
