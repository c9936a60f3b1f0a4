//! Per-step flow solver for the compressible-column water model.
//!
//! Every step reads volumes from the previous state only and accumulates the
//! pending changes in a diff buffer, which is committed once all cells were
//! visited. Cells are visited x-major, then y, then z, and each cell pushes
//! liquid through its faces in a fixed order: down, north, south, east, west,
//! up.

use log::trace;
use tidepool_core::{
    CellCoord, FlowDirection, FlowMask, FLOW_SPEED, MAX_COMPRESSION, MAX_FLOW, MAX_WATER,
    MIN_FLOW, MIN_WATER,
};

use crate::{lattice::Lattice, settle::SettleBook};

/// Horizontal faces in processing order, each with the divisor applied to the
/// volume difference across it.
const HORIZONTAL_SPREAD: [(FlowDirection, f32); 4] = [
    (FlowDirection::North, 6.0),
    (FlowDirection::South, 5.0),
    (FlowDirection::East, 4.0),
    (FlowDirection::West, 4.0),
];

/// Volume the lower of two stacked cells holds once their combined volume
/// `total` has been shared between them.
///
/// Below one full cell the lower cell takes everything. Between one cell and
/// two cells plus the compression headroom the lower cell absorbs a smoothly
/// increasing surplus, and beyond that the pair splits evenly with the lower
/// cell keeping the compression headroom.
pub(crate) fn compressed_lower_volume(total: f32) -> f32 {
    if total <= MAX_WATER {
        MAX_WATER
    } else if total < 2.0 * MAX_WATER + MAX_COMPRESSION {
        (MAX_WATER * MAX_WATER + total * MAX_COMPRESSION) / (MAX_WATER + MAX_COMPRESSION)
    } else {
        (total + MAX_COMPRESSION) / 2.0
    }
}

/// Volume accounting collected while a step executes.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct StepTally {
    pub(crate) processed: u32,
    pub(crate) moved: f32,
    pub(crate) discarded: f32,
    pub(crate) floored: f32,
}

/// Scratch buffers reused across steps.
#[derive(Clone, Debug)]
pub(crate) struct FlowSolver {
    diff: Vec<f32>,
    lifted: Vec<bool>,
    directions: Vec<FlowMask>,
}

impl FlowSolver {
    pub(crate) fn new(cell_count: usize) -> Self {
        Self {
            diff: vec![0.0; cell_count],
            lifted: vec![false; cell_count],
            directions: vec![FlowMask::EMPTY; cell_count],
        }
    }

    /// Inbound flow directions recorded during the most recent step.
    pub(crate) fn directions(&self) -> &[FlowMask] {
        &self.directions
    }

    pub(crate) fn clear(&mut self) {
        self.diff.fill(0.0);
        self.lifted.fill(false);
        self.directions.fill(FlowMask::EMPTY);
    }

    /// Advances `water` by one step and commits the result in place.
    pub(crate) fn step(
        &mut self,
        lattice: &Lattice,
        water: &mut [f32],
        settle: &mut SettleBook,
    ) -> StepTally {
        debug_assert_eq!(water.len(), self.diff.len());
        self.clear();

        let size = lattice.size();
        let mut tally = StepTally::default();
        for x in 0..size.width() {
            for y in 0..size.height() {
                for z in 0..size.depth() {
                    let cell = CellCoord::new(x, y, z);
                    let index = lattice.expect_index(cell);
                    let amount = water[index];
                    if amount == 0.0 || settle.is_settled(index) {
                        continue;
                    }

                    if amount < MIN_WATER {
                        let lift = MIN_WATER - amount;
                        self.diff[index] += lift;
                        self.lifted[index] = true;
                        tally.floored += lift;
                        continue;
                    }

                    tally.processed += 1;
                    self.spread(lattice, water, settle, cell, index, &mut tally);
                }
            }
        }

        self.commit(water, settle, &mut tally);
        tally
    }

    fn spread(
        &mut self,
        lattice: &Lattice,
        water: &[f32],
        settle: &mut SettleBook,
        cell: CellCoord,
        index: usize,
        tally: &mut StepTally,
    ) {
        let start = water[index];
        let mut remaining = start;

        if let Some(below) = lattice.open_neighbor(cell, FlowDirection::Down) {
            let below_amount = water[below];
            let mut flow = compressed_lower_volume(remaining + below_amount) - below_amount;
            if below_amount > 0.0 && flow > MIN_FLOW {
                flow *= FLOW_SPEED;
            }
            self.transfer(index, below, FlowDirection::Down, flow, &mut remaining, settle, tally);
        }
        if self.drain_residual(index, remaining, tally) {
            return;
        }

        for (direction, divisor) in HORIZONTAL_SPREAD {
            let Some(neighbor) = lattice.open_neighbor(cell, direction) else {
                continue;
            };
            let mut flow = (remaining - water[neighbor]) / divisor;
            if flow > MIN_FLOW {
                flow *= FLOW_SPEED;
            }
            self.transfer(index, neighbor, direction, flow, &mut remaining, settle, tally);
            if self.drain_residual(index, remaining, tally) {
                return;
            }
        }

        if let Some(above) = lattice.open_neighbor(cell, FlowDirection::Up) {
            let above_amount = water[above];
            let mut flow = remaining - compressed_lower_volume(remaining + above_amount);
            if above_amount > 0.0 && flow > MIN_FLOW {
                flow *= FLOW_SPEED;
            }
            self.transfer(index, above, FlowDirection::Up, flow, &mut remaining, settle, tally);
            if self.drain_residual(index, remaining, tally) {
                return;
            }
        }

        if remaining == start {
            if settle.record_idle(index) {
                self.directions[index] = FlowMask::EMPTY;
                trace!("cell {cell:?} settled holding {start}");
            }
            return;
        }

        settle.record_flow(index);
        for direction in FlowDirection::ALL {
            if let Some(neighbor) = lattice.open_neighbor(cell, direction) {
                settle.wake(neighbor);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn transfer(
        &mut self,
        from: usize,
        to: usize,
        direction: FlowDirection,
        flow: f32,
        remaining: &mut f32,
        settle: &mut SettleBook,
        tally: &mut StepTally,
    ) {
        let flow = flow.max(0.0).min(MAX_FLOW.min(*remaining));
        if flow <= 0.0 {
            return;
        }

        *remaining -= flow;
        self.diff[from] -= flow;
        self.diff[to] += flow;
        self.directions[to].insert(direction);
        settle.wake(to);
        tally.moved += flow;
    }

    /// Sinks the leftover volume once it falls below [`MIN_FLOW`].
    ///
    /// Returns `true` when the cell must stop processing further faces.
    fn drain_residual(&mut self, index: usize, remaining: f32, tally: &mut StepTally) -> bool {
        if remaining >= MIN_FLOW {
            return false;
        }
        self.diff[index] -= remaining;
        tally.discarded += remaining;
        true
    }

    fn commit(&mut self, water: &mut [f32], settle: &mut SettleBook, tally: &mut StepTally) {
        let pending = self.diff.iter().zip(&self.lifted);
        for (index, (amount, (diff, lifted))) in water.iter_mut().zip(pending).enumerate() {
            let mut next = *amount + *diff;
            if *lifted {
                // A lifted cell never commits below the floor.
                next = next.max(MIN_WATER);
            }
            if next < MIN_WATER {
                tally.discarded += next;
                *amount = 0.0;
                settle.empty(index);
            } else {
                *amount = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-5,
            "expected {expected}, found {actual}"
        );
    }

    #[test]
    fn lower_cell_takes_everything_below_capacity() {
        assert_close(compressed_lower_volume(0.3), MAX_WATER);
        assert_close(compressed_lower_volume(MAX_WATER), MAX_WATER);
    }

    #[test]
    fn lower_cell_absorbs_compression_smoothly() {
        assert_close(compressed_lower_volume(1.875), 1.175);
        assert_close(compressed_lower_volume(2.0), 1.2);
    }

    #[test]
    fn saturated_pair_splits_evenly_plus_headroom() {
        assert_close(compressed_lower_volume(4.0), 2.125);
        assert_close(
            compressed_lower_volume(2.0 * MAX_WATER + MAX_COMPRESSION),
            1.25,
        );
    }

    #[test]
    fn compression_regimes_meet_without_jumps() {
        let upper_edge = 2.0 * MAX_WATER + MAX_COMPRESSION;
        let smooth = (MAX_WATER * MAX_WATER + upper_edge * MAX_COMPRESSION)
            / (MAX_WATER + MAX_COMPRESSION);
        assert_close(smooth, compressed_lower_volume(upper_edge));
        assert_close(compressed_lower_volume(MAX_WATER + 1e-6), MAX_WATER);
    }

    #[test]
    fn horizontal_divisors_follow_processing_order() {
        let divisors: Vec<f32> = HORIZONTAL_SPREAD.iter().map(|(_, divisor)| *divisor).collect();
        assert_eq!(divisors, vec![6.0, 5.0, 4.0, 4.0]);
    }
}
