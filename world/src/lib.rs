#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative fluid grid state management for Tidepool.
//!
//! [`World`] owns every dense per-cell array of the simulated volume: the
//! open-cell mask carved from the terrain, the water amounts, the diff scratch
//! buffer, the settle bookkeeping and the inbound flow-direction masks. It is
//! mutated through [`apply`] (or the equivalent inherent methods) and read
//! through the [`query`] module.

mod flow;
mod lattice;
mod settle;

use log::{debug, warn};
use tidepool_core::{
    CellCoord, ColumnCoord, Command, DropError, Event, FlowDirection, GridSize, HeightField,
    SimulatorError, StepReport, MAX_WATER, MIN_WATER,
};

use crate::{flow::FlowSolver, lattice::Lattice, settle::SettleBook};

/// Represents the authoritative fluid grid.
#[derive(Clone, Debug)]
pub struct World {
    height_field: HeightField,
    lattice: Lattice,
    water: Vec<f32>,
    solver: FlowSolver,
    settle: SettleBook,
    step_index: u64,
}

impl World {
    /// Creates a dry grid whose open cells are carved from `height_field`.
    ///
    /// Fails with [`SimulatorError::InvalidHeightField`] when the height field
    /// does not cover exactly `size.width() x size.height()` columns.
    pub fn new(size: GridSize, height_field: HeightField) -> Result<Self, SimulatorError> {
        if height_field.width() != size.width() || height_field.height() != size.height() {
            return Err(SimulatorError::InvalidHeightField {
                expected_width: size.width(),
                expected_height: size.height(),
                actual_width: height_field.width(),
                actual_height: height_field.height(),
            });
        }

        let lattice = Lattice::carve(size, &height_field);
        let cell_count = size.cell_count();
        debug!(
            "carved {}x{}x{} grid with {} open cells",
            size.width(),
            size.height(),
            size.depth(),
            lattice.open_count()
        );

        Ok(Self {
            height_field,
            lattice,
            water: vec![0.0; cell_count],
            solver: FlowSolver::new(cell_count),
            settle: SettleBook::new(cell_count),
            step_index: 0,
        })
    }

    /// Deposits `amount` into the lowest open cell of `column`.
    ///
    /// Returns the receiving cell, or `None` when the column is fully solid. The
    /// column must lie inside the grid.
    pub fn drop_water(
        &mut self,
        column: ColumnCoord,
        amount: f32,
    ) -> Result<Option<CellCoord>, SimulatorError> {
        if !(MIN_WATER..=MAX_WATER).contains(&amount) {
            return Err(SimulatorError::InvalidAmount { amount });
        }
        assert!(
            self.lattice.size().contains_column(column),
            "column {column:?} lies outside grid {:?}",
            self.lattice.size()
        );

        let Some(cell) = self.lattice.lowest_open_cell(column) else {
            return Ok(None);
        };
        let index = self.lattice.expect_index(cell);
        self.water[index] += amount;
        self.settle.wake(index);
        Ok(Some(cell))
    }

    /// Replaces the volume held by an open cell, returning the previous volume.
    ///
    /// The cell must lie inside the grid.
    pub fn seed_water(&mut self, cell: CellCoord, amount: f32) -> Result<f32, SimulatorError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(SimulatorError::InvalidAmount { amount });
        }
        let index = self.lattice.expect_index(cell);
        if !self.lattice.is_open(index) {
            return Err(SimulatorError::SolidCell { cell });
        }

        let previous = std::mem::replace(&mut self.water[index], amount);
        self.settle.empty(index);
        for direction in FlowDirection::ALL {
            if let Some(neighbor) = self.lattice.open_neighbor(cell, direction) {
                self.settle.wake(neighbor);
            }
        }
        Ok(previous)
    }

    /// Advances the simulation by exactly one step.
    pub fn simulate(&mut self) -> StepReport {
        let tally = self
            .solver
            .step(&self.lattice, &mut self.water, &mut self.settle);
        self.step_index = self.step_index.saturating_add(1);

        let report = StepReport {
            step: self.step_index,
            total_water: query::total_water(self),
            processed_cells: tally.processed,
            settled_cells: u32::try_from(self.settle.settled_count()).unwrap_or(u32::MAX),
            moved_volume: tally.moved,
            discarded_volume: tally.discarded,
            floored_volume: tally.floored,
        };
        debug!(
            "step {} processed {} cells, moved {:.4}, total {:.4}",
            report.step, report.processed_cells, report.moved_volume, report.total_water
        );
        report
    }

    /// Clears all liquid, settle state and flow directions while keeping the terrain.
    pub fn reset(&mut self) {
        self.water.fill(0.0);
        self.solver.clear();
        self.settle.clear();
        self.step_index = 0;
    }
}

/// Applies the provided command to the world, mutating state deterministically.
///
/// Coordinates carried by commands are validated here, so malformed requests
/// produce rejection events instead of assertion failures.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    let size = world.lattice.size();
    match command {
        Command::DropWater { column, amount } => {
            if !size.contains_column(column) {
                warn!("rejected drop outside the grid at {column:?}");
                out_events.push(Event::DropRejected {
                    column,
                    amount,
                    reason: DropError::OutOfBounds,
                });
                return;
            }

            match world.drop_water(column, amount) {
                Ok(Some(cell)) => out_events.push(Event::WaterDropped { cell, amount }),
                Ok(None) => out_events.push(Event::DropIgnored { column }),
                Err(error) => {
                    warn!("rejected drop at {column:?}: {error}");
                    out_events.push(Event::DropRejected {
                        column,
                        amount,
                        reason: error.drop_error(),
                    });
                }
            }
        }
        Command::SeedWater { cell, amount } => {
            if !size.contains(cell) {
                warn!("rejected seed outside the grid at {cell:?}");
                out_events.push(Event::SeedRejected {
                    cell,
                    amount,
                    reason: DropError::OutOfBounds,
                });
                return;
            }

            match world.seed_water(cell, amount) {
                Ok(previous) => out_events.push(Event::WaterSeeded {
                    cell,
                    previous,
                    amount,
                }),
                Err(error) => {
                    warn!("rejected seed at {cell:?}: {error}");
                    out_events.push(Event::SeedRejected {
                        cell,
                        amount,
                        reason: error.drop_error(),
                    });
                }
            }
        }
        Command::Step => {
            let report = world.simulate();
            out_events.push(Event::StepCompleted { report });
        }
        Command::Reset => {
            world.reset();
            out_events.push(Event::GridReset);
        }
    }
}

/// Query functions that provide read-only access to the world state.
///
/// Accessors taking a cell assert that it lies inside the grid.
pub mod query {
    use tidepool_core::{
        CellCoord, ColumnCoord, FlowDirection, FlowMask, GridSize, HeightField, WaterView,
    };

    use super::World;

    /// Dimensions of the simulated volume.
    #[must_use]
    pub fn size(world: &World) -> GridSize {
        world.lattice.size()
    }

    /// Terrain the world was carved from.
    #[must_use]
    pub fn height_field(world: &World) -> &HeightField {
        &world.height_field
    }

    /// Number of steps simulated since construction or the last reset.
    #[must_use]
    pub fn step_index(world: &World) -> u64 {
        world.step_index
    }

    /// Volume currently held by the cell.
    #[must_use]
    pub fn water_amount_at(world: &World, cell: CellCoord) -> f32 {
        world.water[world.lattice.expect_index(cell)]
    }

    /// Reports whether the cell is open terrain.
    #[must_use]
    pub fn valid_cell_at(world: &World, cell: CellCoord) -> bool {
        world.lattice.is_open(world.lattice.expect_index(cell))
    }

    /// Reports whether liquid arrived in the cell through `direction` during the last step.
    #[must_use]
    pub fn flow_direction_at(world: &World, cell: CellCoord, direction: FlowDirection) -> bool {
        flow_mask_at(world, cell).contains(direction)
    }

    /// Every direction through which liquid arrived in the cell during the last step.
    #[must_use]
    pub fn flow_mask_at(world: &World, cell: CellCoord) -> FlowMask {
        world.solver.directions()[world.lattice.expect_index(cell)]
    }

    /// Reports whether the cell is currently skipped by the step loop.
    #[must_use]
    pub fn is_settled(world: &World, cell: CellCoord) -> bool {
        world.settle.is_settled(world.lattice.expect_index(cell))
    }

    /// Lowest open cell of the column, if any; `None` also for columns outside the grid.
    #[must_use]
    pub fn lowest_open_cell(world: &World, column: ColumnCoord) -> Option<CellCoord> {
        world.lattice.lowest_open_cell(column)
    }

    /// Sum of every cell's volume.
    #[must_use]
    pub fn total_water(world: &World) -> f32 {
        world.water.iter().map(|amount| f64::from(*amount)).sum::<f64>() as f32
    }

    /// Captures a read-only view of the dense fluid arrays.
    #[must_use]
    pub fn water_view(world: &World) -> WaterView<'_> {
        WaterView::new(
            world.lattice.size(),
            &world.water,
            world.lattice.mask(),
            world.solver.directions(),
        )
    }
}
