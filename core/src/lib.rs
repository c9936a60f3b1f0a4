#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Tidepool fluid simulator.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative fluid world, and pure systems. Adapters submit [`Command`]
//! values describing desired mutations, the world executes those commands via
//! its `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to deterministically. Systems consume event streams, query immutable
//! views such as [`WaterView`], and respond exclusively with new command
//! batches.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Floor of a single cell's comfortable capacity; smaller volumes are not simulated.
pub const MIN_WATER: f32 = 0.005;

/// Ceiling of a single cell's comfortable capacity before compression applies.
pub const MAX_WATER: f32 = 1.0;

/// Potential flows at or below this volume are not accelerated by [`FLOW_SPEED`].
pub const MIN_FLOW: f32 = 0.005;

/// Hard cap on the volume moved through a single face in one step.
pub const MAX_FLOW: f32 = 6.0;

/// Multiplier applied to flows above [`MIN_FLOW`].
pub const FLOW_SPEED: f32 = 1.0;

/// Extra volume a cell may hold under pressure from the cell above it.
pub const MAX_COMPRESSION: f32 = 0.25;

/// Consecutive idle steps a cell tolerates before it is marked settled.
pub const SETTLE_COUNT_MAX: u8 = 10;

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Deposits liquid into the lowest open cell of a column.
    DropWater {
        /// Column receiving the liquid.
        column: ColumnCoord,
        /// Volume to deposit, bounded by [`MIN_WATER`] and [`MAX_WATER`].
        amount: f32,
    },
    /// Replaces the volume held by a single open cell.
    SeedWater {
        /// Cell whose volume is replaced.
        cell: CellCoord,
        /// New volume held by the cell.
        amount: f32,
    },
    /// Advances the simulation by exactly one discrete step.
    Step,
    /// Clears every mutable array while keeping the terrain.
    Reset,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Confirms that liquid was deposited into a cell.
    WaterDropped {
        /// Lowest open cell of the targeted column.
        cell: CellCoord,
        /// Volume that was deposited.
        amount: f32,
    },
    /// Reports that a drop targeted a column without any open cell.
    DropIgnored {
        /// Fully solid column named by the request.
        column: ColumnCoord,
    },
    /// Reports that a drop request was rejected.
    DropRejected {
        /// Column named by the request.
        column: ColumnCoord,
        /// Volume named by the request.
        amount: f32,
        /// Specific reason the drop failed.
        reason: DropError,
    },
    /// Confirms that a cell's volume was replaced.
    WaterSeeded {
        /// Cell whose volume changed.
        cell: CellCoord,
        /// Volume held by the cell before seeding.
        previous: f32,
        /// Volume held by the cell after seeding.
        amount: f32,
    },
    /// Reports that a seed request was rejected.
    SeedRejected {
        /// Cell named by the request.
        cell: CellCoord,
        /// Volume named by the request.
        amount: f32,
        /// Specific reason the seed failed.
        reason: DropError,
    },
    /// Announces that the simulator advanced one step.
    StepCompleted {
        /// Accounting gathered while the step executed.
        report: StepReport,
    },
    /// Announces that all liquid and settle state was cleared.
    GridReset,
    /// Publishes a fresh analytics snapshot.
    AnalyticsUpdated {
        /// Aggregated statistics describing the grid.
        stats: FlowStats,
    },
}

/// Reasons a drop or seed request may be rejected by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropError {
    /// The requested volume lies outside the accepted range.
    InvalidAmount,
    /// The requested coordinates lie outside the grid.
    OutOfBounds,
    /// The requested cell is solid terrain.
    SolidCell,
}

/// Errors reported by fallible simulator operations.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SimulatorError {
    /// At least one grid axis was zero or the grid does not fit in memory.
    #[error("grid dimensions must be positive (received {width}x{height}x{depth})")]
    InvalidDimensions {
        /// Requested number of columns along x.
        width: u32,
        /// Requested number of rows along y.
        height: u32,
        /// Requested number of layers along z.
        depth: u32,
    },
    /// The height field does not cover the grid's columns.
    #[error(
        "height field covers {actual_width}x{actual_height} columns but {expected_width}x{expected_height} were expected"
    )]
    InvalidHeightField {
        /// Expected number of columns along x.
        expected_width: u32,
        /// Expected number of rows along y.
        expected_height: u32,
        /// Number of columns along x actually supplied.
        actual_width: u32,
        /// Number of rows along y actually supplied.
        actual_height: u32,
    },
    /// The requested volume lies outside the accepted range.
    #[error("water amount {amount} is outside the accepted range")]
    InvalidAmount {
        /// Volume named by the request.
        amount: f32,
    },
    /// The requested cell is solid terrain and cannot hold liquid.
    #[error("cell {cell:?} is solid")]
    SolidCell {
        /// Cell named by the request.
        cell: CellCoord,
    },
}

impl SimulatorError {
    /// Maps the error onto the rejection reason carried by events.
    #[must_use]
    pub const fn drop_error(&self) -> DropError {
        match self {
            Self::InvalidAmount { .. } => DropError::InvalidAmount,
            Self::SolidCell { .. } => DropError::SolidCell,
            Self::InvalidDimensions { .. } | Self::InvalidHeightField { .. } => {
                DropError::OutOfBounds
            }
        }
    }
}

/// Fixed dimensions of the simulated volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    width: u32,
    height: u32,
    depth: u32,
}

impl GridSize {
    /// Creates a grid size, rejecting empty axes and volumes that overflow `usize`.
    pub fn new(width: u32, height: u32, depth: u32) -> Result<Self, SimulatorError> {
        let invalid = SimulatorError::InvalidDimensions {
            width,
            height,
            depth,
        };
        if width == 0 || height == 0 || depth == 0 {
            return Err(invalid);
        }

        let cells = usize::try_from(width)
            .ok()
            .and_then(|w| w.checked_mul(usize::try_from(height).ok()?))
            .and_then(|layer| layer.checked_mul(usize::try_from(depth).ok()?));
        if cells.is_none() {
            return Err(invalid);
        }

        Ok(Self {
            width,
            height,
            depth,
        })
    }

    /// Number of columns along x.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows along y.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of layers along z.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of cells contained in a single z layer.
    #[must_use]
    pub const fn layer_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Total number of cells in the volume.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.layer_len() * self.depth as usize
    }

    /// Reports whether the cell lies inside the volume.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.x < self.width && cell.y < self.height && cell.z < self.depth
    }

    /// Reports whether the column lies inside the volume's footprint.
    #[must_use]
    pub const fn contains_column(&self, column: ColumnCoord) -> bool {
        column.x < self.width && column.y < self.height
    }

    /// Flat index of the cell, `x + y*width + z*width*height`.
    #[must_use]
    pub const fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        Some(
            cell.x as usize
                + cell.y as usize * self.width as usize
                + cell.z as usize * self.layer_len(),
        )
    }

    /// Flat index of the column within a single layer, `x + y*width`.
    #[must_use]
    pub const fn column_index(&self, column: ColumnCoord) -> Option<usize> {
        if !self.contains_column(column) {
            return None;
        }
        Some(column.x as usize + column.y as usize * self.width as usize)
    }

    /// Recovers the cell coordinate addressed by a flat index.
    #[must_use]
    pub fn coord(&self, index: usize) -> Option<CellCoord> {
        if index >= self.cell_count() {
            return None;
        }
        let layer = self.layer_len();
        let width = self.width as usize;
        let z = index / layer;
        let rest = index % layer;
        Some(CellCoord::new(
            u32::try_from(rest % width).ok()?,
            u32::try_from(rest / width).ok()?,
            u32::try_from(z).ok()?,
        ))
    }

    /// Iterates every column in row-major order.
    pub fn columns(&self) -> impl Iterator<Item = ColumnCoord> {
        let width = self.width;
        let height = self.height;
        (0..height).flat_map(move |y| (0..width).map(move |x| ColumnCoord::new(x, y)))
    }
}

/// Location of a vertical column of cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnCoord {
    x: u32,
    y: u32,
}

impl ColumnCoord {
    /// Creates a new column coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Zero-based position along x.
    #[must_use]
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Zero-based position along y.
    #[must_use]
    pub const fn y(&self) -> u32 {
        self.y
    }

    /// Returns the cell of this column at layer `z`.
    #[must_use]
    pub const fn at(self, z: u32) -> CellCoord {
        CellCoord::new(self.x, self.y, z)
    }
}

/// Location of a single voxel cell; `z` grows upward from the bottom layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    x: u32,
    y: u32,
    z: u32,
}

impl CellCoord {
    /// Creates a new cell coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Zero-based position along x.
    #[must_use]
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Zero-based position along y.
    #[must_use]
    pub const fn y(&self) -> u32 {
        self.y
    }

    /// Zero-based layer, zero being the bottom of the volume.
    #[must_use]
    pub const fn z(&self) -> u32 {
        self.z
    }

    /// Column containing the cell.
    #[must_use]
    pub const fn column(&self) -> ColumnCoord {
        ColumnCoord::new(self.x, self.y)
    }
}

/// The six faces through which liquid moves between cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowDirection {
    /// Toward increasing z.
    Up,
    /// Toward decreasing z.
    Down,
    /// Toward decreasing y.
    North,
    /// Toward increasing y.
    South,
    /// Toward increasing x.
    East,
    /// Toward decreasing x.
    West,
}

impl FlowDirection {
    /// Every direction in bit order.
    pub const ALL: [Self; 6] = [
        Self::Up,
        Self::Down,
        Self::North,
        Self::South,
        Self::East,
        Self::West,
    ];

    /// Bit owned by the direction within a [`FlowMask`].
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            Self::Up => 1 << 0,
            Self::Down => 1 << 1,
            Self::North => 1 << 2,
            Self::South => 1 << 3,
            Self::East => 1 << 4,
            Self::West => 1 << 5,
        }
    }

    /// Reports whether the direction moves within a layer.
    #[must_use]
    pub const fn is_horizontal(self) -> bool {
        !matches!(self, Self::Up | Self::Down)
    }

    /// Adjacent coordinate in this direction, or `None` when it would underflow.
    ///
    /// Upper bounds are not checked; callers validate against a [`GridSize`].
    #[must_use]
    pub fn neighbor(self, cell: CellCoord) -> Option<CellCoord> {
        let CellCoord { x, y, z } = cell;
        Some(match self {
            Self::Up => CellCoord::new(x, y, z.checked_add(1)?),
            Self::Down => CellCoord::new(x, y, z.checked_sub(1)?),
            Self::North => CellCoord::new(x, y.checked_sub(1)?, z),
            Self::South => CellCoord::new(x, y.checked_add(1)?, z),
            Self::East => CellCoord::new(x.checked_add(1)?, y, z),
            Self::West => CellCoord::new(x.checked_sub(1)?, y, z),
        })
    }
}

/// Set of directions through which liquid arrived in a cell during the last step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FlowMask(u8);

impl FlowMask {
    /// Mask without any direction.
    pub const EMPTY: Self = Self(0);

    /// Reports whether no direction is present.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Reports whether the direction is present.
    #[must_use]
    pub const fn contains(self, direction: FlowDirection) -> bool {
        self.0 & direction.bit() != 0
    }

    /// Adds the direction to the mask.
    pub fn insert(&mut self, direction: FlowDirection) {
        self.0 |= direction.bit();
    }

    /// Iterates the present directions in bit order.
    pub fn iter(self) -> impl Iterator<Item = FlowDirection> {
        FlowDirection::ALL
            .into_iter()
            .filter(move |direction| self.contains(*direction))
    }
}

/// Lowest open layer of every column; cells at or above it hold liquid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightField {
    width: u32,
    height: u32,
    levels: Vec<u32>,
}

impl HeightField {
    /// Creates a height field where every column opens at `level`.
    #[must_use]
    pub fn flat(width: u32, height: u32, level: u32) -> Self {
        let count = width as usize * height as usize;
        Self {
            width,
            height,
            levels: vec![level; count],
        }
    }

    /// Creates a height field from row-major levels (`x + y*width`).
    pub fn from_levels(width: u32, height: u32, levels: Vec<u32>) -> Result<Self, SimulatorError> {
        if levels.len() != width as usize * height as usize {
            let actual_height = if width == 0 {
                0
            } else {
                u32::try_from(levels.len() / width as usize).unwrap_or(u32::MAX)
            };
            return Err(SimulatorError::InvalidHeightField {
                expected_width: width,
                expected_height: height,
                actual_width: width,
                actual_height,
            });
        }

        Ok(Self {
            width,
            height,
            levels,
        })
    }

    /// Creates a height field from rows indexed by `y`, each holding one level per `x`.
    pub fn from_rows(rows: Vec<Vec<u32>>) -> Result<Self, SimulatorError> {
        let height = u32::try_from(rows.len()).unwrap_or(u32::MAX);
        let width = rows
            .first()
            .map_or(0, |row| u32::try_from(row.len()).unwrap_or(u32::MAX));

        if let Some(ragged) = rows.iter().find(|row| row.len() != width as usize) {
            return Err(SimulatorError::InvalidHeightField {
                expected_width: width,
                expected_height: height,
                actual_width: u32::try_from(ragged.len()).unwrap_or(u32::MAX),
                actual_height: height,
            });
        }

        Ok(Self {
            width,
            height,
            levels: rows.into_iter().flatten().collect(),
        })
    }

    /// Number of columns along x.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows along y.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Lowest open layer of the column, if the column exists.
    #[must_use]
    pub fn level(&self, column: ColumnCoord) -> Option<u32> {
        if column.x() >= self.width || column.y() >= self.height {
            return None;
        }
        let index = column.x() as usize + column.y() as usize * self.width as usize;
        self.levels.get(index).copied()
    }

    /// Row-major levels backing the height field.
    #[must_use]
    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    /// Raises every column inside the rectangle `[min, max]` to at least `level`.
    pub fn raise(&mut self, min: ColumnCoord, max: ColumnCoord, level: u32) {
        for y in min.y()..=max.y().min(self.height.saturating_sub(1)) {
            for x in min.x()..=max.x().min(self.width.saturating_sub(1)) {
                let index = x as usize + y as usize * self.width as usize;
                if let Some(slot) = self.levels.get_mut(index) {
                    *slot = (*slot).max(level);
                }
            }
        }
    }
}

/// Accounting gathered while a single step executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// One-based index of the completed step.
    pub step: u64,
    /// Total volume held by the grid after the step committed.
    pub total_water: f32,
    /// Cells that reached directional flow processing.
    pub processed_cells: u32,
    /// Cells flagged as settled after the step committed.
    pub settled_cells: u32,
    /// Volume moved between cells.
    pub moved_volume: f32,
    /// Volume removed by the residual sink and by snapping to zero.
    pub discarded_volume: f32,
    /// Volume added by lifting sub-threshold cells to [`MIN_WATER`].
    pub floored_volume: f32,
}

/// Aggregated statistics published by the analytics system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowStats {
    /// Step the statistics were captured after.
    pub step: u64,
    /// Volume currently held by the grid.
    pub total_water: f32,
    /// Volume the ledger expects from injections and reported sinks.
    pub expected_water: f32,
    /// Difference between held and expected volume.
    pub drift: f32,
    /// Cells holding any liquid.
    pub wet_cells: u32,
    /// Cells flagged as settled.
    pub settled_cells: u32,
    /// Column holding the most liquid, if any column is wet.
    pub deepest_column: Option<ColumnCoord>,
    /// Volume held by [`FlowStats::deepest_column`].
    pub max_column_volume: f32,
}

/// Read-only view into the dense fluid arrays.
#[derive(Clone, Copy, Debug)]
pub struct WaterView<'a> {
    size: GridSize,
    amounts: &'a [f32],
    valid: &'a [bool],
    flows: &'a [FlowMask],
}

impl<'a> WaterView<'a> {
    /// Captures a new view; every slice must hold one entry per cell.
    #[must_use]
    pub fn new(
        size: GridSize,
        amounts: &'a [f32],
        valid: &'a [bool],
        flows: &'a [FlowMask],
    ) -> Self {
        debug_assert_eq!(amounts.len(), size.cell_count());
        debug_assert_eq!(valid.len(), size.cell_count());
        debug_assert_eq!(flows.len(), size.cell_count());
        Self {
            size,
            amounts,
            valid,
            flows,
        }
    }

    /// Dimensions of the viewed grid.
    #[must_use]
    pub const fn size(&self) -> GridSize {
        self.size
    }

    /// Volume held by the cell, or `None` outside the grid.
    #[must_use]
    pub fn amount(&self, cell: CellCoord) -> Option<f32> {
        self.size
            .index(cell)
            .and_then(|index| self.amounts.get(index).copied())
    }

    /// Reports whether the cell is open; cells outside the grid are not.
    #[must_use]
    pub fn is_valid(&self, cell: CellCoord) -> bool {
        self.size
            .index(cell)
            .and_then(|index| self.valid.get(index).copied())
            .unwrap_or(false)
    }

    /// Inbound flow directions recorded for the cell during the last step.
    #[must_use]
    pub fn flow(&self, cell: CellCoord) -> FlowMask {
        self.size
            .index(cell)
            .and_then(|index| self.flows.get(index).copied())
            .unwrap_or(FlowMask::EMPTY)
    }

    /// Total volume held by the column.
    #[must_use]
    pub fn column_volume(&self, column: ColumnCoord) -> f32 {
        (0..self.size.depth())
            .filter_map(|z| self.amount(column.at(z)))
            .sum()
    }

    /// Highest wet layer of the column.
    #[must_use]
    pub fn surface_level(&self, column: ColumnCoord) -> Option<u32> {
        (0..self.size.depth())
            .rev()
            .find(|z| self.amount(column.at(*z)).map_or(false, |amount| amount > 0.0))
    }

    /// Iterates every wet cell with its volume in flat index order.
    pub fn wet_cells(&self) -> impl Iterator<Item = (CellCoord, f32)> + 'a {
        let size = self.size;
        self.amounts
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, amount)| *amount > 0.0)
            .filter_map(move |(index, amount)| size.coord(index).map(|cell| (cell, amount)))
    }

    /// Raw row-major amounts.
    #[must_use]
    pub fn amounts(&self) -> &'a [f32] {
        self.amounts
    }
}
