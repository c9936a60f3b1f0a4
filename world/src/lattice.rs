//! Static open-cell mask derived from the terrain height field.

use tidepool_core::{CellCoord, ColumnCoord, FlowDirection, GridSize, HeightField};

/// Dense mask of the cells that may hold or transmit liquid.
///
/// A cell `(x, y, z)` is open when `z >= level(x, y)`. The mask is derived once
/// at construction and never changes afterwards, so neighbour lookups reduce to
/// coordinate arithmetic plus a single array read.
#[derive(Clone, Debug)]
pub(crate) struct Lattice {
    size: GridSize,
    valid: Vec<bool>,
}

impl Lattice {
    /// Derives the open-cell mask; the height field must cover `size`'s columns.
    pub(crate) fn carve(size: GridSize, height_field: &HeightField) -> Self {
        debug_assert_eq!(height_field.width(), size.width());
        debug_assert_eq!(height_field.height(), size.height());

        let layer = size.layer_len();
        let mut valid = vec![false; size.cell_count()];
        for (column_index, &level) in height_field.levels().iter().enumerate().take(layer) {
            let first_open = usize::try_from(level).unwrap_or(usize::MAX);
            let depth = size.depth() as usize;
            for z in first_open.min(depth)..depth {
                valid[column_index + z * layer] = true;
            }
        }

        Self { size, valid }
    }

    pub(crate) const fn size(&self) -> GridSize {
        self.size
    }

    pub(crate) fn mask(&self) -> &[bool] {
        &self.valid
    }

    /// Reports whether the in-bounds cell at `index` is open.
    pub(crate) fn is_open(&self, index: usize) -> bool {
        self.valid[index]
    }

    /// Flat index of the cell, asserting that it lies inside the grid.
    pub(crate) fn expect_index(&self, cell: CellCoord) -> usize {
        match self.size.index(cell) {
            Some(index) => index,
            None => panic!("cell {cell:?} lies outside grid {:?}", self.size),
        }
    }

    /// Index of the open neighbour in `direction`, if one exists.
    pub(crate) fn open_neighbor(&self, cell: CellCoord, direction: FlowDirection) -> Option<usize> {
        let neighbor = self.size.index(direction.neighbor(cell)?)?;
        self.valid[neighbor].then_some(neighbor)
    }

    /// Lowest open cell of the column, scanning upward from the bottom layer.
    pub(crate) fn lowest_open_cell(&self, column: ColumnCoord) -> Option<CellCoord> {
        let column_index = self.size.column_index(column)?;
        let layer = self.size.layer_len();
        (0..self.size.depth())
            .find(|z| self.valid[column_index + *z as usize * layer])
            .map(|z| column.at(z))
    }

    /// Number of open cells.
    pub(crate) fn open_count(&self) -> usize {
        self.valid.iter().filter(|open| **open).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stepped_lattice() -> Lattice {
        let size = GridSize::new(3, 1, 4).expect("valid size");
        let field = HeightField::from_levels(3, 1, vec![0, 2, 9]).expect("valid field");
        Lattice::carve(size, &field)
    }

    #[test]
    fn cells_open_at_or_above_column_level() {
        let lattice = stepped_lattice();
        let size = lattice.size();
        let open = |x, z| lattice.is_open(size.index(CellCoord::new(x, 0, z)).expect("in bounds"));

        assert!(open(0, 0));
        assert!(!open(1, 1));
        assert!(open(1, 2));
        assert!(open(1, 3));
        assert!(!open(2, 3), "levels above the depth close the whole column");
        assert_eq!(lattice.open_count(), 4 + 2);
    }

    #[test]
    fn lowest_open_cell_scans_from_bottom() {
        let lattice = stepped_lattice();
        assert_eq!(
            lattice.lowest_open_cell(ColumnCoord::new(1, 0)),
            Some(CellCoord::new(1, 0, 2))
        );
        assert_eq!(lattice.lowest_open_cell(ColumnCoord::new(2, 0)), None);
        assert_eq!(lattice.lowest_open_cell(ColumnCoord::new(5, 0)), None);
    }

    #[test]
    fn open_neighbor_respects_bounds_and_terrain() {
        let lattice = stepped_lattice();
        let size = lattice.size();
        let cell = CellCoord::new(0, 0, 1);

        assert_eq!(
            lattice.open_neighbor(cell, FlowDirection::Down),
            size.index(CellCoord::new(0, 0, 0))
        );
        assert_eq!(
            lattice.open_neighbor(cell, FlowDirection::East),
            None,
            "terrain blocks the east face at z=1"
        );
        assert_eq!(lattice.open_neighbor(cell, FlowDirection::West), None);
        assert_eq!(lattice.open_neighbor(cell, FlowDirection::North), None);

        let upper = CellCoord::new(0, 0, 2);
        assert_eq!(
            lattice.open_neighbor(upper, FlowDirection::East),
            size.index(CellCoord::new(1, 0, 2))
        );

        let top = CellCoord::new(0, 0, 3);
        assert_eq!(lattice.open_neighbor(top, FlowDirection::Up), None);
        assert_eq!(lattice.open_neighbor(top, FlowDirection::South), None);
    }

    #[test]
    #[should_panic(expected = "lies outside grid")]
    fn expect_index_asserts_bounds() {
        let lattice = stepped_lattice();
        let _ = lattice.expect_index(CellCoord::new(0, 0, 4));
    }
}
