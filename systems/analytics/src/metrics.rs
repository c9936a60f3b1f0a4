use tidepool_core::{ColumnCoord, WaterView};

/// Accumulates the volume held by every column into `out`, row-major.
///
/// The buffer is cleared first so callers can reuse it between steps.
pub fn column_volumes(view: &WaterView<'_>, out: &mut Vec<f32>) {
    let size = view.size();
    let layer = size.layer_len();
    out.clear();
    out.resize(layer, 0.0);

    for (index, amount) in view.amounts().iter().enumerate() {
        if *amount > 0.0 {
            out[index % layer] += *amount;
        }
    }
}

/// Column holding the most liquid, paired with its volume.
///
/// Ties resolve to the first column in row-major order. Returns `None` when
/// the grid is dry.
pub fn deepest_column(view: &WaterView<'_>, scratch: &mut Vec<f32>) -> Option<(ColumnCoord, f32)> {
    column_volumes(view, scratch);
    let width = view.size().width() as usize;

    let mut best: Option<(usize, f32)> = None;
    for (index, volume) in scratch.iter().copied().enumerate() {
        if volume <= 0.0 {
            continue;
        }
        if best.map_or(true, |(_, current)| volume > current) {
            best = Some((index, volume));
        }
    }

    best.map(|(index, volume)| {
        let column = ColumnCoord::new((index % width) as u32, (index / width) as u32);
        (column, volume)
    })
}

/// Number of cells holding any liquid.
#[must_use]
pub fn wet_cell_count(view: &WaterView<'_>) -> usize {
    view.amounts().iter().filter(|amount| **amount > 0.0).count()
}
