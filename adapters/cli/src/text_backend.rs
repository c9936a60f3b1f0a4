//! Plain-text rendering backend that prints top-down frames of the grid.

use std::io::Write;

use anyhow::{Context, Result};
use tidepool_core::FlowDirection;
use tidepool_rendering::{ColumnPresentation, Presentation, RenderingBackend, Scene};

/// Prints one frame every `render_every` scene updates, plus the first and last frame.
#[derive(Debug)]
pub(crate) struct TextBackend<W> {
    out: W,
    render_every: u32,
}

impl<W: Write> TextBackend<W> {
    pub(crate) fn new(out: W, render_every: u32) -> Self {
        Self {
            out,
            render_every: render_every.max(1),
        }
    }

    fn draw(&mut self, title: &str, scene: &Scene) -> Result<()> {
        let size = scene.size;
        writeln!(
            self.out,
            "{title} | step {} | water {:.3}",
            scene.step, scene.total_water
        )
        .context("failed to write frame header")?;

        for y in 0..size.height() {
            let row: String = scene
                .row(y)
                .map(|column| glyph(column, size.depth()))
                .collect();
            writeln!(self.out, "{row}").context("failed to write frame row")?;
        }
        writeln!(self.out).context("failed to write frame separator")?;
        Ok(())
    }
}

impl<W: Write> RenderingBackend for TextBackend<W> {
    fn run<F>(mut self, presentation: Presentation, mut update_scene: F) -> Result<()>
    where
        F: FnMut(&mut Scene) -> bool,
    {
        let Presentation {
            title, mut scene, ..
        } = presentation;

        self.draw(&title, &scene)?;
        let mut updates = 0_u32;
        let mut drawn_last = true;
        while update_scene(&mut scene) {
            updates = updates.wrapping_add(1);
            drawn_last = updates % self.render_every == 0;
            if drawn_last {
                self.draw(&title, &scene)?;
            }
        }
        if !drawn_last {
            self.draw(&title, &scene)?;
        }

        self.out.flush().context("failed to flush frames")
    }
}

/// Single character describing a column seen from above.
///
/// Solid columns print `#`, dry ground `.`, liquid arriving sideways an arrow
/// along its travel direction, and resting liquid a depth mark.
fn glyph(column: &ColumnPresentation, depth: u32) -> char {
    if column.is_solid(depth) {
        return '#';
    }
    if column.surface.is_none() {
        return '.';
    }

    match column.flow {
        Some(FlowDirection::North) => '^',
        Some(FlowDirection::South) => 'v',
        Some(FlowDirection::East) => '>',
        Some(FlowDirection::West) => '<',
        _ if column.volume < 0.5 => '-',
        _ if column.volume < 1.0 => '~',
        _ => char::from_digit((column.volume as u32).min(9), 10).unwrap_or('9'),
    }
}
