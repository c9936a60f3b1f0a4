#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Shared rendering contracts for Tidepool adapters.

use anyhow::Result as AnyResult;
use glam::Vec3;
use std::{error::Error, fmt};
use tidepool_core::{ColumnCoord, FlowDirection, FlowMask, GridSize, HeightField, WaterView};

/// RGBA color used when presenting frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    /// Red channel intensity in the range 0.0..=1.0.
    pub red: f32,
    /// Green channel intensity in the range 0.0..=1.0.
    pub green: f32,
    /// Blue channel intensity in the range 0.0..=1.0.
    pub blue: f32,
    /// Alpha channel intensity in the range 0.0..=1.0.
    pub alpha: f32,
}

impl Color {
    /// Creates a new color from floating point channels.
    #[must_use]
    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Creates an opaque color from byte RGB values.
    #[must_use]
    pub const fn from_rgb_u8(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red: red as f32 / 255.0,
            green: green as f32 / 255.0,
            blue: blue as f32 / 255.0,
            alpha: 1.0,
        }
    }

    /// Returns a new color lightened towards white by the provided amount.
    #[must_use]
    pub fn lighten(self, amount: f32) -> Self {
        let amount = amount.clamp(0.0, 1.0);

        Self {
            red: lighten_channel(self.red, amount),
            green: lighten_channel(self.green, amount),
            blue: lighten_channel(self.blue, amount),
            alpha: self.alpha,
        }
    }
}

fn lighten_channel(channel: f32, amount: f32) -> f32 {
    channel + (1.0 - channel) * amount
}

/// Colors used when shading columns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Palette {
    /// Base color of dry terrain; higher ground is drawn lighter.
    pub terrain: Color,
    /// Base color of deep water; shallow water is drawn lighter.
    pub water: Color,
    /// Color of columns without any open cell.
    pub solid: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            terrain: Color::from_rgb_u8(0x6b, 0x4f, 0x2c),
            water: Color::from_rgb_u8(0x12, 0x4e, 0x9c),
            solid: Color::from_rgb_u8(0x30, 0x30, 0x30),
        }
    }
}

/// Everything a backend needs to draw a single column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColumnPresentation {
    /// Column being described.
    pub column: ColumnCoord,
    /// First open layer of the column, equal to the grid depth for solid columns.
    pub terrain_level: u32,
    /// Volume held across the whole column.
    pub volume: f32,
    /// Highest wet layer, if the column holds liquid.
    pub surface: Option<u32>,
    /// Dominant direction through which liquid entered the surface cell last step.
    pub flow: Option<FlowDirection>,
    /// Fill color derived from the palette.
    pub shade: Color,
    /// Column centre in grid units, with `z` at the visible surface height.
    pub position: Vec3,
}

impl ColumnPresentation {
    /// Reports whether the column has no open cell at all.
    #[must_use]
    pub const fn is_solid(&self, depth: u32) -> bool {
        self.terrain_level >= depth
    }
}

/// Snapshot of the fluid grid prepared for presentation.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    /// Dimensions of the simulated volume.
    pub size: GridSize,
    /// One entry per column in row-major order.
    pub columns: Vec<ColumnPresentation>,
    /// Step index the snapshot was captured after.
    pub step: u64,
    /// Total volume held by the grid.
    pub total_water: f32,
}

impl Scene {
    /// Builds a scene from a read-only view of the world.
    ///
    /// Returns an error when the height field does not match the viewed grid.
    pub fn from_view(
        view: &WaterView<'_>,
        height_field: &HeightField,
        palette: &Palette,
        step: u64,
    ) -> Result<Self, RenderingError> {
        let size = view.size();
        if height_field.width() != size.width() || height_field.height() != size.height() {
            return Err(RenderingError::MismatchedTerrain {
                grid: (size.width(), size.height()),
                terrain: (height_field.width(), height_field.height()),
            });
        }

        let depth = size.depth();
        let mut total_water = 0.0_f64;
        let columns = size
            .columns()
            .map(|column| {
                let terrain_level = height_field.level(column).unwrap_or(depth).min(depth);
                let volume = view.column_volume(column);
                let surface = view.surface_level(column);
                total_water += f64::from(volume);

                let flow = surface.and_then(|z| dominant_flow(view.flow(column.at(z))));
                let shade = shade(palette, terrain_level, depth, volume);
                let height = if volume > 0.0 {
                    terrain_level as f32 + volume
                } else {
                    terrain_level as f32
                };
                let position = Vec3::new(
                    column.x() as f32 + 0.5,
                    column.y() as f32 + 0.5,
                    height.min(depth as f32),
                );

                ColumnPresentation {
                    column,
                    terrain_level,
                    volume,
                    surface,
                    flow,
                    shade,
                    position,
                }
            })
            .collect();

        Ok(Self {
            size,
            columns,
            step,
            total_water: total_water as f32,
        })
    }

    /// Presentation of the requested column, if it lies inside the grid.
    #[must_use]
    pub fn column(&self, column: ColumnCoord) -> Option<&ColumnPresentation> {
        self.size
            .column_index(column)
            .and_then(|index| self.columns.get(index))
    }

    /// Iterates the columns of one row from west to east.
    pub fn row(&self, y: u32) -> impl Iterator<Item = &ColumnPresentation> {
        let width = self.size.width() as usize;
        let start = (y as usize).saturating_mul(width).min(self.columns.len());
        let end = start.saturating_add(width).min(self.columns.len());
        self.columns[start..end].iter()
    }
}

/// Picks the direction to display for a cell's inbound flow mask.
///
/// Sideways arrivals take precedence over vertical ones; within each group the
/// first direction in [`FlowDirection::ALL`] order wins.
#[must_use]
pub fn dominant_flow(mask: FlowMask) -> Option<FlowDirection> {
    mask.iter()
        .find(|direction| direction.is_horizontal())
        .or_else(|| mask.iter().next())
}

fn shade(palette: &Palette, terrain_level: u32, depth: u32, volume: f32) -> Color {
    if terrain_level >= depth {
        return palette.solid;
    }

    let depth = depth.max(1) as f32;
    if volume > 0.0 {
        palette.water.lighten(1.0 - (volume / depth).clamp(0.0, 1.0))
    } else {
        palette.terrain.lighten(terrain_level as f32 / depth * 0.6)
    }
}

/// Presentation descriptor consumed by rendering backends.
#[derive(Clone, Debug, PartialEq)]
pub struct Presentation {
    /// Title shown above every frame.
    pub title: String,
    /// Palette used to shade the scene.
    pub palette: Palette,
    /// Scene content that should be displayed.
    pub scene: Scene,
}

impl Presentation {
    /// Constructs a new presentation descriptor.
    #[must_use]
    pub fn new<T>(title: T, palette: Palette, scene: Scene) -> Self
    where
        T: Into<String>,
    {
        Self {
            title: title.into(),
            palette,
            scene,
        }
    }
}

/// Rendering backend capable of presenting Tidepool scenes.
pub trait RenderingBackend {
    /// Runs the rendering backend until `update_scene` returns `false`.
    ///
    /// The closure advances the simulation and refreshes the scene before each
    /// frame is drawn.
    fn run<F>(self, presentation: Presentation, update_scene: F) -> AnyResult<()>
    where
        F: FnMut(&mut Scene) -> bool;
}

/// Errors that can occur when constructing rendering descriptors.
#[derive(Debug, PartialEq, Eq)]
pub enum RenderingError {
    /// The terrain does not cover the viewed grid.
    MismatchedTerrain {
        /// Columns and rows of the viewed grid.
        grid: (u32, u32),
        /// Columns and rows of the provided terrain.
        terrain: (u32, u32),
    },
}

impl fmt::Display for RenderingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MismatchedTerrain { grid, terrain } => {
                write!(
                    f,
                    "terrain covers {}x{} columns but the grid has {}x{}",
                    terrain.0, terrain.1, grid.0, grid.1
                )
            }
        }
    }
}

impl Error for RenderingError {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        size: GridSize,
        amounts: Vec<f32>,
        valid: Vec<bool>,
        flows: Vec<FlowMask>,
        field: HeightField,
    }

    impl Fixture {
        /// 2x1 columns, three layers; the east column is solid.
        fn new() -> Self {
            let size = GridSize::new(2, 1, 3).expect("valid size");
            let field = HeightField::from_levels(2, 1, vec![0, 3]).expect("valid field");
            let mut flows = vec![FlowMask::EMPTY; 6];
            flows[2].insert(FlowDirection::Down);
            flows[2].insert(FlowDirection::West);
            Self {
                size,
                amounts: vec![1.0, 0.0, 0.5, 0.0, 0.0, 0.0],
                valid: vec![true, false, true, false, true, false],
                flows,
                field,
            }
        }

        fn view(&self) -> WaterView<'_> {
            WaterView::new(self.size, &self.amounts, &self.valid, &self.flows)
        }
    }

    #[test]
    fn lighten_moves_channels_towards_white() {
        let color = Color::new(0.0, 0.5, 1.0, 0.25).lighten(0.5);
        assert_eq!(color, Color::new(0.5, 0.75, 1.0, 0.25));
        assert_eq!(Color::new(0.2, 0.2, 0.2, 1.0).lighten(4.0).red, 1.0);
    }

    #[test]
    fn scene_describes_every_column() {
        let fixture = Fixture::new();
        let palette = Palette::default();
        let scene =
            Scene::from_view(&fixture.view(), &fixture.field, &palette, 7).expect("valid scene");

        assert_eq!(scene.columns.len(), 2);
        assert_eq!(scene.step, 7);
        assert_eq!(scene.total_water, 1.5);

        let wet = scene.column(ColumnCoord::new(0, 0)).expect("in bounds");
        assert_eq!(wet.volume, 1.5);
        assert_eq!(wet.surface, Some(1));
        assert_eq!(wet.flow, Some(FlowDirection::West));
        assert_eq!(wet.position, Vec3::new(0.5, 0.5, 1.5));
        assert_eq!(wet.shade, palette.water.lighten(0.5));

        let solid = scene.column(ColumnCoord::new(1, 0)).expect("in bounds");
        assert!(solid.is_solid(3));
        assert_eq!(solid.shade, palette.solid);
        assert_eq!(solid.surface, None);
        assert!(scene.column(ColumnCoord::new(2, 0)).is_none());
    }

    #[test]
    fn scene_rejects_mismatched_terrain() {
        let fixture = Fixture::new();
        let field = HeightField::flat(3, 1, 0);
        let error = Scene::from_view(&fixture.view(), &field, &Palette::default(), 0)
            .expect_err("terrain must match");
        assert_eq!(
            error,
            RenderingError::MismatchedTerrain {
                grid: (2, 1),
                terrain: (3, 1),
            }
        );
        assert_eq!(
            error.to_string(),
            "terrain covers 3x1 columns but the grid has 2x1"
        );
    }

    #[test]
    fn vertical_flow_shown_without_sideways_arrivals() {
        let mut mask = FlowMask::EMPTY;
        mask.insert(FlowDirection::Up);
        mask.insert(FlowDirection::Down);
        assert_eq!(dominant_flow(mask), Some(FlowDirection::Up));
        assert_eq!(dominant_flow(FlowMask::EMPTY), None);
    }

    #[test]
    fn rows_slice_columns_row_major() {
        let fixture = Fixture::new();
        let scene = Scene::from_view(&fixture.view(), &fixture.field, &Palette::default(), 0)
            .expect("valid scene");
        assert_eq!(scene.row(0).count(), 2);
        assert_eq!(scene.row(1).count(), 0);
    }
}
