//! TOML scenario files describing a grid, its terrain and the liquid poured into it.

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tidepool_core::{CellCoord, ColumnCoord, Command, GridSize, HeightField};
use tidepool_system_rainfall::Config as RainfallConfig;

const DEFAULT_STEPS: u32 = 120;
const DEFAULT_RENDER_EVERY: u32 = 10;

/// Parsed scenario file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    grid: GridSection,
    terrain: TerrainSection,
    #[serde(default)]
    drops: Vec<DropEntry>,
    #[serde(default)]
    seeds: Vec<SeedEntry>,
    #[serde(default)]
    rainfall: Option<RainfallSection>,
    #[serde(default)]
    run: RunSection,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct GridSection {
    width: u32,
    height: u32,
    depth: u32,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TerrainSection {
    /// Every column opens at the same layer.
    Flat { level: u32 },
    /// Interior columns open at `floor`, border columns at `rim`.
    Basin { floor: u32, rim: u32 },
    /// Explicit levels, one row per `y`.
    Rows { rows: Vec<Vec<u32>> },
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct DropEntry {
    column: [u32; 2],
    amount: f32,
    #[serde(default = "one")]
    repeat: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedEntry {
    cell: [u32; 3],
    amount: f32,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct RainfallSection {
    interval: u32,
    amount: f32,
    #[serde(default)]
    seed: u64,
    #[serde(default)]
    catchment: Vec<[u32; 2]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RunSection {
    steps: u32,
    render_every: u32,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS,
            render_every: DEFAULT_RENDER_EVERY,
        }
    }
}

const fn one() -> u32 {
    1
}

/// Step count and frame cadence of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RunSettings {
    pub(crate) steps: u32,
    pub(crate) render_every: u32,
}

impl Default for Scenario {
    /// A 12x8x6 basin with a few buckets poured into its western half.
    fn default() -> Self {
        Self {
            grid: GridSection {
                width: 12,
                height: 8,
                depth: 6,
            },
            terrain: TerrainSection::Basin { floor: 1, rim: 6 },
            drops: vec![
                DropEntry {
                    column: [3, 3],
                    amount: 1.0,
                    repeat: 8,
                },
                DropEntry {
                    column: [4, 4],
                    amount: 0.75,
                    repeat: 4,
                },
            ],
            seeds: Vec::new(),
            rainfall: None,
            run: RunSection::default(),
        }
    }
}

impl Scenario {
    /// Reads and parses the scenario stored at `path`.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario at {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("invalid scenario at {}", path.display()))
    }

    /// Parses scenario TOML.
    pub(crate) fn parse(contents: &str) -> Result<Self> {
        let scenario: Self =
            toml::from_str(contents).context("failed to parse scenario toml contents")?;
        if scenario.run.render_every == 0 {
            bail!("run.render_every must be positive");
        }
        Ok(scenario)
    }

    /// Validated dimensions of the simulated volume.
    pub(crate) fn grid_size(&self) -> Result<GridSize> {
        let GridSection {
            width,
            height,
            depth,
        } = self.grid;
        GridSize::new(width, height, depth).context("invalid [grid] section")
    }

    /// Terrain described by the `[terrain]` section.
    pub(crate) fn height_field(&self) -> Result<HeightField> {
        let GridSection { width, height, .. } = self.grid;
        let field = match &self.terrain {
            TerrainSection::Flat { level } => HeightField::flat(width, height, *level),
            TerrainSection::Basin { floor, rim } => {
                let mut field = HeightField::flat(width, height, *floor);
                let (east, south) = (width.saturating_sub(1), height.saturating_sub(1));
                field.raise(ColumnCoord::new(0, 0), ColumnCoord::new(east, 0), *rim);
                field.raise(ColumnCoord::new(0, south), ColumnCoord::new(east, south), *rim);
                field.raise(ColumnCoord::new(0, 0), ColumnCoord::new(0, south), *rim);
                field.raise(ColumnCoord::new(east, 0), ColumnCoord::new(east, south), *rim);
                field
            }
            TerrainSection::Rows { rows } => {
                HeightField::from_rows(rows.clone()).context("invalid terrain rows")?
            }
        };
        Ok(field)
    }

    /// Drops and seeds to apply before the first step, in file order.
    pub(crate) fn setup_commands(&self) -> Vec<Command> {
        let drops = self.drops.iter().flat_map(|entry| {
            let column = ColumnCoord::new(entry.column[0], entry.column[1]);
            (0..entry.repeat).map(move |_| Command::DropWater {
                column,
                amount: entry.amount,
            })
        });
        let seeds = self.seeds.iter().map(|entry| Command::SeedWater {
            cell: CellCoord::new(entry.cell[0], entry.cell[1], entry.cell[2]),
            amount: entry.amount,
        });
        drops.chain(seeds).collect()
    }

    /// Rainfall configuration with its catchment, if the scenario rains.
    ///
    /// An empty catchment covers every column of the grid.
    pub(crate) fn rainfall(&self, size: GridSize) -> Option<(RainfallConfig, Vec<ColumnCoord>)> {
        let section = self.rainfall.as_ref()?;
        let catchment = if section.catchment.is_empty() {
            size.columns().collect()
        } else {
            section
                .catchment
                .iter()
                .map(|[x, y]| ColumnCoord::new(*x, *y))
                .collect()
        };
        Some((
            RainfallConfig::new(section.interval, section.amount, section.seed),
            catchment,
        ))
    }

    /// Step count and frame cadence requested by the file.
    pub(crate) const fn run_settings(&self) -> RunSettings {
        RunSettings {
            steps: self.run.steps,
            render_every: self.run.render_every,
        }
    }
}
