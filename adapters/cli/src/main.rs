#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs Tidepool scenarios in the terminal.

mod scenario;
mod terrain_transfer;
mod text_backend;

use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use tidepool_core::{Command, Event};
use tidepool_rendering::{Palette, Presentation, RenderingBackend, Scene};
use tidepool_system_analytics::Analytics;
use tidepool_system_rainfall::Rainfall;
use tidepool_world::{self as world, query, World};

use crate::{scenario::Scenario, text_backend::TextBackend};

#[derive(Parser, Debug)]
#[command(name = "tidepool")]
#[command(about = "Voxel fluid grid simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Pours a scenario into its grid and prints frames while it flows.
    Run(RunArgs),
    /// Prints the scenario terrain as a transfer string.
    Terrain(TerrainArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Scenario TOML file; the built-in basin is used when omitted.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Number of steps to simulate, overriding the scenario.
    #[arg(long)]
    steps: Option<u32>,

    /// Steps between printed frames, overriding the scenario.
    #[arg(long)]
    render_every: Option<u32>,

    /// Terrain transfer string replacing the scenario terrain.
    #[arg(long)]
    terrain: Option<String>,
}

#[derive(Args, Debug)]
struct TerrainArgs {
    /// Scenario TOML file; the built-in basin is used when omitted.
    #[arg(long)]
    scenario: Option<PathBuf>,
}

/// Entry point for the Tidepool command-line interface.
fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        CliCommand::Run(args) => run(args),
        CliCommand::Terrain(args) => print_terrain(args),
    }
}

fn load_scenario(path: Option<&Path>) -> Result<Scenario> {
    match path {
        Some(path) => Scenario::load(path),
        None => Ok(Scenario::default()),
    }
}

fn print_terrain(args: TerrainArgs) -> Result<()> {
    let scenario = load_scenario(args.scenario.as_deref())?;
    let field = scenario.height_field()?;
    let encoded = terrain_transfer::encode(&field).context("failed to encode terrain")?;
    println!("{encoded}");
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let scenario = load_scenario(args.scenario.as_deref())?;
    let size = scenario.grid_size()?;
    let height_field = match args.terrain.as_deref() {
        Some(encoded) => {
            let field = terrain_transfer::decode(encoded).context("invalid --terrain string")?;
            if field.width() != size.width() || field.height() != size.height() {
                bail!(
                    "terrain covers {}x{} columns but the grid has {}x{}",
                    field.width(),
                    field.height(),
                    size.width(),
                    size.height()
                );
            }
            field
        }
        None => scenario.height_field()?,
    };

    let mut settings = scenario.run_settings();
    if let Some(steps) = args.steps {
        settings.steps = steps;
    }
    if let Some(render_every) = args.render_every {
        if render_every == 0 {
            bail!("--render-every must be positive");
        }
        settings.render_every = render_every;
    }

    let mut world = World::new(size, height_field).context("failed to build the grid")?;
    let mut analytics = Analytics::new();
    let mut rainfall = scenario
        .rainfall(size)
        .map(|(config, catchment)| (Rainfall::new(config), catchment));

    let mut setup = Vec::new();
    for command in scenario.setup_commands() {
        world::apply(&mut world, command, &mut setup);
    }
    let mut published = Vec::new();
    analytics.handle(&setup, query::water_view(&world), &mut published);
    info!(
        "poured {:.3} into a {}x{}x{} grid",
        query::total_water(&world),
        size.width(),
        size.height(),
        size.depth()
    );

    let palette = Palette::default();
    let scene = snapshot(&world, &palette)?;
    let presentation = Presentation::new("tidepool", palette, scene);
    let backend = TextBackend::new(io::stdout().lock(), settings.render_every);

    let mut remaining = settings.steps;
    backend.run(presentation, |scene| {
        if remaining == 0 {
            return false;
        }
        remaining -= 1;

        let mut events = Vec::new();
        world::apply(&mut world, Command::Step, &mut events);
        analytics.handle(&events, query::water_view(&world), &mut published);

        if let Some((rainfall, catchment)) = rainfall.as_mut() {
            let mut commands = Vec::new();
            rainfall.handle(&events, catchment, &mut commands);
            let mut rain = Vec::new();
            for command in commands {
                world::apply(&mut world, command, &mut rain);
            }
            analytics.handle(&rain, query::water_view(&world), &mut published);
        }

        match snapshot(&world, &palette) {
            Ok(next) => {
                *scene = next;
                true
            }
            Err(error) => {
                error!("failed to refresh the scene: {error:#}");
                false
            }
        }
    })?;

    if let Some(stats) = analytics.last_stats() {
        info!(
            "finished after {} steps: {:.4} held across {} wet cells, {} settled, drift {:.6}",
            stats.step, stats.total_water, stats.wet_cells, stats.settled_cells, stats.drift
        );
    }
    let updates = published
        .iter()
        .filter(|event| matches!(event, Event::AnalyticsUpdated { .. }))
        .count();
    info!("published {updates} analytics updates");
    Ok(())
}

fn snapshot(world: &World, palette: &Palette) -> Result<Scene> {
    Scene::from_view(
        &query::water_view(world),
        query::height_field(world),
        palette,
        query::step_index(world),
    )
    .context("terrain does not match the grid")
}
