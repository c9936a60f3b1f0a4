use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use tidepool_core::{ColumnCoord, Command, Event, GridSize, HeightField, StepReport};
use tidepool_system_rainfall::{Config, Rainfall};
use tidepool_world::{self as world, query, World};

fn completed_steps(count: usize) -> Vec<Event> {
    (0..count)
        .map(|index| Event::StepCompleted {
            report: StepReport {
                step: index as u64 + 1,
                ..StepReport::default()
            },
        })
        .collect()
}

fn catchment() -> Vec<ColumnCoord> {
    (0..4)
        .flat_map(|y| (0..4).map(move |x| ColumnCoord::new(x, y)))
        .collect()
}

#[test]
fn emits_one_drop_per_elapsed_interval() {
    let mut rainfall = Rainfall::new(Config::new(3, 0.4, 0x1234_5678));
    let catchment = catchment();
    let mut commands = Vec::new();

    rainfall.handle(&completed_steps(2), &catchment, &mut commands);
    assert!(commands.is_empty(), "no drop before a full interval");

    rainfall.handle(&completed_steps(7), &catchment, &mut commands);
    assert_eq!(commands.len(), 3, "nine steps elapsed over three-step intervals");

    for command in &commands {
        match command {
            Command::DropWater { column, amount } => {
                assert!(catchment.contains(column));
                assert_eq!(*amount, 0.4);
            }
            other => panic!("unexpected command emitted: {other:?}"),
        }
    }
}

#[test]
fn empty_catchment_emits_nothing() {
    let mut rainfall = Rainfall::new(Config::new(1, 0.4, 1));
    let mut commands = Vec::new();
    rainfall.handle(&completed_steps(4), &[], &mut commands);
    assert!(commands.is_empty());
}

#[test]
fn grid_reset_restarts_the_interval() {
    let mut rainfall = Rainfall::new(Config::new(2, 0.4, 0x4d59_5df4));
    let catchment = catchment();
    let mut commands = Vec::new();

    rainfall.handle(&completed_steps(1), &catchment, &mut commands);
    rainfall.handle(&[Event::GridReset], &catchment, &mut commands);
    rainfall.handle(&completed_steps(1), &catchment, &mut commands);
    assert!(commands.is_empty(), "reset discards the partial interval");

    rainfall.handle(&completed_steps(1), &catchment, &mut commands);
    assert_eq!(commands.len(), 1);
}

#[test]
fn same_seed_rains_on_the_same_columns() {
    let first = rain_fingerprint(0xdead_beef);
    let second = rain_fingerprint(0xdead_beef);
    assert_eq!(first, second, "rainfall replay diverged");
}

#[test]
fn emitted_drops_are_accepted_by_the_world() {
    let size = GridSize::new(4, 4, 4).expect("valid size");
    let mut world = World::new(size, HeightField::flat(4, 4, 1)).expect("valid world");
    let mut rainfall = Rainfall::new(Config::new(1, 7.5, 3));
    let catchment = catchment();

    let mut pending = vec![Command::Step];
    for _ in 0..20 {
        let mut events = Vec::new();
        for command in pending.drain(..) {
            world::apply(&mut world, command, &mut events);
        }
        assert!(
            !events
                .iter()
                .any(|event| matches!(event, Event::DropRejected { .. })),
            "rainfall produced a rejected drop",
        );
        rainfall.handle(&events, &catchment, &mut pending);
        pending.push(Command::Step);
    }

    assert!(query::total_water(&world) > 0.0);
}

fn rain_fingerprint(seed: u64) -> u64 {
    let mut rainfall = Rainfall::new(Config::new(1, 0.25, seed));
    let catchment = catchment();
    let mut commands = Vec::new();
    rainfall.handle(&completed_steps(64), &catchment, &mut commands);

    let mut hasher = DefaultHasher::new();
    for command in commands {
        if let Command::DropWater { column, .. } = command {
            column.hash(&mut hasher);
        }
    }
    hasher.finish()
}
