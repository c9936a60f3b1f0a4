use tidepool_core::{CellCoord, ColumnCoord, Command, Event, FlowStats, GridSize, HeightField};
use tidepool_system_analytics::Analytics;
use tidepool_world::{self as world, query, World};

fn basin() -> World {
    let size = GridSize::new(5, 5, 4).expect("valid size");
    let mut field = HeightField::flat(5, 5, 4);
    let mut levels = field.levels().to_vec();
    for y in 1..4 {
        for x in 1..4 {
            levels[x + y * 5] = 0;
        }
    }
    field = HeightField::from_levels(5, 5, levels).expect("valid field");
    World::new(size, field).expect("valid world")
}

fn run(world: &mut World, analytics: &mut Analytics, command: Command) -> Vec<FlowStats> {
    let mut events = Vec::new();
    world::apply(world, command, &mut events);

    let mut published = Vec::new();
    analytics.handle(&events, query::water_view(world), &mut published);
    published
        .into_iter()
        .filter_map(|event| match event {
            Event::AnalyticsUpdated { stats } => Some(stats),
            _ => None,
        })
        .collect()
}

#[test]
fn publishes_only_after_steps() {
    let mut world = basin();
    let mut analytics = Analytics::new();

    let published = run(
        &mut world,
        &mut analytics,
        Command::DropWater {
            column: ColumnCoord::new(2, 2),
            amount: 0.75,
        },
    );
    assert!(published.is_empty(), "drops alone publish nothing");
    assert_eq!(analytics.ledger().injected(), 0.75);

    let published = run(&mut world, &mut analytics, Command::Step);
    assert_eq!(published.len(), 1);
    let stats = published[0];
    assert_eq!(stats.step, 1);
    assert!((stats.total_water - 0.75).abs() < 1e-5);
    assert!(stats.drift.abs() < 1e-5);
    assert_eq!(analytics.last_stats(), Some(&stats));
}

#[test]
fn seeds_record_net_volume_change() {
    let mut world = basin();
    let mut analytics = Analytics::new();
    let cell = CellCoord::new(1, 1, 0);

    let _ = run(
        &mut world,
        &mut analytics,
        Command::SeedWater { cell, amount: 2.0 },
    );
    let _ = run(
        &mut world,
        &mut analytics,
        Command::SeedWater { cell, amount: 0.5 },
    );
    assert_eq!(analytics.ledger().injected(), 0.5);

    let stats = run(&mut world, &mut analytics, Command::Step);
    assert!((stats[0].expected_water - 0.5).abs() < 1e-5);
}

#[test]
fn ledger_tracks_volume_through_spreading() {
    let mut world = basin();
    let mut analytics = Analytics::new();
    for (x, y) in [(1, 1), (3, 3), (2, 1)] {
        for _ in 0..3 {
            let _ = run(
                &mut world,
                &mut analytics,
                Command::DropWater {
                    column: ColumnCoord::new(x, y),
                    amount: 0.9,
                },
            );
        }
    }

    let mut last = None;
    for _ in 0..60 {
        let published = run(&mut world, &mut analytics, Command::Step);
        last = published.last().copied();
        let stats = last.expect("every step publishes");
        assert!(
            stats.drift.abs() < 1e-3,
            "step {} drifted by {}",
            stats.step,
            stats.drift
        );
    }

    let stats = last.expect("stats published");
    assert!(stats.wet_cells > 0);
    assert!(stats.deepest_column.is_some());
    assert!(stats.max_column_volume > 0.0);
}

#[test]
fn reset_clears_the_ledger() {
    let mut world = basin();
    let mut analytics = Analytics::new();
    let _ = run(
        &mut world,
        &mut analytics,
        Command::DropWater {
            column: ColumnCoord::new(2, 2),
            amount: 1.0,
        },
    );
    let _ = run(&mut world, &mut analytics, Command::Step);
    let _ = run(&mut world, &mut analytics, Command::Reset);

    assert_eq!(analytics.ledger().expected(), 0.0);
    assert!(analytics.last_stats().is_none());

    let stats = run(&mut world, &mut analytics, Command::Step);
    assert_eq!(stats[0].step, 1);
    assert_eq!(stats[0].wet_cells, 0);
    assert_eq!(stats[0].deepest_column, None);
}

#[test]
fn reset_discards_steps_earlier_in_the_batch() {
    let mut world = basin();
    let mut analytics = Analytics::new();
    let mut events = Vec::new();
    world::apply(
        &mut world,
        Command::DropWater {
            column: ColumnCoord::new(2, 2),
            amount: 1.0,
        },
        &mut events,
    );
    world::apply(&mut world, Command::Step, &mut events);
    world::apply(&mut world, Command::Reset, &mut events);

    let mut published = Vec::new();
    analytics.handle(&events, query::water_view(&world), &mut published);
    assert!(published.is_empty(), "the reset wipes the pending step");
    assert_eq!(analytics.ledger().expected(), 0.0);

    let mut events = Vec::new();
    world::apply(
        &mut world,
        Command::DropWater {
            column: ColumnCoord::new(1, 1),
            amount: 0.5,
        },
        &mut events,
    );
    world::apply(&mut world, Command::Step, &mut events);
    analytics.handle(&events, query::water_view(&world), &mut published);
    assert_eq!(published.len(), 1);
    let Event::AnalyticsUpdated { stats } = published[0] else {
        panic!("expected analytics update, found {:?}", published[0]);
    };
    assert_eq!(stats.step, 1);
    assert!((stats.expected_water - 0.5).abs() < 1e-5);
    assert!(stats.drift.abs() < 1e-5);
}
