#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic rainfall system responsible for emitting drop commands.

use log::trace;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tidepool_core::{ColumnCoord, Command, Event, MAX_WATER, MIN_WATER};

/// Configuration parameters required to construct the rainfall system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    interval_steps: u32,
    amount: f32,
    seed: u64,
}

impl Config {
    /// Creates a configuration dropping `amount` every `interval_steps` steps.
    #[must_use]
    pub const fn new(interval_steps: u32, amount: f32, seed: u64) -> Self {
        Self {
            interval_steps,
            amount,
            seed,
        }
    }
}

/// Pure system that deterministically rains onto a catchment of columns.
#[derive(Debug)]
pub struct Rainfall {
    interval_steps: u32,
    amount: f32,
    elapsed_steps: u32,
    rng: ChaCha8Rng,
}

impl Rainfall {
    /// Creates a new rainfall system using the supplied configuration.
    ///
    /// The configured amount is clamped into the accepted drop range.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let amount = if config.amount.is_nan() {
            MIN_WATER
        } else {
            config.amount.clamp(MIN_WATER, MAX_WATER)
        };
        Self {
            interval_steps: config.interval_steps,
            amount,
            elapsed_steps: 0,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
        }
    }

    /// Volume carried by every emitted drop.
    #[must_use]
    pub const fn amount(&self) -> f32 {
        self.amount
    }

    /// Consumes world events and emits one drop per elapsed interval.
    pub fn handle(&mut self, events: &[Event], catchment: &[ColumnCoord], out: &mut Vec<Command>) {
        let mut completed = 0_u32;
        for event in events {
            match event {
                Event::StepCompleted { .. } => completed = completed.saturating_add(1),
                Event::GridReset => {
                    self.elapsed_steps = 0;
                    completed = 0;
                }
                _ => {}
            }
        }

        if self.interval_steps == 0 || catchment.is_empty() || completed == 0 {
            return;
        }

        self.elapsed_steps = self.elapsed_steps.saturating_add(completed);
        while self.elapsed_steps >= self.interval_steps {
            self.elapsed_steps -= self.interval_steps;
            let column = self.select_column(catchment);
            trace!("raining {} onto {column:?}", self.amount);
            out.push(Command::DropWater {
                column,
                amount: self.amount,
            });
        }
    }

    fn select_column(&mut self, catchment: &[ColumnCoord]) -> ColumnCoord {
        debug_assert!(!catchment.is_empty(), "select_column requires a catchment");
        catchment[self.rng.gen_range(0..catchment.len())]
    }
}
