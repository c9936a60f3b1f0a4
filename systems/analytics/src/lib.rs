#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic analytics system that audits fluid volume after every step.

mod metrics;

use log::{debug, warn};
use tidepool_core::{Event, FlowStats, StepReport, WaterView};

pub use metrics::{column_volumes, deepest_column, wet_cell_count};

/// Drift beyond which a published report is logged as a warning.
const DRIFT_WARNING: f32 = 1e-3;

/// Running account of every volume change the world reported.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VolumeLedger {
    injected: f64,
    discarded: f64,
    floored: f64,
}

impl VolumeLedger {
    /// Net volume added by drops and seeds.
    #[must_use]
    pub const fn injected(&self) -> f64 {
        self.injected
    }

    /// Volume removed by the residual sink and by snapping to zero.
    #[must_use]
    pub const fn discarded(&self) -> f64 {
        self.discarded
    }

    /// Volume added by lifting sub-threshold cells.
    #[must_use]
    pub const fn floored(&self) -> f64 {
        self.floored
    }

    /// Volume the grid should hold given every recorded change.
    #[must_use]
    pub fn expected(&self) -> f64 {
        self.injected + self.floored - self.discarded
    }

    fn record_step(&mut self, report: &StepReport) {
        self.discarded += f64::from(report.discarded_volume);
        self.floored += f64::from(report.floored_volume);
    }
}

/// Pure analytics system that publishes flow statistics.
#[derive(Debug, Default)]
pub struct Analytics {
    ledger: VolumeLedger,
    last_stats: Option<FlowStats>,
    column_scratch: Vec<f32>,
}

impl Analytics {
    /// Creates a new analytics system with an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ledger accumulated so far.
    #[must_use]
    pub const fn ledger(&self) -> &VolumeLedger {
        &self.ledger
    }

    /// Returns the last statistics published by the system, if any.
    #[must_use]
    pub fn last_stats(&self) -> Option<&FlowStats> {
        self.last_stats.as_ref()
    }

    /// Consumes world events and publishes statistics when a step completed.
    ///
    /// At most one [`Event::AnalyticsUpdated`] is emitted per call; it describes
    /// the most recent step in `events` and the state captured by `view`.
    ///
    /// Events are consumed in order. A [`Event::GridReset`] discards everything
    /// recorded before it, so a step completed earlier in the same batch is
    /// never published. Hosts pass one world command's events per batch.
    pub fn handle(&mut self, events: &[Event], view: WaterView<'_>, out: &mut Vec<Event>) {
        let mut latest: Option<StepReport> = None;

        for event in events {
            match event {
                Event::WaterDropped { amount, .. } => self.ledger.injected += f64::from(*amount),
                Event::WaterSeeded {
                    previous, amount, ..
                } => self.ledger.injected += f64::from(*amount) - f64::from(*previous),
                Event::StepCompleted { report } => {
                    self.ledger.record_step(report);
                    latest = Some(*report);
                }
                Event::GridReset => {
                    self.ledger = VolumeLedger::default();
                    self.last_stats = None;
                    latest = None;
                }
                _ => {}
            }
        }

        let Some(report) = latest else {
            return;
        };

        let expected_water = self.ledger.expected() as f32;
        let deepest = deepest_column(&view, &mut self.column_scratch);
        let stats = FlowStats {
            step: report.step,
            total_water: report.total_water,
            expected_water,
            drift: report.total_water - expected_water,
            wet_cells: u32::try_from(wet_cell_count(&view)).unwrap_or(u32::MAX),
            settled_cells: report.settled_cells,
            deepest_column: deepest.map(|(column, _)| column),
            max_column_volume: deepest.map_or(0.0, |(_, volume)| volume),
        };

        if stats.drift.abs() > DRIFT_WARNING {
            warn!(
                "volume drift {:.5} after step {} (held {:.4}, expected {:.4})",
                stats.drift, stats.step, stats.total_water, stats.expected_water
            );
        } else {
            debug!(
                "step {} holds {:.4} across {} wet cells",
                stats.step, stats.total_water, stats.wet_cells
            );
        }

        self.last_stats = Some(stats);
        out.push(Event::AnalyticsUpdated { stats });
    }
}
