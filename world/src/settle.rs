//! Settle and wake bookkeeping that lets the step loop skip idle cells.

use tidepool_core::SETTLE_COUNT_MAX;

/// Per-cell rest tracking.
///
/// A cell settles after more than [`SETTLE_COUNT_MAX`] consecutive steps in
/// which it was processed without moving any liquid. Settled cells are skipped
/// by the step loop until a neighbour wakes them.
#[derive(Clone, Debug)]
pub(crate) struct SettleBook {
    settled: Vec<bool>,
    idle_steps: Vec<u8>,
}

impl SettleBook {
    pub(crate) fn new(cell_count: usize) -> Self {
        Self {
            settled: vec![false; cell_count],
            idle_steps: vec![0; cell_count],
        }
    }

    pub(crate) fn is_settled(&self, index: usize) -> bool {
        self.settled[index]
    }

    /// Clears the settled flag so the cell is processed next step.
    pub(crate) fn wake(&mut self, index: usize) {
        self.settled[index] = false;
    }

    /// Records a processed step without outgoing flow.
    ///
    /// Returns `true` when this step pushed the cell into the settled state.
    pub(crate) fn record_idle(&mut self, index: usize) -> bool {
        let count = self.idle_steps[index].saturating_add(1);
        self.idle_steps[index] = count;
        if count > SETTLE_COUNT_MAX && !self.settled[index] {
            self.settled[index] = true;
            return true;
        }
        false
    }

    /// Records a processed step that moved liquid out of the cell.
    pub(crate) fn record_flow(&mut self, index: usize) {
        self.idle_steps[index] = 0;
    }

    /// Forgets all history of a cell whose volume dropped to zero.
    pub(crate) fn empty(&mut self, index: usize) {
        self.settled[index] = false;
        self.idle_steps[index] = 0;
    }

    pub(crate) fn clear(&mut self) {
        self.settled.fill(false);
        self.idle_steps.fill(0);
    }

    pub(crate) fn settled_count(&self) -> usize {
        self.settled.iter().filter(|settled| **settled).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settles_only_after_exceeding_idle_threshold() {
        let mut book = SettleBook::new(1);
        for _ in 0..SETTLE_COUNT_MAX {
            assert!(!book.record_idle(0));
        }
        assert!(!book.is_settled(0));
        assert!(book.record_idle(0), "threshold exceeded on the next idle step");
        assert!(book.is_settled(0));
    }

    #[test]
    fn flow_restarts_the_idle_streak() {
        let mut book = SettleBook::new(1);
        for _ in 0..SETTLE_COUNT_MAX {
            let _ = book.record_idle(0);
        }
        book.record_flow(0);
        assert!(!book.record_idle(0));
        assert!(!book.is_settled(0));
    }

    #[test]
    fn woken_cell_resettles_on_next_idle_step() {
        let mut book = SettleBook::new(2);
        for _ in 0..=SETTLE_COUNT_MAX {
            let _ = book.record_idle(1);
        }
        assert_eq!(book.settled_count(), 1);

        book.wake(1);
        assert!(!book.is_settled(1));
        assert!(book.record_idle(1));
    }

    #[test]
    fn emptied_cell_forgets_history() {
        let mut book = SettleBook::new(1);
        for _ in 0..=SETTLE_COUNT_MAX {
            let _ = book.record_idle(0);
        }
        book.empty(0);
        assert!(!book.is_settled(0));
        assert!(!book.record_idle(0));
    }
}
