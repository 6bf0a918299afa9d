use serde::Serialize;

use crate::geometry::Line;

/// Lifecycle of an optimizer.
///
/// `Idle` only exists before the first run or reset; every run leaves the optimizer
/// in one of the terminal phases, which all accept a new `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Running,
    Completed,
    Stopped,
    Reset,
}

impl Phase {
    #[inline]
    pub fn is_running(self) -> bool {
        matches!(self, Phase::Running)
    }
}

/// Read-only view of the optimizer handed to observers on every notification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptimizerSnapshot {
    pub slope: f64,
    pub intercept: f64,
    pub current_loss: f64,
    pub current_epoch: usize,
    pub current_step: usize,
    pub phase: Phase,
}

impl OptimizerSnapshot {
    pub fn line(&self) -> Line {
        Line::new(self.slope, self.intercept)
    }

    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }
}
