use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::{GradientDescent, OptimizerErr, OptimizerSnapshot, Phase, Result};
use crate::geometry::{Line, Point};

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// Every epoch was processed.
    Completed,
    /// `stop` was called; the parameters keep their trained values.
    Stopped,
    /// `reset` was called; the parameters went back to the initial snapshot.
    Reset,
    /// The optimizer was dropped before the run ended.
    Abandoned,
}

/// The ways out of `Phase::Running`, all applied by `TrainingState::transition`.
pub(crate) enum Transition {
    Complete {
        run: u64,
    },
    Abort {
        run: u64,
    },
    Stop,
    Reset,
}

/// Bookkeeping of the run currently in flight.
struct ActiveRun {
    id: u64,
    token: CancellationToken,
    outcome: Option<oneshot::Sender<RunOutcome>>,
}

impl ActiveRun {
    fn finish(mut self, outcome: RunOutcome) {
        if let Some(tx) = self.outcome.take() {
            // The handle may have been dropped, nobody is waiting then.
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// The mutable core of an optimizer, always accessed under its lock.
pub(crate) struct TrainingState {
    line: Line,
    initial: Line,
    loss: f64,
    epoch: usize,
    step: usize,
    gd: GradientDescent,
    phase: Phase,
    last_run: u64,
    active: Option<ActiveRun>,
}

impl TrainingState {
    pub fn new(line: Line, learning_rate: f64) -> Self {
        Self {
            line,
            initial: line,
            loss: 0.0,
            epoch: 0,
            step: 0,
            gd: GradientDescent::new(learning_rate),
            phase: Phase::Idle,
            last_run: 0,
            active: None,
        }
    }

    /// Starts a new run from the initial snapshot.
    ///
    /// # Returns
    /// The id of the new run.
    ///
    /// # Errors
    /// `OptimizerErr::AlreadyRunning` if a run is in flight.
    pub fn start(
        &mut self,
        token: CancellationToken,
        outcome: oneshot::Sender<RunOutcome>,
    ) -> Result<u64> {
        if self.active.is_some() {
            return Err(OptimizerErr::AlreadyRunning);
        }

        self.last_run += 1;
        self.active = Some(ActiveRun {
            id: self.last_run,
            token,
            outcome: Some(outcome),
        });
        self.line = self.initial;
        self.clear_progress();
        self.phase = Phase::Running;
        Ok(self.last_run)
    }

    /// Applies a lifecycle transition out of a run.
    ///
    /// # Returns
    /// The id of the run that was ended, if any. Ending a run that isn't in flight is
    /// a no-op, except for `Reset` which always restores the initial parameters.
    pub fn transition(&mut self, transition: Transition) -> Option<u64> {
        match transition {
            Transition::Complete { run } => self.end(Some(run), RunOutcome::Completed),
            Transition::Abort { run } => self.end(Some(run), RunOutcome::Abandoned),
            Transition::Stop => self.end(None, RunOutcome::Stopped),
            Transition::Reset => {
                let ended = self.end(None, RunOutcome::Reset);
                self.line = self.initial;
                self.clear_progress();
                self.phase = Phase::Reset;
                ended
            }
        }
    }

    /// Ends the active run, if any and if it is `run` (any run when `None`).
    fn end(&mut self, run: Option<u64>, outcome: RunOutcome) -> Option<u64> {
        let matches = match (&self.active, run) {
            (Some(active), Some(run)) => active.id == run,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let active = self.active.take_if(|_| matches)?;
        let id = active.id;

        active.finish(outcome);
        self.clear_progress();
        self.phase = match outcome {
            RunOutcome::Completed => Phase::Completed,
            RunOutcome::Stopped | RunOutcome::Abandoned => Phase::Stopped,
            RunOutcome::Reset => Phase::Reset,
        };
        Some(id)
    }

    fn clear_progress(&mut self) {
        self.loss = 0.0;
        self.epoch = 0;
        self.step = 0;
    }

    /// Whether `run` is the run in flight.
    #[inline]
    pub fn is_live(&self, run: u64) -> bool {
        self.active.as_ref().is_some_and(|active| active.id == run)
    }

    /// The id of the run in flight.
    pub fn active_run(&self) -> Option<u64> {
        self.active.as_ref().map(|active| active.id)
    }

    /// Performs one gradient step for `run`.
    ///
    /// # Returns
    /// The state right after the step, or `None` if `run` is no longer in flight, in
    /// which case nothing was touched.
    pub fn apply_step(&mut self, run: u64, batch: &[Point]) -> Option<OptimizerSnapshot> {
        if !self.is_live(run) {
            return None;
        }

        self.loss = self.gd.step(&mut self.line, batch);
        self.step += 1;
        Some(self.snapshot())
    }

    /// Closes an epoch of `run`. Returns `false` if the run is no longer in flight.
    pub fn finish_epoch(&mut self, run: u64) -> bool {
        if !self.is_live(run) {
            return false;
        }

        self.epoch += 1;
        true
    }

    /// Sets both the current parameters and the initial snapshot.
    pub fn set_params(&mut self, line: Line) {
        self.line = line;
        self.initial = line;
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) -> Result<()> {
        if self.active.is_some() {
            return Err(OptimizerErr::AlreadyRunning);
        }

        self.gd = GradientDescent::new(learning_rate);
        Ok(())
    }

    pub fn learning_rate(&self) -> f64 {
        self.gd.learning_rate()
    }

    pub fn line(&self) -> Line {
        self.line
    }

    pub fn initial(&self) -> Line {
        self.initial
    }

    pub fn snapshot(&self) -> OptimizerSnapshot {
        OptimizerSnapshot {
            slope: self.line.slope,
            intercept: self.line.intercept,
            current_loss: self.loss,
            current_epoch: self.epoch,
            current_step: self.step,
            phase: self.phase,
        }
    }
}
