use std::{
    fmt,
    num::NonZeroUsize,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::{debug, info, trace};
use parking_lot::{Mutex, ReentrantMutex};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::{runtime, sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{
    OptimizerErr, OptimizerSnapshot, Phase, Result, RunOutcome,
    run::{self, RunSpec},
    state::{TrainingState, Transition},
    subscribers::{Callback, SubscriptionId, Subscribers},
};
use crate::geometry::{Line, Point};

/// State shared between the optimizer handles and the run loop.
pub(crate) struct Shared {
    state: Mutex<TrainingState>,
    /// Serializes notification rounds against lifecycle commands. Re-entrant so that a
    /// subscriber may issue commands from inside a round.
    dispatch: ReentrantMutex<()>,
    updates: Subscribers,
    resets: Subscribers,
    next_subscription: AtomicU64,
    rng: Mutex<StdRng>,
}

impl Shared {
    /// Performs one gradient step of `run` and publishes it.
    ///
    /// # Returns
    /// `false` if `run` is no longer in flight, in which case nothing happened.
    pub(crate) fn step(&self, run: u64, batch: &[Point]) -> bool {
        let _dispatch = self.dispatch.lock();

        let Some(snapshot) = self.state.lock().apply_step(run, batch) else {
            return false;
        };

        trace!(
            run = run,
            step = snapshot.current_step,
            loss = snapshot.current_loss;
            "gradient step"
        );

        self.notify(&self.updates, Some(run), &snapshot);
        true
    }

    pub(crate) fn finish_epoch(&self, run: u64) -> bool {
        let mut state = self.state.lock();
        if !state.finish_epoch(run) {
            return false;
        }

        let snapshot = state.snapshot();
        debug!(
            run = run,
            epoch = snapshot.current_epoch,
            loss = snapshot.current_loss;
            "epoch finished"
        );
        true
    }

    pub(crate) fn complete(&self, run: u64) {
        if let Some(run) = self.state.lock().transition(Transition::Complete { run }) {
            info!(run = run; "training run completed");
        }
    }

    pub(crate) fn abort(&self, run: u64) {
        if let Some(run) = self.state.lock().transition(Transition::Abort { run }) {
            info!(run = run; "training run abandoned");
        }
    }

    /// Runs one notification round over a copy of `subscribers`.
    ///
    /// For update rounds of a run, liveness is re-checked before every callback so that
    /// nothing is published once a subscriber (or anyone else) has ended the run.
    fn notify(&self, subscribers: &Subscribers, run: Option<u64>, snapshot: &OptimizerSnapshot) {
        for callback in subscribers.snapshot() {
            if let Some(run) = run {
                if !self.state.lock().is_live(run) {
                    trace!(run = run; "run ended mid round");
                    break;
                }
            }

            callback(snapshot);
        }
    }

    fn subscribe(&self, subscribers: &Subscribers, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        subscribers.push(id, callback);
        id
    }
}

/// Incremental gradient-descent trainer of a line.
///
/// Training runs on a tokio task in the background and publishes an `update` event
/// after every gradient step. `stop`, `reset`, `randomize_params` publish `reset`
/// events and `update_params` publishes an `update` event. Subscribers receive a
/// snapshot of the optimizer and are called synchronously, in registration order, on
/// whichever thread issued the event.
///
/// Cloning gives another handle to the same optimizer.
#[derive(Clone)]
pub struct Optimizer {
    shared: Arc<Shared>,
}

/// A non-owning handle, for subscribers that need to issue commands.
#[derive(Clone)]
pub struct WeakOptimizer {
    shared: Weak<Shared>,
}

impl WeakOptimizer {
    pub fn upgrade(&self) -> Option<Optimizer> {
        self.shared.upgrade().map(|shared| Optimizer { shared })
    }
}

/// Handle of a run in flight.
#[derive(Debug)]
pub struct RunHandle {
    id: u64,
    task: JoinHandle<()>,
    outcome: oneshot::Receiver<RunOutcome>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the run loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the run loop to exit.
    ///
    /// # Returns
    /// How the run ended.
    ///
    /// # Errors
    /// `OptimizerErr::Join` if the run task panicked or was aborted.
    pub async fn wait(self) -> Result<RunOutcome> {
        self.task
            .await
            .map_err(|e| OptimizerErr::Join(e.to_string()))?;

        Ok(self.outcome.await.unwrap_or(RunOutcome::Abandoned))
    }
}

impl Optimizer {
    /// Creates a new `Optimizer` with random parameters in `[0, 1)`.
    ///
    /// # Arguments
    /// * `learning_rate` - The step size used by every run.
    ///
    /// # Returns
    /// An idle optimizer.
    pub fn new(learning_rate: f64) -> Self {
        Self::with_rng(learning_rate, StdRng::from_os_rng())
    }

    /// Creates a new `Optimizer` whose random parameters derive from `seed`.
    pub fn with_seed(learning_rate: f64, seed: u64) -> Self {
        Self::with_rng(learning_rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(learning_rate: f64, mut rng: StdRng) -> Self {
        let line = random_line(&mut rng);
        debug!(
            slope = line.slope,
            intercept = line.intercept,
            learning_rate = learning_rate;
            "optimizer created"
        );

        let shared = Shared {
            state: Mutex::new(TrainingState::new(line, learning_rate)),
            dispatch: ReentrantMutex::new(()),
            updates: Subscribers::default(),
            resets: Subscribers::default(),
            next_subscription: AtomicU64::new(0),
            rng: Mutex::new(rng),
        };

        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn downgrade(&self) -> WeakOptimizer {
        WeakOptimizer {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Registers `callback` for `update` events.
    pub fn subscribe_update<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OptimizerSnapshot) + Send + Sync + 'static,
    {
        self.shared.subscribe(&self.shared.updates, Arc::new(callback))
    }

    /// Registers `callback` for `reset` events.
    pub fn subscribe_reset<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OptimizerSnapshot) + Send + Sync + 'static,
    {
        self.shared.subscribe(&self.shared.resets, Arc::new(callback))
    }

    /// Removes a subscription of either kind.
    ///
    /// # Returns
    /// Whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.updates.remove(id) || self.shared.resets.remove(id)
    }

    /// Starts a training run in the background.
    ///
    /// The parameters are first restored to the initial snapshot, so every run starts
    /// from the last externally set point.
    ///
    /// # Arguments
    /// * `points` - The dataset, split into batches in order.
    /// * `epochs` - The amount of passes over the dataset.
    /// * `batch_size` - The amount of points per gradient step.
    /// * `step_delay` - The pause after every step.
    ///
    /// # Returns
    /// A handle to await the run.
    ///
    /// # Errors
    /// * `OptimizerErr::InvalidArgument` if `epochs` or `batch_size` is zero or `points` is empty.
    /// * `OptimizerErr::AlreadyRunning` if a run is in flight.
    /// * `OptimizerErr::NoRuntime` if not called from within a tokio runtime.
    pub fn start(
        &self,
        points: Vec<Point>,
        epochs: usize,
        batch_size: usize,
        step_delay: Duration,
    ) -> Result<RunHandle> {
        let epochs = NonZeroUsize::new(epochs)
            .ok_or(OptimizerErr::InvalidArgument("epochs must be at least 1"))?;
        let batch_size = NonZeroUsize::new(batch_size)
            .ok_or(OptimizerErr::InvalidArgument("batch size must be at least 1"))?;
        if points.is_empty() {
            return Err(OptimizerErr::InvalidArgument("dataset is empty"));
        }

        let runtime = runtime::Handle::try_current().map_err(|_| OptimizerErr::NoRuntime)?;

        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let id = self.shared.state.lock().start(token.clone(), tx)?;

        info!(
            run = id,
            points = points.len(),
            epochs = epochs.get(),
            batch_size = batch_size.get(),
            step_delay_ms = step_delay.as_millis() as u64;
            "training run started"
        );

        let spec = RunSpec {
            points: points.into(),
            epochs,
            batch_size,
            step_delay,
        };

        let task = runtime.spawn(run::train(Arc::downgrade(&self.shared), id, spec, token));

        Ok(RunHandle {
            id,
            task,
            outcome: rx,
        })
    }

    /// Aborts the run in flight, keeping the trained parameters. No-op when idle.
    pub fn stop(&self) {
        let _dispatch = self.shared.dispatch.lock();

        let (ended, snapshot) = {
            let mut state = self.shared.state.lock();
            (state.transition(Transition::Stop), state.snapshot())
        };

        if let Some(run) = ended {
            info!(run = run; "training run stopped");
            self.shared.notify(&self.shared.resets, None, &snapshot);
        }
    }

    /// Aborts the run in flight, if any, and restores the initial parameters.
    pub fn reset(&self) {
        let _dispatch = self.shared.dispatch.lock();

        let (ended, snapshot) = {
            let mut state = self.shared.state.lock();
            (state.transition(Transition::Reset), state.snapshot())
        };

        if let Some(run) = ended {
            info!(run = run; "training run reset");
        }
        self.shared.notify(&self.shared.resets, None, &snapshot);
    }

    /// Overrides the parameters, e.g. from a drag gesture. Later resets come back here.
    pub fn update_params(&self, slope: f64, intercept: f64) {
        self.set_params(Line::new(slope, intercept), false);
    }

    /// Draws new parameters in `[0, 1)`. Later resets come back here.
    pub fn randomize_params(&self) {
        let line = random_line(&mut *self.shared.rng.lock());
        self.set_params(line, true);
    }

    fn set_params(&self, line: Line, as_reset: bool) {
        let _dispatch = self.shared.dispatch.lock();

        let snapshot = {
            let mut state = self.shared.state.lock();
            state.set_params(line);
            state.snapshot()
        };

        debug!(slope = line.slope, intercept = line.intercept; "parameters set");

        let subscribers = if as_reset {
            &self.shared.resets
        } else {
            &self.shared.updates
        };
        self.shared.notify(subscribers, None, &snapshot);
    }

    /// Changes the learning rate used by the next run.
    ///
    /// # Errors
    /// `OptimizerErr::AlreadyRunning` if a run is in flight.
    pub fn set_learning_rate(&self, learning_rate: f64) -> Result<()> {
        self.shared.state.lock().set_learning_rate(learning_rate)
    }

    pub fn learning_rate(&self) -> f64 {
        self.shared.state.lock().learning_rate()
    }

    pub fn snapshot(&self) -> OptimizerSnapshot {
        self.shared.state.lock().snapshot()
    }

    pub fn line(&self) -> Line {
        self.shared.state.lock().line()
    }

    /// The parameters a reset or a new run goes back to.
    pub fn initial_line(&self) -> Line {
        self.shared.state.lock().initial()
    }

    pub fn slope(&self) -> f64 {
        self.line().slope
    }

    pub fn intercept(&self) -> f64 {
        self.line().intercept
    }

    pub fn current_loss(&self) -> f64 {
        self.snapshot().current_loss
    }

    pub fn current_epoch(&self) -> usize {
        self.snapshot().current_epoch
    }

    pub fn current_step(&self) -> usize {
        self.snapshot().current_step
    }

    pub fn phase(&self) -> Phase {
        self.snapshot().phase
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().active_run().is_some()
    }
}

impl fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Optimizer")
            .field("snapshot", &self.snapshot())
            .field("learning_rate", &self.learning_rate())
            .finish()
    }
}

fn random_line<R: Rng>(rng: &mut R) -> Line {
    Line::new(rng.random(), rng.random())
}
