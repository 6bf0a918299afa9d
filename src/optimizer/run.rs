use std::{
    num::NonZeroUsize,
    sync::{Arc, Weak},
    time::Duration,
};

use log::debug;
use tokio::{task, time};
use tokio_util::sync::CancellationToken;

use super::optimizer::Shared;
use crate::geometry::Point;

/// Immutable inputs of one training run.
pub(crate) struct RunSpec {
    pub points: Arc<[Point]>,
    pub epochs: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    pub step_delay: Duration,
}

/// Ends the run as abandoned if the loop exits without completing it, e.g. when a
/// subscriber panics. A no-op once the run has been completed, stopped or reset.
struct AbortOnDrop {
    shared: Weak<Shared>,
    run: u64,
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.abort(self.run);
        }
    }
}

/// The training loop of run `run`.
///
/// Holds the optimizer weakly so that dropping every handle ends the run at the next
/// batch. All liveness decisions are made under the state lock by `Shared`; the token
/// only shortens the wait between batches.
pub(crate) async fn train(shared: Weak<Shared>, run: u64, spec: RunSpec, token: CancellationToken) {
    let _guard = AbortOnDrop {
        shared: shared.clone(),
        run,
    };

    for epoch in 0..spec.epochs.get() {
        for batch in spec.points.chunks(spec.batch_size.get()) {
            let live = shared
                .upgrade()
                .is_some_and(|shared| shared.step(run, batch));

            if !live || !pause(&token, spec.step_delay).await {
                debug!(run = run, epoch = epoch; "training loop left mid epoch");
                return;
            }
        }

        if !shared
            .upgrade()
            .is_some_and(|shared| shared.finish_epoch(run))
        {
            return;
        }
    }

    if let Some(shared) = shared.upgrade() {
        shared.complete(run);
    }
}

/// Suspends between two batches, always yielding at least once.
///
/// # Returns
/// `false` if the run got cancelled meanwhile.
async fn pause(token: &CancellationToken, delay: Duration) -> bool {
    if delay.is_zero() {
        task::yield_now().await;
    } else {
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = time::sleep(delay) => {}
        }
    }

    !token.is_cancelled()
}
