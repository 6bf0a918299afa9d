use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use crate::optimizer::{Optimizer, OptimizerSnapshot, SubscriptionId};

/// One point of the loss chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LossSample {
    pub epoch: usize,
    pub step: usize,
    pub loss: f64,
}

/// The loss history of the current run.
///
/// Records the absolute loss of every gradient step. Starts over with every new run and
/// on every `reset` event (stop, reset, randomize).
pub struct LossCurve {
    samples: Mutex<Vec<LossSample>>,
    subscriptions: [SubscriptionId; 2],
}

impl LossCurve {
    /// Creates a new `LossCurve` fed by `optimizer`.
    ///
    /// # Args
    /// * `optimizer` - The optimizer to follow.
    ///
    /// # Returns
    /// The shared curve, empty until the next gradient step.
    pub fn attach(optimizer: &Optimizer) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let on_update = weak.clone();
            let update = optimizer.subscribe_update(move |snapshot| {
                if let Some(curve) = on_update.upgrade() {
                    curve.record(snapshot);
                }
            });

            let on_reset = weak.clone();
            let reset = optimizer.subscribe_reset(move |_| {
                if let Some(curve) = on_reset.upgrade() {
                    curve.clear();
                }
            });

            Self {
                samples: Mutex::new(Vec::new()),
                subscriptions: [update, reset],
            }
        })
    }

    /// Removes the curve's subscriptions from `optimizer`.
    pub fn detach(&self, optimizer: &Optimizer) {
        for id in self.subscriptions {
            optimizer.unsubscribe(id);
        }
    }

    fn record(&self, snapshot: &OptimizerSnapshot) {
        // Manual parameter edits also publish updates, they carry no loss.
        if !snapshot.is_running() {
            return;
        }

        let mut samples = self.samples.lock();
        if snapshot.current_step == 1 {
            samples.clear();
        } else if samples
            .last()
            .is_some_and(|last| last.step == snapshot.current_step)
        {
            // Parameter edit in the middle of a run, no step was taken.
            return;
        }

        samples.push(LossSample {
            epoch: snapshot.current_epoch,
            step: snapshot.current_step,
            loss: snapshot.current_loss.abs(),
        });
    }

    fn clear(&self) {
        self.samples.lock().clear();
    }

    pub fn samples(&self) -> Vec<LossSample> {
        self.samples.lock().clone()
    }

    pub fn last(&self) -> Option<LossSample> {
        self.samples.lock().last().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::{geometry::Point, optimizer::Phase};

    fn points() -> Vec<Point> {
        (0..4).map(|x| Point::new(x as f64, 2.0 * x as f64)).collect()
    }

    #[tokio::test]
    async fn records_every_step_of_a_run() {
        let opt = Optimizer::with_seed(0.01, 5);
        let curve = LossCurve::attach(&opt);

        let handle = opt.start(points(), 3, 2, Duration::ZERO).unwrap();
        handle.wait().await.unwrap();

        let samples = curve.samples();
        assert_eq!(samples.len(), 6);
        assert_eq!(samples[0].step, 1);
        assert_eq!(samples[0].epoch, 0);
        assert_eq!(samples[5].step, 6);
        assert_eq!(samples[5].epoch, 2);
        assert!(samples.iter().all(|s| s.loss >= 0.0));
    }

    #[test]
    fn reset_clears_and_manual_edits_are_skipped() {
        let opt = Optimizer::with_seed(0.01, 5);
        let curve = LossCurve::attach(&opt);

        curve.record(&running(1, -2.0));
        assert_eq!(curve.last().map(|s| s.loss), Some(2.0));

        opt.update_params(4.0, 4.0);
        assert_eq!(curve.len(), 1);

        opt.reset();
        assert!(curve.is_empty());
    }

    fn running(step: usize, loss: f64) -> OptimizerSnapshot {
        OptimizerSnapshot {
            slope: 1.0,
            intercept: 1.0,
            current_loss: loss,
            current_epoch: 0,
            current_step: step,
            phase: Phase::Running,
        }
    }

    #[test]
    fn same_step_is_recorded_once() {
        let opt = Optimizer::with_seed(0.01, 5);
        let curve = LossCurve::attach(&opt);

        curve.record(&running(1, 4.0));
        curve.record(&running(2, 3.0));
        curve.record(&running(2, 3.0));
        assert_eq!(curve.len(), 2);

        curve.record(&running(3, 2.0));
        assert_eq!(curve.last().map(|s| s.step), Some(3));
    }

    #[tokio::test]
    async fn edit_during_a_run_adds_no_sample() {
        let opt = Optimizer::with_seed(0.01, 5);
        let curve = LossCurve::attach(&opt);
        let weak = opt.downgrade();
        let armed = AtomicBool::new(true);
        opt.subscribe_update(move |snapshot| {
            if snapshot.current_step == 2 && armed.swap(false, Ordering::SeqCst) {
                if let Some(opt) = weak.upgrade() {
                    opt.update_params(snapshot.slope, snapshot.intercept);
                }
            }
        });

        let handle = opt.start(points(), 2, 1, Duration::ZERO).unwrap();
        handle.wait().await.unwrap();

        let steps: Vec<usize> = curve.samples().iter().map(|s| s.step).collect();
        assert_eq!(steps, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn a_new_run_starts_a_new_curve() {
        let opt = Optimizer::with_seed(0.01, 5);
        let curve = LossCurve::attach(&opt);

        let handle = opt.start(points(), 2, 2, Duration::ZERO).unwrap();
        handle.wait().await.unwrap();
        assert_eq!(curve.len(), 4);

        let handle = opt.start(points(), 1, 4, Duration::ZERO).unwrap();
        handle.wait().await.unwrap();
        assert_eq!(curve.len(), 1);
    }

    #[test]
    fn detach_stops_recording() {
        let opt = Optimizer::with_seed(0.01, 5);
        let curve = LossCurve::attach(&opt);
        curve.detach(&opt);

        curve.samples.lock().push(LossSample {
            epoch: 0,
            step: 1,
            loss: 1.0,
        });
        opt.reset();
        assert_eq!(curve.len(), 1);
    }
}
