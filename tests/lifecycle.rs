use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};

use gdviz::{
    geometry::{Line, Point},
    observe::LossCurve,
    optimizer::{Optimizer, OptimizerErr, OptimizerSnapshot, Phase, RunHandle, RunOutcome},
};

const WAIT: Duration = Duration::from_secs(10);

fn dataset(n: usize) -> Vec<Point> {
    (0..n)
        .map(|i| Point::new(i as f64 / n as f64, 0.5 + i as f64 / n as f64))
        .collect()
}

fn recorder(opt: &Optimizer) -> Arc<Mutex<Vec<OptimizerSnapshot>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    opt.subscribe_update(move |snapshot| sink.lock().push(*snapshot));
    seen
}

fn counter() -> (Arc<AtomicUsize>, impl Fn(&OptimizerSnapshot) + Send + Sync + 'static) {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    (hits, move |_: &OptimizerSnapshot| {
        h.fetch_add(1, Ordering::SeqCst);
    })
}

async fn finish(handle: RunHandle) -> RunOutcome {
    let outcome = timeout(WAIT, handle.wait()).await;
    assert_ok!(assert_ok!(outcome))
}

#[tokio::test]
async fn completed_run_publishes_every_step_then_clears_counters() {
    let opt = Optimizer::with_seed(0.05, 1);
    let seen = recorder(&opt);
    let (resets, on_reset) = counter();
    opt.subscribe_reset(on_reset);

    // 10 points in batches of 4: 3 steps per epoch.
    let handle = assert_ok!(opt.start(dataset(10), 3, 4, Duration::ZERO));
    assert!(opt.is_running());
    assert_eq!(finish(handle).await, RunOutcome::Completed);

    let seen = seen.lock();
    let steps: Vec<usize> = seen.iter().map(|s| s.current_step).collect();
    assert_eq!(steps, (1..=9).collect::<Vec<_>>());
    let epochs: Vec<usize> = seen.iter().map(|s| s.current_epoch).collect();
    assert_eq!(epochs, vec![0, 0, 0, 1, 1, 1, 2, 2, 2]);
    assert!(seen.iter().all(|s| s.phase == Phase::Running));

    let snap = opt.snapshot();
    assert!(!opt.is_running());
    assert_eq!(snap.phase, Phase::Completed);
    assert_eq!((snap.current_step, snap.current_epoch, snap.current_loss), (0, 0, 0.0));
    assert_eq!(snap.line(), seen[8].line());
    assert_eq!(resets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn start_while_running_fails_and_keeps_the_run() {
    let opt = Optimizer::with_seed(0.01, 2);
    let handle = assert_ok!(opt.start(dataset(4), 1_000, 1, Duration::from_millis(1)));

    let err = assert_err!(opt.start(dataset(4), 1, 1, Duration::ZERO));
    assert_eq!(err, OptimizerErr::AlreadyRunning);
    assert_eq!(
        opt.set_learning_rate(1.0),
        Err(OptimizerErr::AlreadyRunning)
    );
    assert!(opt.is_running());

    opt.stop();
    assert_eq!(finish(handle).await, RunOutcome::Stopped);
}

#[tokio::test]
async fn invalid_arguments_change_nothing() {
    let opt = Optimizer::with_seed(0.01, 3);
    let before = opt.snapshot();
    let seen = recorder(&opt);

    assert_err!(opt.start(Vec::new(), 1, 1, Duration::ZERO));
    assert_err!(opt.start(dataset(3), 0, 1, Duration::ZERO));
    assert_err!(opt.start(dataset(3), 1, 0, Duration::ZERO));

    assert_eq!(opt.snapshot(), before);
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn stop_halts_updates_and_keeps_trained_params() {
    let opt = Optimizer::with_seed(0.1, 4);
    opt.update_params(0.0, 0.0);
    let seen = recorder(&opt);
    let (resets, on_reset) = counter();
    opt.subscribe_reset(on_reset);

    let handle = assert_ok!(opt.start(dataset(8), 10_000, 2, Duration::from_millis(1)));
    sleep(Duration::from_millis(30)).await;

    opt.stop();
    let at_stop = seen.lock().len();
    assert!(at_stop > 0);
    assert!(!opt.is_running());
    assert_eq!(resets.load(Ordering::SeqCst), 1);

    let trained = opt.line();
    assert_ne!(trained, Line::new(0.0, 0.0));
    assert_eq!(trained, seen.lock()[at_stop - 1].line());

    assert_eq!(finish(handle).await, RunOutcome::Stopped);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(seen.lock().len(), at_stop);

    let snap = opt.snapshot();
    assert_eq!(snap.phase, Phase::Stopped);
    assert_eq!((snap.current_step, snap.current_epoch, snap.current_loss), (0, 0, 0.0));

    // A new run starts over from the last externally set parameters.
    let handle = assert_ok!(opt.start(dataset(8), 1, 8, Duration::ZERO));
    assert_eq!(opt.line(), Line::new(0.0, 0.0));
    assert_eq!(opt.current_step(), 0);
    assert_eq!(finish(handle).await, RunOutcome::Completed);
}

#[tokio::test]
async fn reset_mid_run_restores_the_initial_snapshot() {
    let opt = Optimizer::with_seed(0.1, 5);
    opt.update_params(2.0, -1.0);
    let (resets, on_reset) = counter();
    opt.subscribe_reset(on_reset);

    let handle = assert_ok!(opt.start(dataset(8), 10_000, 1, Duration::from_millis(1)));
    sleep(Duration::from_millis(20)).await;
    opt.reset();

    assert_eq!(finish(handle).await, RunOutcome::Reset);
    assert_eq!(opt.line(), Line::new(2.0, -1.0));
    assert_eq!(opt.phase(), Phase::Reset);
    assert_eq!(resets.load(Ordering::SeqCst), 1);

    opt.reset();
    assert_eq!(resets.load(Ordering::SeqCst), 2);
    assert_eq!(opt.line(), Line::new(2.0, -1.0));
}

#[tokio::test]
async fn stop_from_inside_an_update_round() {
    let opt = Optimizer::with_seed(0.01, 6);
    let weak = opt.downgrade();
    opt.subscribe_update(move |snapshot| {
        if snapshot.current_step == 3 {
            if let Some(opt) = weak.upgrade() {
                opt.stop();
            }
        }
    });
    let seen = recorder(&opt);
    let (resets, on_reset) = counter();
    opt.subscribe_reset(on_reset);

    let handle = assert_ok!(opt.start(dataset(10), 100, 1, Duration::ZERO));
    assert_eq!(finish(handle).await, RunOutcome::Stopped);

    let steps: Vec<usize> = seen.lock().iter().map(|s| s.current_step).collect();
    assert_eq!(steps, vec![1, 2]);
    assert_eq!(resets.load(Ordering::SeqCst), 1);
    assert!(!opt.is_running());
}

#[tokio::test]
async fn dropping_the_optimizer_abandons_the_run() {
    let opt = Optimizer::with_seed(0.01, 7);
    let handle = assert_ok!(opt.start(dataset(4), 1_000, 1, Duration::ZERO));
    drop(opt);

    assert_eq!(finish(handle).await, RunOutcome::Abandoned);
}

#[tokio::test]
async fn panicking_subscriber_ends_the_run() {
    let opt = Optimizer::with_seed(0.01, 8);
    opt.subscribe_update(|snapshot| {
        if snapshot.current_step == 2 {
            panic!("subscriber failure");
        }
    });

    let handle = assert_ok!(opt.start(dataset(4), 10, 1, Duration::ZERO));
    let res = assert_ok!(timeout(WAIT, handle.wait()).await);
    assert!(matches!(res, Err(OptimizerErr::Join(_))));

    assert!(!opt.is_running());
    assert_eq!(opt.phase(), Phase::Stopped);
    assert_ok!(opt.start(dataset(4), 1, 4, Duration::ZERO));
}

#[tokio::test]
async fn huge_learning_rate_diverges_without_error() {
    let opt = Optimizer::with_seed(10.0, 9);
    let points: Vec<Point> = (0..10).map(|x| Point::new(x as f64, 3.0 * x as f64)).collect();

    let handle = assert_ok!(opt.start(points, 500, 10, Duration::ZERO));
    assert_eq!(finish(handle).await, RunOutcome::Completed);

    let line = opt.line();
    assert!(!(line.slope.is_finite() && line.intercept.is_finite()));
}

#[tokio::test]
async fn stop_clears_the_loss_curve_after_its_last_sample_is_read() {
    let opt = Optimizer::with_seed(0.1, 10);
    let curve = LossCurve::attach(&opt);
    let seen = recorder(&opt);

    let handle = assert_ok!(opt.start(dataset(8), 10_000, 2, Duration::from_millis(1)));
    sleep(Duration::from_millis(20)).await;

    let last = curve.last();
    opt.stop();
    assert_eq!(finish(handle).await, RunOutcome::Stopped);

    let last = last.unwrap();
    let seen = seen.lock();
    assert_eq!(last.step, seen.len());
    assert_eq!(last.loss, seen[seen.len() - 1].current_loss.abs());
    assert!(curve.is_empty());
}
