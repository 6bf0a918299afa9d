use std::env;

use anyhow::{Context, bail};
use log::{info, warn};
use rand::{SeedableRng, rngs::StdRng};
use tokio::signal;

use gdviz::{
    config::AppConfig,
    observe::{Landscape, LossCurve},
    optimizer::{Optimizer, RunOutcome},
    stats,
};

/// Epochs between two progress lines.
const LOG_EVERY_EPOCHS: usize = 500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => AppConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => AppConfig::default(),
    };
    info!(
        points = config.points,
        epochs = config.epochs,
        learning_rate = config.learning_rate;
        "configuration loaded"
    );

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let points = stats::generate_random_points(
        &mut rng,
        config.points,
        config.min_range as f64,
        config.max_range as f64,
        config.linear,
    )?;
    if points.is_empty() {
        bail!("every generated point fell outside of the range");
    }
    info!(kept = points.len(), requested = config.points; "dataset generated");

    let reference = match stats::fit_ols(&points) {
        Ok(line) => {
            info!(slope = line.slope, intercept = line.intercept; "closed form fit");
            Some(line)
        }
        Err(e) => {
            warn!("no closed form fit: {e}");
            None
        }
    };

    let optimizer = match config.seed {
        Some(seed) => Optimizer::with_seed(config.learning_rate, seed),
        None => Optimizer::new(config.learning_rate),
    };

    let batch_size = config.batch.resolve(points.len());
    let steps_per_epoch = points.len().div_ceil(batch_size.max(1));
    let log_every = steps_per_epoch * LOG_EVERY_EPOCHS;

    optimizer.subscribe_update(move |snapshot| {
        if snapshot.is_running() && snapshot.current_step % log_every == 0 {
            info!(
                epoch = snapshot.current_epoch,
                loss = snapshot.current_loss,
                slope = snapshot.slope,
                intercept = snapshot.intercept;
                "training"
            );
        }
    });
    let curve = LossCurve::attach(&optimizer);
    let landscape = Landscape::attach(&optimizer, reference);

    let handle = optimizer.start(points.clone(), config.epochs, batch_size, config.step_delay())?;
    let wait = handle.wait();
    tokio::pin!(wait);

    // `stop` fires a reset which clears the curve, so the last sample is read first.
    let (outcome, last) = tokio::select! {
        outcome = &mut wait => (outcome?, curve.last()),
        _ = signal::ctrl_c() => {
            info!("received SIGINT, stopping");
            let last = curve.last();
            optimizer.stop();
            (wait.await?, last)
        }
    };

    let line = optimizer.line();
    let mse = stats::mean_squared_error(&points, line)?;
    info!(
        slope = line.slope,
        intercept = line.intercept,
        mse = mse,
        steps = last.map_or(0, |s| s.step),
        last_loss = last.map_or(0.0, |s| s.loss);
        "training finished: {outcome:?}"
    );

    if let (RunOutcome::Completed, Some(reference)) = (outcome, reference) {
        let best = stats::mean_squared_error(&points, reference)?;
        info!(
            mse = best,
            gap = mse - best,
            distance = landscape.distance().unwrap_or(f64::NAN);
            "compared to the closed form fit"
        );
    }

    Ok(())
}
