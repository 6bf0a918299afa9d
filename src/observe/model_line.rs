use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{
    geometry::{Line, Point},
    optimizer::{Optimizer, SubscriptionId},
    stats::{self, Bounds},
};

/// The model line as drawn over the chart, resampled on every update and reset.
pub struct ModelLine {
    min_x: i64,
    max_x: i64,
    bounds: Option<Bounds>,
    points: Mutex<Vec<Point>>,
    subscriptions: [SubscriptionId; 2],
}

impl ModelLine {
    /// Creates a new `ModelLine` following `optimizer`.
    ///
    /// # Args
    /// * `optimizer` - The optimizer to follow.
    /// * `min_x`, `max_x` - The integer abscissas to sample, `max_x` excluded.
    /// * `bounds` - When the model is trained on normalized data, the extent of the raw
    ///   dataset. Samples are then taken at raw abscissas and mapped back to raw
    ///   coordinates.
    pub fn attach(
        optimizer: &Optimizer,
        min_x: i64,
        max_x: i64,
        bounds: Option<Bounds>,
    ) -> Arc<Self> {
        let initial = sample(min_x, max_x, bounds, optimizer.line());

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let on_update = weak.clone();
            let update = optimizer.subscribe_update(move |snapshot| {
                if let Some(view) = on_update.upgrade() {
                    view.refresh(snapshot.line());
                }
            });

            let on_reset = weak.clone();
            let reset = optimizer.subscribe_reset(move |snapshot| {
                if let Some(view) = on_reset.upgrade() {
                    view.refresh(snapshot.line());
                }
            });

            Self {
                min_x,
                max_x,
                bounds,
                points: Mutex::new(initial),
                subscriptions: [update, reset],
            }
        })
    }

    pub fn detach(&self, optimizer: &Optimizer) {
        for id in self.subscriptions {
            optimizer.unsubscribe(id);
        }
    }

    fn refresh(&self, line: Line) {
        *self.points.lock() = sample(self.min_x, self.max_x, self.bounds, line);
    }

    pub fn points(&self) -> Vec<Point> {
        self.points.lock().clone()
    }
}

fn sample(min_x: i64, max_x: i64, bounds: Option<Bounds>, line: Line) -> Vec<Point> {
    match bounds {
        None => stats::sample_points(min_x, max_x, line).collect(),
        Some(bounds) => (min_x..max_x)
            .map(|x| {
                let u = bounds.normalize(Point::new(x as f64, bounds.min_y)).x;
                bounds.denormalize(line.point_at(u))
            })
            .collect(),
    }
}
