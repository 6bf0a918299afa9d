use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{
    geometry::{Line, Point},
    optimizer::{Optimizer, SubscriptionId},
};

/// The model drawn as a point of parameter space, `x` being the intercept and `y` the
/// slope, next to the closed-form fit when one is known.
pub struct Landscape {
    model: Mutex<Point>,
    reference: Mutex<Option<Point>>,
    subscriptions: [SubscriptionId; 2],
}

impl Landscape {
    /// Creates a new `Landscape` following `optimizer`.
    ///
    /// # Args
    /// * `optimizer` - The optimizer to follow.
    /// * `reference` - The closed-form fit of the dataset, e.g. from `stats::fit_ols`.
    pub fn attach(optimizer: &Optimizer, reference: Option<Line>) -> Arc<Self> {
        let initial = parameter_point(optimizer.line());

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let on_update = weak.clone();
            let update = optimizer.subscribe_update(move |snapshot| {
                if let Some(view) = on_update.upgrade() {
                    *view.model.lock() = parameter_point(snapshot.line());
                }
            });

            let on_reset = weak.clone();
            let reset = optimizer.subscribe_reset(move |snapshot| {
                if let Some(view) = on_reset.upgrade() {
                    *view.model.lock() = parameter_point(snapshot.line());
                }
            });

            Self {
                model: Mutex::new(initial),
                reference: Mutex::new(reference.map(parameter_point)),
                subscriptions: [update, reset],
            }
        })
    }

    pub fn detach(&self, optimizer: &Optimizer) {
        for id in self.subscriptions {
            optimizer.unsubscribe(id);
        }
    }

    /// Replaces the closed-form fit, e.g. after the dataset changed.
    pub fn set_reference(&self, reference: Option<Line>) {
        *self.reference.lock() = reference.map(parameter_point);
    }

    /// The current `(intercept, slope)` of the model.
    pub fn model(&self) -> Point {
        *self.model.lock()
    }

    /// The `(intercept, slope)` of the closed-form fit.
    pub fn reference(&self) -> Option<Point> {
        *self.reference.lock()
    }

    /// Euclidean distance between the model and the closed-form fit in parameter space.
    pub fn distance(&self) -> Option<f64> {
        let model = self.model();
        self.reference()
            .map(|r| (model.x - r.x).hypot(model.y - r.y))
    }
}

fn parameter_point(line: Line) -> Point {
    Point::new(line.intercept, line.slope)
}
