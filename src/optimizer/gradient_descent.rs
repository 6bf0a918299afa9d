use crate::geometry::{Line, Point};

/// Mean-gradient descent on the squared error of a line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientDescent {
    learning_rate: f64,
}

impl GradientDescent {
    /// Creates a new `GradientDescent` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    ///
    /// # Returns
    /// A new `GradientDescent` instance.
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Applies one update of `line` using the mean gradient over `batch`.
    ///
    /// # Arguments
    /// * `line` - The parameters to update in place.
    /// * `batch` - A non-empty slice of the dataset.
    ///
    /// # Returns
    /// The mean squared error of `batch` under the updated parameters.
    pub fn step(&self, line: &mut Line, batch: &[Point]) -> f64 {
        debug_assert!(!batch.is_empty(), "batches are never empty");

        let len = batch.len() as f64;
        let (mut grad_slope, mut grad_intercept) = (0.0, 0.0);

        for p in batch {
            let err = p.y - line.predict(p.x);
            grad_slope += -2.0 * err * p.x;
            grad_intercept += -2.0 * err;
        }

        line.slope -= self.learning_rate * grad_slope / len;
        line.intercept -= self.learning_rate * grad_intercept / len;

        batch
            .iter()
            .map(|p| {
                let err = p.y - line.predict(p.x);
                err * err
            })
            .sum::<f64>()
            / len
    }
}
