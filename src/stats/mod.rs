//! Stateless helpers around the dataset and the closed-form reference fit.
//!
//! Everything in here is a pure function of its inputs (plus the caller's RNG),
//! so it is safe to call from any thread while a training run is in flight.

mod error;

pub use error::{Result, StatsErr};

use rand::Rng;

use crate::geometry::{Line, Point};

/// Half-width of the noise band added to `y = x` for linear datasets.
pub const LINEAR_NOISE: f64 = 5.0;

/// Fits a line with ordinary least squares through the normal equations.
///
/// # Args
/// * `points` - The dataset.
///
/// # Returns
/// The line minimizing the sum of squared residuals.
///
/// # Errors
/// `StatsErr::DegenerateInput` if `points` is empty or every x is the same.
pub fn fit_ols(points: &[Point]) -> Result<Line> {
    if points.is_empty() {
        return Err(StatsErr::DegenerateInput("no points to fit"));
    }

    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
    for p in points {
        sum_x += p.x;
        sum_y += p.y;
        sum_xy += p.x * p.y;
        sum_xx += p.x * p.x;
    }

    let first_x = points[0].x;
    let n = points.len() as f64;
    let denom = n * sum_xx - sum_x * sum_x;

    if denom == 0.0 || points.iter().all(|p| p.x == first_x) {
        return Err(StatsErr::DegenerateInput("x has zero variance"));
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = sum_y / n - slope * (sum_x / n);
    Ok(Line::new(slope, intercept))
}

/// Samples `line` once per integer abscissa in `[min_x, max_x)`.
///
/// The returned iterator is lazy and can be cloned to restart it.
pub fn sample_points(min_x: i64, max_x: i64, line: Line) -> impl Iterator<Item = Point> + Clone {
    (min_x..max_x).map(move |x| line.point_at(x as f64))
}

/// Mean squared error of `line` over `points`.
///
/// # Errors
/// `StatsErr::DegenerateInput` if `points` is empty.
pub fn mean_squared_error(points: &[Point], line: Line) -> Result<f64> {
    if points.is_empty() {
        return Err(StatsErr::DegenerateInput("no points to evaluate"));
    }

    let sum: f64 = points
        .iter()
        .map(|p| {
            let err = p.y - line.predict(p.x);
            err * err
        })
        .sum();

    Ok(sum / points.len() as f64)
}

/// Draws a random dataset inside the square `[min, max]²`.
///
/// With `linear` set, every y is `x` plus uniform noise in `[-5, 5]`; otherwise y is
/// drawn independently in `[min, max]`. Points whose y lands outside `[min, max]`
/// are discarded rather than redrawn, so the result may hold fewer than `count`
/// points (possibly none).
///
/// # Args
/// * `rng` - The random number generator to draw from.
/// * `count` - The amount of draws.
/// * `min` - The inclusive lower bound of both axes.
/// * `max` - The inclusive upper bound of both axes.
/// * `linear` - Whether the points should follow `y = x`.
///
/// # Errors
/// `StatsErr::InvalidRange` if the bounds aren't finite, `min > max`, or the width of
/// the range overflows.
pub fn generate_random_points<R: Rng>(
    rng: &mut R,
    count: usize,
    min: f64,
    max: f64,
    linear: bool,
) -> Result<Vec<Point>> {
    if !min.is_finite() || !max.is_finite() || min > max || !(max - min).is_finite() {
        return Err(StatsErr::InvalidRange { min, max });
    }

    let mut points = Vec::with_capacity(count);

    for _ in 0..count {
        let x = rng.random_range(min..=max);
        let y = if linear {
            x + rng.random_range(-LINEAR_NOISE..=LINEAR_NOISE)
        } else {
            rng.random_range(min..=max)
        };

        if y < min || y > max {
            continue;
        }

        points.push(Point::new(x, y));
    }

    Ok(points)
}

/// Axis-aligned extent of a dataset, used to move between raw and unit coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Computes the extent of `points`.
    ///
    /// # Errors
    /// `StatsErr::DegenerateInput` if `points` is empty or either axis has a zero range.
    pub fn of(points: &[Point]) -> Result<Self> {
        if points.is_empty() {
            return Err(StatsErr::DegenerateInput("no points to bound"));
        }

        let (min_x, max_x) = extent(points.iter().map(|p| p.x));
        let (min_y, max_y) = extent(points.iter().map(|p| p.y));

        if max_x - min_x == 0.0 {
            return Err(StatsErr::DegenerateInput("x has zero range"));
        }
        if max_y - min_y == 0.0 {
            return Err(StatsErr::DegenerateInput("y has zero range"));
        }

        Ok(Self {
            min_x,
            max_x,
            min_y,
            max_y,
        })
    }

    /// Maps a raw point into the unit square.
    pub fn normalize(&self, p: Point) -> Point {
        Point::new(
            (p.x - self.min_x) / (self.max_x - self.min_x),
            (p.y - self.min_y) / (self.max_y - self.min_y),
        )
    }

    /// Maps a point of the unit square back into raw coordinates.
    pub fn denormalize(&self, p: Point) -> Point {
        Point::new(
            p.x * (self.max_x - self.min_x) + self.min_x,
            p.y * (self.max_y - self.min_y) + self.min_y,
        )
    }
}

/// Rescales both axes independently into `[0, 1]`.
///
/// # Errors
/// `StatsErr::DegenerateInput` if `points` is empty or either axis has a zero range.
pub fn normalize(points: &[Point]) -> Result<Vec<Point>> {
    let bounds = Bounds::of(points)?;
    Ok(points.iter().map(|&p| bounds.normalize(p)).collect())
}

/// Arithmetic mean of the y coordinates.
///
/// # Errors
/// `StatsErr::DegenerateInput` if `points` is empty.
pub fn mean_y(points: &[Point]) -> Result<f64> {
    if points.is_empty() {
        return Err(StatsErr::DegenerateInput("no points to average"));
    }

    Ok(points.iter().map(|p| p.y).sum::<f64>() / points.len() as f64)
}

/// Returns the point at abscissa `x` on the line through `a` and `b`.
///
/// This is how a pointer position over a chart is turned back into model space.
///
/// # Errors
/// `StatsErr::DegenerateInput` if `a` and `b` share the same x.
pub fn interpolate(x: f64, a: Point, b: Point) -> Result<Point> {
    if a.x == b.x {
        return Err(StatsErr::DegenerateInput("interpolation anchors share x"));
    }

    let y = a.y + (b.y - a.y) * ((x - a.x) / (b.x - a.x));
    Ok(Point::new(x, y))
}

fn extent(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}
