//! The incremental gradient-descent optimizer and its lifecycle.

mod batch;
mod error;
mod gradient_descent;
#[allow(clippy::module_inception)]
mod optimizer;
mod run;
mod snapshot;
mod state;
mod subscribers;

pub use batch::{BatchSize, DEFAULT_MINI_BATCH};
pub use error::{OptimizerErr, Result};
pub use gradient_descent::GradientDescent;
pub use optimizer::{Optimizer, RunHandle, WeakOptimizer};
pub use snapshot::{OptimizerSnapshot, Phase};
pub use state::RunOutcome;
pub use subscribers::{Callback, SubscriptionId};
