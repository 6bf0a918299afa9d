//! Views kept in sync with an optimizer through its subscriptions.
//!
//! Each view owns its subscriptions and holds itself weakly inside them, so dropping
//! the view silences its callbacks and `detach` removes them.

mod landscape;
mod loss_curve;
mod model_line;

pub use landscape::Landscape;
pub use loss_curve::{LossCurve, LossSample};
pub use model_line::ModelLine;
