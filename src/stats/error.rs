use std::{error::Error, fmt};

/// The statistics module's result type.
pub type Result<T> = std::result::Result<T, StatsErr>;

/// Failures of the statistics helpers.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsErr {
    /// The input has no spread (empty, or a zero range on some axis).
    DegenerateInput(&'static str),
    /// The sampling range can't be used to build a uniform distribution.
    InvalidRange { min: f64, max: f64 },
}

impl fmt::Display for StatsErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsErr::DegenerateInput(what) => write!(f, "degenerate input: {what}"),
            StatsErr::InvalidRange { min, max } => {
                write!(f, "invalid sampling range: [{min}, {max}]")
            }
        }
    }
}

impl Error for StatsErr {}
