use std::{error::Error, fmt};

/// The optimizer module's result type.
pub type Result<T> = std::result::Result<T, OptimizerErr>;

/// Failures of the optimizer commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizerErr {
    /// A training argument is out of its domain; nothing was mutated.
    InvalidArgument(&'static str),
    /// A run is already in flight.
    AlreadyRunning,
    /// `start` was called outside of a tokio runtime.
    NoRuntime,
    /// The run task panicked or was aborted.
    Join(String),
}

impl fmt::Display for OptimizerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerErr::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            OptimizerErr::AlreadyRunning => f.write_str("a training run is already in flight"),
            OptimizerErr::NoRuntime => f.write_str("no tokio runtime to spawn the training run on"),
            OptimizerErr::Join(msg) => write!(f, "training task failed: {msg}"),
        }
    }
}

impl Error for OptimizerErr {}
