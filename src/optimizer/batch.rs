use serde::{Deserialize, Serialize};

/// Batch size used by the interactive front ends when none is given.
pub const DEFAULT_MINI_BATCH: usize = 32;

/// Batch-size presets of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSize {
    /// One point per step.
    Stochastic,
    MiniBatch(usize),
    /// The whole dataset per step.
    FullBatch,
}

impl Default for BatchSize {
    fn default() -> Self {
        BatchSize::MiniBatch(DEFAULT_MINI_BATCH)
    }
}

impl BatchSize {
    /// Resolves the preset against a dataset of `len` points.
    ///
    /// `FullBatch` over an empty dataset resolves to `0`, which `start` rejects.
    pub fn resolve(self, len: usize) -> usize {
        match self {
            BatchSize::Stochastic => 1,
            BatchSize::MiniBatch(n) => n,
            BatchSize::FullBatch => len,
        }
    }
}
