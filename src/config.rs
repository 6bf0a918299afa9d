use std::{error::Error, fmt, fs, io, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::optimizer::BatchSize;

/// Failures while loading an `AppConfig`.
#[derive(Debug)]
pub enum ConfigErr {
    Io { path: String, source: io::Error },
    Parse(serde_json::Error),
    /// A value is out of its domain.
    Invalid(String),
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read '{path}': {source}"),
            Self::Parse(e) => write!(f, "invalid JSON: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl Error for ConfigErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(e) => Some(e),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}

/// Settings of the command line demo. Every field is optional in the JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Lower bound of the generated abscissas.
    pub min_range: i64,
    /// Upper bound of the generated abscissas, excluded.
    pub max_range: i64,
    pub points: usize,
    /// Whether the points follow `y = x` plus noise or are uniformly scattered.
    pub linear: bool,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch: BatchSize,
    pub step_delay_ms: u64,
    pub seed: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            min_range: -10,
            max_range: 10,
            points: 100,
            linear: true,
            learning_rate: 0.01,
            epochs: 10_000,
            batch: BatchSize::default(),
            step_delay_ms: 0,
            seed: None,
        }
    }
}

impl AppConfig {
    /// Loads and validates a config from a JSON file.
    ///
    /// # Errors
    /// `ConfigErr::Io` if the file can't be read, otherwise as `from_json`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigErr> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigErr::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_json(&content)
    }

    /// Parses and validates a config.
    ///
    /// # Errors
    /// `ConfigErr::Parse` on malformed JSON or unknown fields, `ConfigErr::Invalid` on
    /// out of domain values.
    pub fn from_json(json: &str) -> Result<Self, ConfigErr> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigErr> {
        if self.min_range >= self.max_range {
            return Err(ConfigErr::Invalid(format!(
                "min_range ({}) must be lower than max_range ({})",
                self.min_range, self.max_range
            )));
        }
        if self.points == 0 {
            return Err(ConfigErr::Invalid("points must be greater than zero".into()));
        }
        if self.epochs == 0 {
            return Err(ConfigErr::Invalid("epochs must be greater than zero".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigErr::Invalid(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if self.batch == BatchSize::MiniBatch(0) {
            return Err(ConfigErr::Invalid("mini batch size must be greater than zero".into()));
        }

        Ok(())
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}
