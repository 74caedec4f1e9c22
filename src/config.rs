use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::constants::network::{ATTN_LENGTH, DENSE_UNITS, LEARNING_RATE, RNN_HIDDEN_UNITS};
use crate::error::{PortfolioError, Result};

/// The scalar the training step maximizes. Fixed for the lifetime of a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    /// Mean log-reward over the trajectory
    Reward,
    Sharpe,
    #[default]
    Sortino,
}

impl FromStr for Objective {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reward" => Ok(Objective::Reward),
            "sharpe" => Ok(Objective::Sharpe),
            "sortino" => Ok(Objective::Sortino),
            other => Err(PortfolioError::UnknownObjective(other.to_string())),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Objective::Reward => "reward",
            Objective::Sharpe => "sharpe",
            Objective::Sortino => "sortino",
        };
        f.write_str(name)
    }
}

/// How the cash position shows up in the action vector.
///
/// `Implicit` keeps one softmax slot per risky asset and leaves cash folded
/// into that simplex. `Explicit` adds a dedicated last slot for cash, which
/// keeps its value (gross return 1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CashMode {
    #[default]
    Implicit,
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub feature_number: usize,
    pub asset_number: usize,
    pub objective: Objective,
    pub dense_units: Vec<i64>,
    pub rnn_hidden_units: Vec<i64>,
    pub attn_length: usize,
    pub learning_rate: f64,
    pub cash_mode: CashMode,
    /// Run on CUDA when it is available
    pub use_cuda: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            feature_number: 1,
            asset_number: 1,
            objective: Objective::default(),
            dense_units: DENSE_UNITS.to_vec(),
            rnn_hidden_units: RNN_HIDDEN_UNITS.to_vec(),
            attn_length: ATTN_LENGTH,
            learning_rate: LEARNING_RATE,
            cash_mode: CashMode::default(),
            use_cuda: false,
        }
    }
}

impl PolicyConfig {
    pub fn new(feature_number: usize, asset_number: usize) -> Self {
        Self {
            feature_number,
            asset_number,
            ..Default::default()
        }
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_dense_units(mut self, units: Vec<i64>) -> Self {
        self.dense_units = units;
        self
    }

    pub fn with_rnn_hidden_units(mut self, units: Vec<i64>) -> Self {
        self.rnn_hidden_units = units;
        self
    }

    pub fn with_attn_length(mut self, attn_length: usize) -> Self {
        self.attn_length = attn_length;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_cash_mode(mut self, cash_mode: CashMode) -> Self {
        self.cash_mode = cash_mode;
        self
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: PolicyConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Width of every action row: one slot per asset, plus cash when it is explicit
    pub fn action_width(&self) -> usize {
        match self.cash_mode {
            CashMode::Implicit => self.asset_number,
            CashMode::Explicit => self.asset_number + 1,
        }
    }

    pub fn device(&self) -> tch::Device {
        if self.use_cuda {
            tch::Device::cuda_if_available()
        } else {
            tch::Device::Cpu
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.feature_number == 0 {
            return Err(PortfolioError::InvalidConfig(
                "feature_number must be greater than zero".into(),
            ));
        }
        if self.asset_number == 0 {
            return Err(PortfolioError::InvalidConfig(
                "asset_number must be greater than zero".into(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(PortfolioError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if let Some(width) = self
            .dense_units
            .iter()
            .chain(self.rnn_hidden_units.iter())
            .find(|w| **w <= 0)
        {
            return Err(PortfolioError::InvalidConfig(format!(
                "layer widths must be positive, got {width}"
            )));
        }
        Ok(())
    }
}
