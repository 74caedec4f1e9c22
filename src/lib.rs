//! Deep reinforcement learning portfolio policy.
//!
//! A feature encoder and an attention-wrapped LSTM stack turn a trajectory of
//! features into softmax portfolio weights. Those weights and the realized
//! returns give per-step rewards net of turnover fees, and the model is trained
//! end-to-end on mean log-reward, Sharpe or Sortino.

pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod torch;

pub use config::{CashMode, Objective, PolicyConfig};
pub use error::{PortfolioError, Result};
pub use torch::{DrlPortfolio, Feed, TradeOutcome, TrainStats};
