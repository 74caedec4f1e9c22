use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView1};
use tch::nn::{self, OptimizerConfig};
use tracing::{debug, info};

use crate::config::{Objective, PolicyConfig};
use crate::constants::files::CHECKPOINT_FILE;
use crate::error::{PortfolioError, Result};
use crate::torch::feed::{tensor_to_array, Feed};
use crate::torch::model::{Forward, PolicyNet};

/// Values observed by one training step, taken before the update is applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainStats {
    pub objective: f64,
    pub cum_log_reward: f64,
    pub cum_reward: f64,
}

/// Everything an evaluation pass produces
#[derive(Debug, Clone)]
pub struct TradeOutcome {
    pub rewards: Vec<f32>,
    pub cum_log_reward: f64,
    pub cum_reward: f64,
    /// `[T + 1, w]`, row 0 is the seed action
    pub actions: Array2<f32>,
    pub mean_log_reward: f64,
    pub sharpe: f64,
    pub sortino: f64,
}

impl TradeOutcome {
    /// Allocation produced at the last timestep, i.e. the weights to hold next
    pub fn latest_action(&self) -> ArrayView1<'_, f32> {
        self.actions.row(self.actions.nrows() - 1)
    }
}

/// The portfolio policy and the context that owns its parameters.
///
/// The var store holds every weight plus the seed action; the optimizer keeps
/// its moment estimates for those weights. Both live exactly as long as this
/// value. Training needs `&mut self`, evaluation only `&self`.
pub struct DrlPortfolio {
    config: PolicyConfig,
    vs: nn::VarStore,
    net: PolicyNet,
    opt: nn::Optimizer,
}

impl DrlPortfolio {
    pub fn new(config: PolicyConfig) -> Result<Self> {
        config.validate()?;

        let device = config.device();
        let vs = nn::VarStore::new(device);
        let net = PolicyNet::new(&vs.root(), &config);
        let opt = nn::Adam::default().build(&vs, config.learning_rate)?;

        let parameters: usize = vs.trainable_variables().iter().map(|t| t.numel()).sum();
        info!(
            features = config.feature_number,
            assets = config.asset_number,
            objective = %config.objective,
            parameters,
            ?device,
            "built portfolio policy"
        );

        Ok(Self {
            config,
            vs,
            net,
            opt,
        })
    }

    /// Draws fresh parameters and a fresh seed action, and clears the
    /// optimizer state
    pub fn init_model(&mut self) -> Result<()> {
        *self = Self::new(self.config.clone())?;
        Ok(())
    }

    pub fn objective(&self) -> Objective {
        self.config.objective
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Forward pass attached to the autograd graph
    pub fn forward(&self, feed: &Feed) -> Result<Forward> {
        feed.validate_for(&self.config)?;
        Ok(self.net.forward(feed))
    }

    /// One gradient-ascent step on the configured objective
    pub fn train(&mut self, feed: &Feed) -> Result<TrainStats> {
        let forward = self.forward(feed)?;
        let objective = forward.summary.objective(self.config.objective);

        let stats = TrainStats {
            objective: objective.double_value(&[]),
            cum_log_reward: forward.summary.cum_log_reward.double_value(&[]),
            cum_reward: forward.summary.cum_reward.double_value(&[]),
        };

        let loss = -objective;
        self.opt.zero_grad();
        loss.backward();
        self.opt.step();

        debug!(
            objective = stats.objective,
            cum_log_reward = stats.cum_log_reward,
            "train step"
        );
        Ok(stats)
    }

    /// Read-only forward pass. Dropout still applies unless the feed's keep
    /// probability is 1.
    pub fn trade(&self, feed: &Feed) -> Result<TradeOutcome> {
        let forward = tch::no_grad(|| self.forward(feed))?;
        let summary = &forward.summary;

        Ok(TradeOutcome {
            rewards: Vec::<f32>::try_from(&summary.rewards)?,
            cum_log_reward: summary.cum_log_reward.double_value(&[]),
            cum_reward: summary.cum_reward.double_value(&[]),
            actions: tensor_to_array(&forward.actions)?,
            mean_log_reward: summary.mean_log_reward.double_value(&[]),
            sharpe: summary.sharpe.double_value(&[]),
            sortino: summary.sortino.double_value(&[]),
        })
    }

    /// Writes every parameter to `dir/trade_model.ot`, creating `dir` if needed
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let file = dir.join(CHECKPOINT_FILE);
        self.vs.save(&file)?;
        info!(path = %file.display(), "saved model weights");
        Ok(file)
    }

    /// Restores parameters written by [`DrlPortfolio::save`] into this model
    pub fn load<P: AsRef<Path>>(&mut self, dir: P) -> Result<()> {
        let file = dir.as_ref().join(CHECKPOINT_FILE);
        if !file.is_file() {
            return Err(PortfolioError::CheckpointNotFound(file));
        }

        self.vs.load(&file)?;
        info!(path = %file.display(), "loaded model weights");
        Ok(())
    }

    /// Builds a model from `config` and restores it from `dir`
    pub fn from_checkpoint<P: AsRef<Path>>(config: PolicyConfig, dir: P) -> Result<Self> {
        let mut model = Self::new(config)?;
        model.load(dir)?;
        Ok(model)
    }
}
