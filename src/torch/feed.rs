use ndarray::Array2;
use tch::{Kind, Tensor};

use crate::config::PolicyConfig;
use crate::constants::feed::{FEE, KEEP_PROB, RISK_FREE, TEMPERATURE};
use crate::error::{PortfolioError, Result};

/// One trajectory plus the scalars a forward pass needs.
///
/// `features` is `[T, m]` and `returns` is `[T, k]`, row `t` of both describing
/// the same timestep. Built fresh for every train or trade call; the scalar
/// fields can be overridden on an existing feed without copying the matrices.
#[derive(Debug)]
pub struct Feed {
    features: Tensor,
    returns: Tensor,
    pub keep_prob: f64,
    pub fee: f64,
    pub temperature: f64,
    pub risk_free: f64,
}

impl Clone for Feed {
    fn clone(&self) -> Self {
        Self {
            features: self.features.shallow_clone(),
            returns: self.returns.shallow_clone(),
            keep_prob: self.keep_prob,
            fee: self.fee,
            temperature: self.temperature,
            risk_free: self.risk_free,
        }
    }
}

impl Feed {
    pub fn new(features: &Array2<f32>, returns: &Array2<f32>) -> Result<Self> {
        Self::from_tensors(array_to_tensor(features), array_to_tensor(returns))
    }

    pub fn from_tensors(features: Tensor, returns: Tensor) -> Result<Self> {
        if features.dim() != 2 {
            return Err(PortfolioError::shape_mismatch("feature rank", 2, features.dim()));
        }
        if returns.dim() != 2 {
            return Err(PortfolioError::shape_mismatch("return rank", 2, returns.dim()));
        }

        let steps = features.size()[0];
        let return_steps = returns.size()[0];
        if steps != return_steps {
            return Err(PortfolioError::shape_mismatch(
                "return timesteps",
                steps as usize,
                return_steps as usize,
            ));
        }
        if steps == 0 {
            return Err(PortfolioError::EmptyTrajectory);
        }

        Ok(Self {
            features: features.to_kind(Kind::Float),
            returns: returns.to_kind(Kind::Float),
            keep_prob: KEEP_PROB,
            fee: FEE,
            temperature: TEMPERATURE,
            risk_free: RISK_FREE,
        })
    }

    pub fn with_keep_prob(mut self, keep_prob: f64) -> Self {
        self.keep_prob = keep_prob;
        self
    }

    pub fn with_fee(mut self, fee: f64) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_risk_free(mut self, risk_free: f64) -> Self {
        self.risk_free = risk_free;
        self
    }

    pub fn change_temperature(&mut self, temperature: f64) -> &mut Self {
        self.temperature = temperature;
        self
    }

    pub fn change_keep_prob(&mut self, keep_prob: f64) -> &mut Self {
        self.keep_prob = keep_prob;
        self
    }

    /// Number of timesteps T
    pub fn steps(&self) -> usize {
        self.features.size()[0] as usize
    }

    pub fn features(&self) -> &Tensor {
        &self.features
    }

    pub fn returns(&self) -> &Tensor {
        &self.returns
    }

    /// Checks the feed against the dimensions and ranges a model expects
    pub fn validate_for(&self, config: &PolicyConfig) -> Result<()> {
        let feature_cols = self.features.size()[1] as usize;
        if feature_cols != config.feature_number {
            return Err(PortfolioError::shape_mismatch(
                "feature columns",
                config.feature_number,
                feature_cols,
            ));
        }
        let return_cols = self.returns.size()[1] as usize;
        if return_cols != config.asset_number {
            return Err(PortfolioError::shape_mismatch(
                "return columns",
                config.asset_number,
                return_cols,
            ));
        }
        if !(self.keep_prob > 0.0 && self.keep_prob <= 1.0) {
            return Err(PortfolioError::InvalidFeed(format!(
                "keep_prob must be in (0, 1], got {}",
                self.keep_prob
            )));
        }
        if !(self.temperature > 0.0) {
            return Err(PortfolioError::InvalidFeed(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        if !(self.fee >= 0.0) {
            return Err(PortfolioError::InvalidFeed(format!(
                "fee must be non-negative, got {}",
                self.fee
            )));
        }
        Ok(())
    }
}

pub(crate) fn array_to_tensor(array: &Array2<f32>) -> Tensor {
    let (rows, cols) = array.dim();
    let values: Vec<f32> = array.iter().copied().collect();
    Tensor::from_slice(&values).reshape([rows as i64, cols as i64])
}

pub(crate) fn tensor_to_array(tensor: &Tensor) -> Result<Array2<f32>> {
    let size = tensor.size();
    let (rows, cols) = (size[0] as usize, size[1] as usize);
    let values = Vec::<f32>::try_from(tensor.to_kind(Kind::Float).flatten(0, -1))?;
    Ok(Array2::from_shape_vec((rows, cols), values)?)
}
