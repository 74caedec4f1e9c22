use tch::nn::Init;
use tch::{nn, Tensor};

/// Normal init with a fan-average std scaled by 1/0.8796, the correction a
/// truncated normal would need. The draw itself is not truncated.
pub(crate) fn truncated_normal_init(in_features: i64, out_features: i64) -> Init {
    let denoms = (in_features + out_features) as f64 / 2.0;
    let std = (1.0 / denoms).sqrt() / 0.8796;
    Init::Randn {
        mean: 0.0,
        stdev: std,
    }
}

pub(crate) fn xavier_linear(p: nn::Path, in_dim: i64, out_dim: i64) -> nn::Linear {
    let cfg = nn::LinearConfig {
        ws_init: truncated_normal_init(in_dim, out_dim),
        bs_init: Some(Init::Const(0.0)),
        bias: true,
    };
    nn::linear(p, in_dim, out_dim, cfg)
}

/// Applies inverted dropout with the given keep probability. A keep
/// probability of 1 is the identity.
pub(crate) fn dropout(x: &Tensor, keep_prob: f64) -> Tensor {
    if keep_prob >= 1.0 {
        x.shallow_clone()
    } else {
        x.dropout(1.0 - keep_prob, true)
    }
}

/// Fully-connected tanh stack run independently over every timestep.
pub struct FeatureEncoder {
    layers: Vec<nn::Linear>,
    output_dim: i64,
}

impl FeatureEncoder {
    pub fn new(p: &nn::Path, input_dim: i64, units: &[i64]) -> Self {
        let mut layers = Vec::with_capacity(units.len());
        let mut in_dim = input_dim;
        for (i, &out_dim) in units.iter().enumerate() {
            layers.push(xavier_linear(p / format!("dense{i}"), in_dim, out_dim));
            in_dim = out_dim;
        }

        Self {
            layers,
            output_dim: in_dim,
        }
    }

    pub fn output_dim(&self) -> i64 {
        self.output_dim
    }

    /// `[T, m]` -> `[T, output_dim]`
    pub fn forward(&self, features: &Tensor, keep_prob: f64) -> Tensor {
        self.layers.iter().fold(features.shallow_clone(), |x, layer| {
            dropout(&x.apply(layer).tanh(), keep_prob)
        })
    }
}
