use tch::{nn, Kind, Tensor};

use crate::config::{CashMode, PolicyConfig};
use crate::torch::allocator::RecurrentAllocator;
use crate::torch::encoder::FeatureEncoder;
use crate::torch::feed::Feed;
use crate::torch::reward::{normalize_actions, pad_cash_returns, rewards, RewardSummary};

/// Result of one full forward pass, still attached to the autograd graph
pub struct Forward {
    /// `[T + 1, w]`, row 0 is the seed action
    pub actions: Tensor,
    pub summary: RewardSummary,
}

/// Feature encoder -> recurrent allocator -> softmax actions -> rewards.
pub struct PolicyNet {
    encoder: FeatureEncoder,
    allocator: RecurrentAllocator,
    /// Raw output standing in for the action held before the first step.
    /// Drawn once, not trained, stored alongside the weights.
    seed_action: Tensor,
    cash_mode: CashMode,
}

impl PolicyNet {
    pub fn new(p: &nn::Path, config: &PolicyConfig) -> Self {
        let action_width = config.action_width() as i64;

        let encoder = FeatureEncoder::new(
            &(p / "feed_forward"),
            config.feature_number as i64,
            &config.dense_units,
        );
        let allocator = RecurrentAllocator::new(
            &(p / "rnn"),
            encoder.output_dim(),
            &config.rnn_hidden_units,
            action_width,
            config.attn_length,
        );

        let mut seed_action = (p / "action").zeros_no_train("seed_action", &[1, action_width]);
        tch::no_grad(|| {
            seed_action.copy_(&Tensor::rand([1, action_width], (Kind::Float, p.device())));
        });

        Self {
            encoder,
            allocator,
            seed_action,
            cash_mode: config.cash_mode,
        }
    }

    pub fn seed_action(&self) -> &Tensor {
        &self.seed_action
    }

    /// Raw allocator outputs with the seed row prepended: `[T + 1, w]`
    pub fn raw_actions(&self, features: &Tensor, keep_prob: f64) -> Tensor {
        let latent = self.encoder.forward(features, keep_prob);
        let outputs = self.allocator.forward(&latent);
        Tensor::cat(&[&self.seed_action, &outputs], 0)
    }

    /// Runs the whole graph on a feed. The caller validates the feed first.
    pub fn forward(&self, feed: &Feed) -> Forward {
        let device = self.seed_action.device();
        let features = feed.features().to_device(device);
        let returns = feed.returns().to_device(device);

        let raw = self.raw_actions(&features, feed.keep_prob);
        let actions = normalize_actions(&raw, feed.temperature);

        let returns = match self.cash_mode {
            CashMode::Implicit => returns,
            CashMode::Explicit => pad_cash_returns(&returns),
        };
        let summary = RewardSummary::new(rewards(&actions, &returns, feed.fee), feed.risk_free);

        Forward { actions, summary }
    }
}
