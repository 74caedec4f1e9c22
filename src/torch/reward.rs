//! Action normalization, per-step rewards and the risk-adjusted objectives.
//!
//! Rewards are computed from a `[T + 1, w]` action sequence whose row 0 is
//! the seed action:
//!
//! `r_t = sum(z_t * d_t) - c * sum(|d_{t+1} - d_t|)`
//!
//! so the weights held going into step `t` earn that step's returns and the
//! rebalance into `d_{t+1}` pays the fee. Downstream logs are taken as-is;
//! non-positive rewards turn into NaN or -inf and flow into every reduction.

use tch::{Kind, Tensor};

use crate::config::Objective;

/// Temperature-scaled softmax over the last dimension
pub fn normalize_actions(raw: &Tensor, temperature: f64) -> Tensor {
    (raw / temperature).softmax(-1, Kind::Float)
}

/// Appends a cash column to gross returns. Cash keeps its value, so its
/// price relative is 1 at every step.
pub fn pad_cash_returns(returns: &Tensor) -> Tensor {
    let steps = returns.size()[0];
    let cash = Tensor::ones([steps, 1], (returns.kind(), returns.device()));
    Tensor::cat(&[returns, &cash], 1)
}

/// Return term of each step: `sum(z_t * d_t)`
pub fn portfolio_returns(actions: &Tensor, returns: &Tensor) -> Tensor {
    let steps = returns.size()[0];
    let held = actions.narrow(0, 0, steps);
    (returns * held).sum_dim_intlist(1, false, Kind::Float)
}

/// Cost term of each step: `c * sum(|d_{t+1} - d_t|)`
pub fn turnover_costs(actions: &Tensor, fee: f64) -> Tensor {
    let steps = actions.size()[0] - 1;
    let previous = actions.narrow(0, 0, steps);
    let current = actions.narrow(0, 1, steps);
    (current - previous).abs().sum_dim_intlist(1, false, Kind::Float) * fee
}

pub fn rewards(actions: &Tensor, returns: &Tensor, fee: f64) -> Tensor {
    portfolio_returns(actions, returns) - turnover_costs(actions, fee)
}

/// `mean(r - rf) / var(r - rf)` with the population variance.
///
/// Divides by the variance rather than the standard deviation.
pub fn sharpe_ratio(log_rewards: &Tensor, risk_free: f64) -> Tensor {
    let excess = log_rewards - risk_free;
    let mean = excess.mean(Kind::Float);
    let variance = (&excess - &mean).pow_tensor_scalar(2).mean(Kind::Float);
    mean / variance
}

/// `(mean(r) - rf) / sqrt(sum((down_t * r_t)^2) / count(down))` where
/// `down_t` is 1 when `r_t <= rf`. An empty downside set yields NaN.
pub fn sortino_ratio(log_rewards: &Tensor, risk_free: f64) -> Tensor {
    let mean = log_rewards.mean(Kind::Float);
    let downside = (-(log_rewards - risk_free).sign() + 1.0).sign();
    let count = downside.sum(Kind::Float);
    let lower = &downside * log_rewards;
    let square_sum = lower.pow_tensor_scalar(2).sum(Kind::Float);
    let downside_dev = (square_sum / count).sqrt();
    (mean - risk_free) / downside_dev
}

/// Every reduction of one reward sequence, still attached to the graph
pub struct RewardSummary {
    pub rewards: Tensor,
    pub log_rewards: Tensor,
    pub cum_reward: Tensor,
    pub cum_log_reward: Tensor,
    pub mean_log_reward: Tensor,
    pub sharpe: Tensor,
    pub sortino: Tensor,
}

impl RewardSummary {
    pub fn new(rewards: Tensor, risk_free: f64) -> Self {
        let log_rewards = rewards.log();
        let cum_reward = rewards.prod(Kind::Float);
        let cum_log_reward = log_rewards.sum(Kind::Float);
        let mean_log_reward = log_rewards.mean(Kind::Float);
        let sharpe = sharpe_ratio(&log_rewards, risk_free);
        let sortino = sortino_ratio(&log_rewards, risk_free);

        Self {
            rewards,
            log_rewards,
            cum_reward,
            cum_log_reward,
            mean_log_reward,
            sharpe,
            sortino,
        }
    }

    pub fn objective(&self, objective: Objective) -> &Tensor {
        match objective {
            Objective::Reward => &self.mean_log_reward,
            Objective::Sharpe => &self.sharpe,
            Objective::Sortino => &self.sortino,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    fn t2(values: &[f32], cols: i64) -> Tensor {
        Tensor::from_slice(values).reshape([-1, cols])
    }

    fn t1(values: &[f32]) -> Tensor {
        Tensor::from_slice(values)
    }

    fn scalar(t: &Tensor) -> f64 {
        t.double_value(&[])
    }

    #[test]
    fn normalized_rows_are_simplices() {
        let raw = Tensor::randn([7, 4], (Kind::Float, Device::Cpu)) * 5.0;
        for temperature in [0.1, 1.0, 10.0] {
            let actions = normalize_actions(&raw, temperature);
            let row_sums = actions.sum_dim_intlist(1, false, Kind::Float);
            assert!(row_sums.allclose(&Tensor::ones([7], (Kind::Float, Device::Cpu)), 1e-5, 1e-5, false));
            assert!(actions.min().double_value(&[]) >= 0.0);
        }
    }

    #[test]
    fn lower_temperature_sharpens() {
        let raw = t2(&[1.0, 2.0, 3.0], 3);
        let soft = normalize_actions(&raw, 10.0);
        let sharp = normalize_actions(&raw, 0.1);
        assert!(sharp.max().double_value(&[]) > soft.max().double_value(&[]));
    }

    #[test]
    fn reward_uses_previous_weights_and_current_turnover() {
        // seed, d1, d2
        let actions = t2(&[0.5, 0.5, 1.0, 0.0, 0.0, 1.0], 2);
        let returns = t2(&[1.1, 0.9, 1.2, 0.8], 2);
        let fee = 0.01;

        let r = rewards(&actions, &returns, fee);
        assert_eq!(r.size(), vec![2]);

        // step 0: seed earns z_0, cost |d1 - seed| = 1.0
        let expected0 = 0.5 * 1.1 + 0.5 * 0.9 - fee * 1.0;
        // step 1: d1 earns z_1, cost |d2 - d1| = 2.0
        let expected1 = 1.0 * 1.2 + 0.0 * 0.8 - fee * 2.0;
        assert!((r.double_value(&[0]) - expected0).abs() < 1e-6);
        assert!((r.double_value(&[1]) - expected1).abs() < 1e-6);
    }

    #[test]
    fn single_step_is_charged_against_seed() {
        let actions = t2(&[0.25, 0.75, 0.75, 0.25], 2);
        let returns = t2(&[1.0, 1.0], 2);

        let r = rewards(&actions, &returns, 0.1);
        assert_eq!(r.size(), vec![1]);
        assert!((r.double_value(&[0]) - (1.0 - 0.1 * 1.0)).abs() < 1e-6);
    }

    #[test]
    fn return_and_cost_terms_are_separable() {
        let actions = normalize_actions(&Tensor::randn([5, 3], (Kind::Float, Device::Cpu)), 1.0);
        let returns = Tensor::rand([4, 3], (Kind::Float, Device::Cpu)) + 0.5;
        let fee = 0.002;

        // Perturbing returns leaves the cost term alone
        let bumped = &returns + 0.3;
        let diff = rewards(&actions, &bumped, fee) - rewards(&actions, &returns, fee);
        let expected = portfolio_returns(&actions, &bumped) - portfolio_returns(&actions, &returns);
        assert!(diff.allclose(&expected, 1e-5, 1e-6, false));

        // Perturbing the last action leaves every return term alone
        let moved = actions.copy();
        let _ = moved.get(4).copy_(&t1(&[1.0, 0.0, 0.0]));
        assert!(portfolio_returns(&moved, &returns).equal(&portfolio_returns(&actions, &returns)));
        assert!(!turnover_costs(&moved, fee).equal(&turnover_costs(&actions, fee)));
    }

    #[test]
    fn fee_term_is_linear() {
        let actions = normalize_actions(&Tensor::randn([4, 2], (Kind::Float, Device::Cpu)), 1.0);
        let returns = Tensor::rand([3, 2], (Kind::Float, Device::Cpu)) + 0.5;

        let free = rewards(&actions, &returns, 0.0);
        let one = free.shallow_clone() - rewards(&actions, &returns, 0.001);
        let three = free - rewards(&actions, &returns, 0.003);
        assert!((one * 3.0).allclose(&three, 1e-3, 1e-6, false));
    }

    #[test]
    fn cash_keeps_its_value() {
        let returns = t2(&[1.1, 0.9], 2);
        let padded = pad_cash_returns(&returns);
        assert_eq!(padded.size(), vec![1, 3]);

        let all_cash = t2(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0], 3);
        let r = rewards(&all_cash, &padded, 0.01);
        assert_eq!(r.double_value(&[0]), 1.0);
    }

    #[test]
    fn all_cash_matches_all_asset_in_a_flat_market() {
        let padded = pad_cash_returns(&Tensor::ones([3, 2], (Kind::Float, Device::Cpu)));
        let all_cash = t2(&[0.0f32, 0.0, 1.0].repeat(4), 3);
        let all_asset = t2(&[1.0f32, 0.0, 0.0].repeat(4), 3);

        let cash = RewardSummary::new(rewards(&all_cash, &padded, 0.0), 0.0);
        let asset = RewardSummary::new(rewards(&all_asset, &padded, 0.0), 0.0);

        assert!(cash.rewards.equal(&asset.rewards));
        assert_eq!(scalar(&cash.cum_reward), 1.0);
        assert_eq!(scalar(&cash.cum_log_reward), 0.0);
        assert_eq!(scalar(&asset.cum_log_reward), 0.0);
    }

    #[test]
    fn summary_reductions() {
        let summary = RewardSummary::new(t1(&[1.1, 0.9, 1.05]), 0.0);

        assert!((scalar(&summary.cum_reward) - 1.1 * 0.9 * 1.05).abs() < 1e-5);
        let logs = [1.1f64.ln(), 0.9f64.ln(), 1.05f64.ln()];
        let sum: f64 = logs.iter().sum();
        assert!((scalar(&summary.cum_log_reward) - sum).abs() < 1e-5);
        assert!((scalar(&summary.mean_log_reward) - sum / 3.0).abs() < 1e-5);
        assert!(scalar(summary.objective(Objective::Reward)) == scalar(&summary.mean_log_reward));
    }

    #[test]
    fn sharpe_divides_by_variance() {
        let logs = [0.02f64, -0.01, 0.03, 0.0];
        let values: Vec<f32> = logs.iter().map(|v| *v as f32).collect();
        let rf = 0.005;

        let excess: Vec<f64> = logs.iter().map(|v| v - rf).collect();
        let mean = excess.iter().sum::<f64>() / 4.0;
        let var = excess.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0;

        let sharpe = scalar(&sharpe_ratio(&t1(&values), rf));
        assert!((sharpe - mean / var).abs() / (mean / var).abs() < 1e-3);
    }

    #[test]
    fn sortino_uses_downside_at_or_below_risk_free() {
        let logs = [0.02f64, -0.01, 0.0, -0.03];
        let values: Vec<f32> = logs.iter().map(|v| *v as f32).collect();

        // downside: -0.01, 0.0 (tie counts), -0.03
        let mean = logs.iter().sum::<f64>() / 4.0;
        let dev = ((0.01f64.powi(2) + 0.0 + 0.03f64.powi(2)) / 3.0).sqrt();

        let sortino = scalar(&sortino_ratio(&t1(&values), 0.0));
        assert!((sortino - mean / dev).abs() < 1e-4);
    }

    #[test]
    fn sortino_subtracts_risk_free_only_in_the_numerator() {
        let logs = [0.02f64, -0.01, 0.005, -0.03];
        let values: Vec<f32> = logs.iter().map(|v| *v as f32).collect();
        let rf = 0.005;

        // downside: -0.01, 0.005 (tie with rf counts), -0.03, squared as-is
        let mean = logs.iter().sum::<f64>() / 4.0;
        let dev = ((0.01f64.powi(2) + 0.005f64.powi(2) + 0.03f64.powi(2)) / 3.0).sqrt();
        let expected = (mean - rf) / dev;

        let sortino = scalar(&sortino_ratio(&t1(&values), rf));
        assert!((sortino - expected).abs() < 1e-4, "{sortino} vs {expected}");

        // Squaring lr - rf instead would land well away from the expected value
        let shifted = (((0.01f64 + rf).powi(2) + 0.0 + (0.03f64 + rf).powi(2)) / 3.0).sqrt();
        assert!((sortino - (mean - rf) / shifted).abs() > 1e-2);
    }

    #[test]
    fn sortino_without_downside_is_not_finite() {
        let sortino = sortino_ratio(&t1(&[0.01, 0.02, 0.03]), 0.0);
        assert!(!scalar(&sortino).is_finite());
    }

    #[test]
    fn non_positive_rewards_propagate_non_finite_logs() {
        let summary = RewardSummary::new(t1(&[1.01, 0.0, 0.98]), 0.0);
        assert!(!scalar(&summary.cum_log_reward).is_finite());
        assert!(!scalar(&summary.mean_log_reward).is_finite());

        let summary = RewardSummary::new(t1(&[1.01, -0.5]), 0.0);
        assert!(scalar(&summary.log_rewards.get(1)).is_nan());
        assert!(!scalar(&summary.sharpe).is_finite());
    }
}
