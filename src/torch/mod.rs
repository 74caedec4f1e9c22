pub mod allocator;
pub mod attention;
pub mod encoder;
pub mod feed;
pub mod model;
pub mod portfolio;
pub mod reward;

pub use feed::Feed;
pub use portfolio::{DrlPortfolio, TradeOutcome, TrainStats};
