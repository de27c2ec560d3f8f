use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairLimits {
    pub minimal: u64,
    pub maximal: u64,
}

/// Pair metadata as supplied by the external rate provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairInfo {
    pub rate: f64,
    pub limits: PairLimits,
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Metadata for a pair id like `BTC/BTC`; `None` for unknown pairs.
    async fn pair_info(&self, pair: &str) -> Result<Option<PairInfo>>;

    /// Whether an unconfirmed lockup of `amount` on `symbol` may be trusted.
    /// The threshold logic is the provider's business.
    async fn accept_zero_conf(&self, symbol: &str, amount: u64) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeEstimate {
    pub base: u64,
    pub percentage: u64,
    pub miner: u64,
}

#[async_trait]
pub trait FeeEstimator: Send + Sync {
    /// Fees for a quoted amount, all absolute in the chain's smallest unit.
    async fn estimate(&self, pair: &str, amount: u64) -> Result<FeeEstimate>;
}
