pub mod builder;
pub mod events;
pub mod musig;
pub mod nursery;
pub mod service;
pub mod store;
pub mod timeout;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum SwapKind {
    Submarine,
    ReverseSubmarine,
    ChainToChain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
            .map_err(|_| Error::OrderSideNotFound(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum SwapVersion {
    Legacy,
    Taproot,
}

impl SwapVersion {
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
            .map_err(|_| Error::ScriptTypeNotFound(s.to_string()))
    }
}

/// Swap lifecycle states. The `Display`/`FromStr` spellings are the wire
/// strings of the status feed and of persisted records; they must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum SwapStatus {
    SwapCreated,
    TransactionWaiting,
    TransactionMempool,
    TransactionConfirmed,
    TransactionLockupFailed,
    TransactionFailed,
    InvoicePending,
    InvoicePaid,
    InvoiceFailedToPay,
    InvoiceSettled,
    InvoiceExpired,
    ChannelCreated,
    TransactionClaimed,
    TransactionRefunded,
    SwapExpired,
}

impl SwapStatus {
    /// Direct successors in the lifecycle DAG.
    fn successors(self) -> &'static [SwapStatus] {
        use SwapStatus::*;

        match self {
            SwapCreated => &[TransactionMempool, TransactionLockupFailed, SwapExpired],
            TransactionWaiting => &[TransactionMempool, TransactionLockupFailed, SwapExpired],
            TransactionLockupFailed => &[TransactionMempool, SwapExpired],
            TransactionMempool => &[
                TransactionConfirmed,
                InvoicePending,
                InvoiceSettled,
                InvoiceExpired,
                SwapExpired,
                TransactionFailed,
            ],
            TransactionConfirmed => &[
                InvoicePending,
                InvoiceSettled,
                InvoiceExpired,
                SwapExpired,
                TransactionFailed,
            ],
            InvoicePending => &[
                InvoicePaid,
                InvoiceFailedToPay,
                InvoiceSettled,
                ChannelCreated,
            ],
            ChannelCreated => &[InvoicePaid, InvoiceFailedToPay],
            InvoicePaid => &[TransactionClaimed],
            InvoiceSettled => &[TransactionClaimed],
            InvoiceFailedToPay => &[SwapExpired, TransactionRefunded],
            InvoiceExpired => &[SwapExpired],
            SwapExpired => &[TransactionRefunded],
            TransactionFailed | TransactionClaimed | TransactionRefunded => &[],
        }
    }

    /// Whether `to` can still be reached from `self` by walking the DAG.
    /// Every status reaches itself.
    pub fn reachable(self, to: SwapStatus) -> bool {
        if self == to {
            return true;
        }

        let mut stack = vec![self];
        let mut seen = std::collections::HashSet::new();
        while let Some(status) = stack.pop() {
            for &next in status.successors() {
                if next == to {
                    return true;
                }
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        false
    }

    /// States in which a swap has failed and a cooperative refund may be
    /// considered.
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            SwapStatus::TransactionFailed
                | SwapStatus::InvoiceFailedToPay
                | SwapStatus::SwapExpired
                | SwapStatus::TransactionRefunded
                | SwapStatus::InvoiceExpired
        )
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    pub fn initial(kind: SwapKind) -> SwapStatus {
        match kind {
            SwapKind::Submarine => SwapStatus::SwapCreated,
            SwapKind::ReverseSubmarine => SwapStatus::TransactionMempool,
            SwapKind::ChainToChain => SwapStatus::TransactionWaiting,
        }
    }
}

/// A swap paying a Lightning invoice from an on-chain lockup.
#[derive(Debug, Clone)]
pub struct SubmarineSwap {
    pub id: String,
    pub pair: String,
    pub order_side: OrderSide,
    pub version: SwapVersion,
    pub status: SwapStatus,
    pub fee: u64,
    pub preimage_hash: String,
    pub preimage: Option<String>,

    pub invoice: String,
    pub invoice_amount: u64,
    pub expected_amount: u64,
    pub accept_zero_conf: bool,

    pub lockup_address: String,
    pub redeem_script: String,
    pub key_index: u32,
    pub refund_public_key: String,
    pub timeout_block_height: u32,
    pub lockup_transaction_id: Option<String>,
}

/// A swap paying out on-chain once a Lightning hold invoice is accepted.
#[derive(Debug, Clone)]
pub struct ReverseSwap {
    pub id: String,
    pub pair: String,
    pub order_side: OrderSide,
    pub version: SwapVersion,
    pub status: SwapStatus,
    pub fee: u64,
    pub preimage_hash: String,
    pub preimage: Option<String>,

    pub invoice: String,
    pub invoice_amount: u64,
    pub onchain_amount: u64,
    pub miner_fee: u64,

    pub claim_public_key: String,
    pub lockup_address: String,
    pub redeem_script: String,
    pub key_index: u32,
    pub transaction_id: String,
    pub timeout_block_height: u32,
}

/// One leg of a chain-to-chain swap.
#[derive(Debug, Clone)]
pub struct ChainSwapLeg {
    pub symbol: String,
    pub lockup_address: String,
    pub expected_amount: u64,
    pub redeem_script: String,
    pub key_index: u32,
    pub timeout_block_height: u32,
    pub lockup_transaction_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChainSwap {
    pub id: String,
    pub pair: String,
    pub order_side: OrderSide,
    pub version: SwapVersion,
    pub status: SwapStatus,
    pub fee: u64,
    pub preimage_hash: String,
    pub preimage: Option<String>,
    pub accept_zero_conf: bool,

    pub claim_public_key: String,
    pub refund_public_key: String,

    /// Leg the service funds; the user claims it with the preimage.
    pub sending: ChainSwapLeg,
    /// Leg the user funds; the service claims it once the preimage is known.
    pub receiving: ChainSwapLeg,
}

/// Any persisted swap, used where callers only know an id.
#[derive(Debug, Clone)]
pub enum AnySwap {
    Submarine(SubmarineSwap),
    Reverse(ReverseSwap),
    Chain(ChainSwap),
}

impl AnySwap {
    pub fn id(&self) -> &str {
        match self {
            AnySwap::Submarine(s) => &s.id,
            AnySwap::Reverse(s) => &s.id,
            AnySwap::Chain(s) => &s.id,
        }
    }

    pub fn kind(&self) -> SwapKind {
        match self {
            AnySwap::Submarine(_) => SwapKind::Submarine,
            AnySwap::Reverse(_) => SwapKind::ReverseSubmarine,
            AnySwap::Chain(_) => SwapKind::ChainToChain,
        }
    }

    pub fn status(&self) -> SwapStatus {
        match self {
            AnySwap::Submarine(s) => s.status,
            AnySwap::Reverse(s) => s.status,
            AnySwap::Chain(s) => s.status,
        }
    }
}

/// 16 hex chars from a random 64-bit source.
pub fn generate_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_dag_is_monotone() {
        assert!(SwapStatus::SwapCreated.reachable(SwapStatus::TransactionClaimed));
        assert!(SwapStatus::TransactionMempool.reachable(SwapStatus::TransactionRefunded));
        assert!(!SwapStatus::TransactionClaimed.reachable(SwapStatus::SwapCreated));
        assert!(!SwapStatus::TransactionRefunded.reachable(SwapStatus::TransactionClaimed));
        assert!(!SwapStatus::InvoicePaid.reachable(SwapStatus::InvoicePending));
    }

    #[test]
    fn failed_states_never_reach_success() {
        for status in [
            SwapStatus::TransactionFailed,
            SwapStatus::TransactionRefunded,
        ] {
            assert!(!status.reachable(SwapStatus::TransactionClaimed));
            assert!(!status.reachable(SwapStatus::InvoiceSettled));
        }
    }

    #[test]
    fn wire_spellings_are_stable() {
        assert_eq!(SwapStatus::SwapCreated.to_string(), "SwapCreated");
        assert_eq!(
            SwapStatus::InvoiceFailedToPay.to_string(),
            "InvoiceFailedToPay"
        );
        assert_eq!(
            "TransactionMempool".parse::<SwapStatus>().unwrap(),
            SwapStatus::TransactionMempool
        );
        assert_eq!(OrderSide::Buy.to_string(), "BUY");
    }
}
