use thiserror::Error;

/// Service-level failures with stable string codes.
///
/// The codes are part of the external protocol: transports map them verbatim
/// into their own error envelopes, so spellings must not change.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not find currency: {0}")]
    CurrencyNotFound(String),

    #[error("could not find pair: {0}")]
    PairNotFound(String),

    #[error("could not find order side: {0}")]
    OrderSideNotFound(String),

    #[error("invalid preimage hash: {0}")]
    InvalidPreimageHash(String),

    #[error("could not find script type: {0}")]
    ScriptTypeNotFound(String),

    #[error("reverse swaps are disabled")]
    ReverseSwapsDisabled,

    #[error("{amount} exceeds maximal of {maximal}")]
    ExceedMaximalAmount { amount: u64, maximal: u64 },

    #[error("{amount} is beneath minimal of {minimal}")]
    BeneathMinimalAmount { amount: u64, minimal: u64 },

    #[error("onchain amount is too low")]
    OnchainAmountTooLow,

    #[error(
        "minimal swap expiry of {route_minutes} minutes is greater than the maximal of {max_minutes} minutes"
    )]
    MinExpiryTooBig { max_minutes: u64, route_minutes: u64 },

    #[error("a swap with this invoice exists already")]
    SwapWithInvoiceExists,

    #[error("a swap with this preimage hash exists already")]
    SwapWithPreimageExists,

    #[error("currency {0} has no Lightning client")]
    NoLndClient(String),

    #[error("currency {0} is not UTXO based")]
    CurrencyNotUtxoBased(String),

    #[error("invalid timeout block delta: {0}")]
    InvalidTimeoutBlockDelta(String),

    #[error("not enough funds: {available} < {required}")]
    NotEnoughFunds { available: u64, required: u64 },

    #[error("swap is not eligible for a cooperative refund")]
    NotEligibleForCooperativeRefund,

    #[error("swap is not eligible for a cooperative claim")]
    NotEligibleForCooperativeClaim,

    #[error("incorrect preimage")]
    IncorrectPreimage,

    #[error("could not find swap: {0}")]
    SwapNotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::CurrencyNotFound(_) => "CURRENCY_NOT_FOUND",
            Error::PairNotFound(_) => "PAIR_NOT_FOUND",
            Error::OrderSideNotFound(_) => "ORDER_SIDE_NOT_FOUND",
            Error::InvalidPreimageHash(_) => "INVALID_PREIMAGE_HASH",
            Error::ScriptTypeNotFound(_) => "SCRIPT_TYPE_NOT_FOUND",
            Error::ReverseSwapsDisabled => "REVERSE_SWAPS_DISABLED",
            Error::ExceedMaximalAmount { .. } => "EXCEED_MAXIMAL_AMOUNT",
            Error::BeneathMinimalAmount { .. } => "BENEATH_MINIMAL_AMOUNT",
            Error::OnchainAmountTooLow => "ONCHAIN_AMOUNT_TOO_LOW",
            Error::MinExpiryTooBig { .. } => "MIN_EXPIRY_TOO_BIG",
            Error::SwapWithInvoiceExists => "SWAP_WITH_INVOICE_EXISTS",
            Error::SwapWithPreimageExists => "SWAP_WITH_PREIMAGE_EXISTS",
            Error::NoLndClient(_) => "NO_LND_CLIENT",
            Error::CurrencyNotUtxoBased(_) => "CURRENCY_NOT_UTXO_BASED",
            Error::InvalidTimeoutBlockDelta(_) => "INVALID_TIMEOUT_BLOCK_DELTA",
            Error::NotEnoughFunds { .. } => "NOT_ENOUGH_FUNDS",
            Error::NotEligibleForCooperativeRefund => "NOT_ELIGIBLE_FOR_COOPERATIVE_REFUND",
            Error::NotEligibleForCooperativeClaim => "NOT_ELIGIBLE_FOR_COOPERATIVE_CLAIM",
            Error::IncorrectPreimage => "INCORRECT_PREIMAGE",
            Error::SwapNotFound(_) => "SWAP_NOT_FOUND",
            Error::Internal(_) => "INTERNAL",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
