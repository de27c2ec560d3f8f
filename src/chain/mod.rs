pub mod scripts;

use anyhow::Result;
use async_trait::async_trait;
use bitcoin::secp256k1::{PublicKey, SecretKey};

/// Read access to a UTXO chain backend. Block observation itself lives with
/// the observers; the core only pulls heights and raw transactions.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_height(&self) -> Result<u32>;

    async fn raw_transaction(&self, txid: &str) -> Result<Vec<u8>>;
}

/// Result of funding a lockup address from the service wallet.
#[derive(Debug, Clone)]
pub struct FundingResult {
    pub transaction_id: String,
    pub miner_fee: u64,
}

/// Everything a wallet needs to spend a swap's lockup output.
#[derive(Debug, Clone)]
pub struct HtlcRef {
    pub symbol: String,
    pub lockup_transaction_id: String,
    pub lockup_address: String,
    pub redeem_script: String,
    pub key_index: u32,
    pub timeout_block_height: u32,
}

/// The service's wallet for one currency. Key derivation, coin selection and
/// transaction construction are the wallet's business; the core only refers
/// to keys by derivation index.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Allocates a derivation index for a new swap. Idempotent under retry:
    /// an index that was allocated but never persisted may be handed out
    /// again.
    fn next_key_index(&self) -> u32;

    fn derive_public_key(&self, index: u32) -> Result<PublicKey>;

    fn derive_secret_key(&self, index: u32) -> Result<SecretKey>;

    async fn balance(&self) -> Result<u64>;

    /// Builds and broadcasts a lockup transaction paying `amount_sat` to
    /// `address`.
    async fn send_to_address(&self, address: &str, amount_sat: u64) -> Result<FundingResult>;

    /// Claims an HTLC output with the preimage, returning the claim txid.
    async fn claim_htlc(&self, htlc: &HtlcRef, preimage: [u8; 32]) -> Result<String>;

    /// Refunds an HTLC output after its timeout, returning the refund txid.
    async fn refund_htlc(&self, htlc: &HtlcRef) -> Result<String>;
}
