pub mod invoice;

use anyhow::Result;
use async_trait::async_trait;
use bitcoin::secp256k1::PublicKey;

/// Most parts a Lightning client will split a payment into. Route probes for
/// MPP invoices use `amount / PAYMENT_MAX_PARTS` per part.
pub const PAYMENT_MAX_PARTS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Absolute CLTV of the route's first hop.
    pub total_time_lock: u32,
}

/// Result of a routability probe towards an invoice's payee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routability {
    NoRoutes,
    /// Maximum `total_time_lock` across the returned routes.
    TimeLock(u32),
}

/// Outcome of `LndClient::track_payment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    InFlight,
    Succeeded,
    Failed,
}

#[async_trait]
pub trait LightningClient: Send + Sync {
    async fn block_height(&self) -> Result<u32>;

    /// Queries routes to `destination` constrained by `cltv_limit`.
    async fn query_routes(
        &self,
        destination: PublicKey,
        amount_sat: u64,
        cltv_limit: u32,
    ) -> Result<Vec<Route>>;

    /// Creates a hold invoice locked to `preimage_hash`. The invoice is not
    /// settled automatically; it stays `accepted` until settled or cancelled.
    async fn create_hold_invoice(
        &self,
        preimage_hash: [u8; 32],
        amount_msat: u64,
        expiry_secs: u32,
    ) -> Result<String>;

    async fn settle_hold_invoice(&self, preimage: [u8; 32]) -> Result<()>;

    async fn cancel_hold_invoice(&self, preimage_hash: [u8; 32]) -> Result<()>;

    /// Pays `invoice`, returning the preimage on success.
    async fn pay_invoice(&self, invoice: &str, cltv_limit: Option<u32>) -> Result<[u8; 32]>;
}

#[async_trait]
pub trait LndClient: LightningClient {
    async fn track_payment(&self, payment_hash: [u8; 32]) -> Result<PaymentState>;
}

#[async_trait]
pub trait ClnClient: LightningClient {
    /// Whether CLN has any payment record for `invoice`.
    async fn check_pay_status(&self, invoice: &str) -> Result<bool>;
}
