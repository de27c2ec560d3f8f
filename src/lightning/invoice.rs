use anyhow::Result;
use bitcoin::hashes::Hash as _;
use lightning_invoice::Bolt11Invoice;
use std::str::FromStr as _;
use std::time::{Duration, SystemTime};

use super::PAYMENT_MAX_PARTS;

pub fn decode_bolt11(invoice: &str) -> Result<Bolt11Invoice> {
    Bolt11Invoice::from_str(invoice).map_err(|e| anyhow::anyhow!("parse BOLT11 invoice: {e:?}"))
}

pub fn payment_hash_from_bolt11(invoice: &Bolt11Invoice) -> [u8; 32] {
    invoice.payment_hash().to_byte_array()
}

pub fn amount_sat_from_bolt11(invoice: &Bolt11Invoice) -> Option<u64> {
    invoice.amount_milli_satoshis().map(|msat| msat / 1000)
}

pub fn is_expired_bolt11(invoice: &Bolt11Invoice) -> bool {
    let Some(expires_at) = invoice.expires_at() else {
        return false;
    };
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0));
    now >= expires_at
}

/// Amount used when probing routes towards the invoice's payee.
///
/// Multi-part capable payees are probed with the per-part amount since no
/// single route needs to carry the whole payment. Never probes below 1 sat.
pub fn route_probe_amount_sat(invoice: &Bolt11Invoice) -> u64 {
    let amount = amount_sat_from_bolt11(invoice).unwrap_or(0);
    let supports_mpp = invoice
        .features()
        .map(|f| f.supports_basic_mpp())
        .unwrap_or(false);

    let probe = if supports_mpp {
        amount.div_ceil(PAYMENT_MAX_PARTS)
    } else {
        amount
    };
    probe.max(1)
}
