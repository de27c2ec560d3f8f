use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::{ChainClient, Wallet};
use crate::errors::{Error, Result};
use crate::lightning::{ClnClient, LightningClient, LndClient};

/// Minutes per block for the chains the service knows about. Unknown tokens
/// fall back to the generic (EVM) block time.
pub fn block_time_minutes(symbol: &str) -> f64 {
    match symbol {
        "BTC" => 10.0,
        "LTC" => 2.5,
        "ETH" => 0.2,
        "L-BTC" | "LIQUID" | "ELEMENTS" => 1.0,
        _ => 0.2,
    }
}

/// Converts a block count on one chain into the equivalent count on another.
///
/// Rounds up so that a timeout expressed on the faster chain never undercuts
/// the wall-clock span it was derived from.
pub fn convert_blocks(from: &str, to: &str, blocks: u32) -> u32 {
    let minutes = f64::from(blocks) * block_time_minutes(from);
    (minutes / block_time_minutes(to)).ceil() as u32
}

/// A currency with its optional backend handles. Capability queries replace
/// any class hierarchy: a currency is UTXO-based iff it has a chain client,
/// and Lightning-capable iff it has an LND or CLN handle.
#[derive(Clone, Default)]
pub struct Currency {
    pub symbol: String,
    pub chain: Option<Arc<dyn ChainClient>>,
    pub wallet: Option<Arc<dyn Wallet>>,
    pub lnd: Option<Arc<dyn LndClient>>,
    pub cln: Option<Arc<dyn ClnClient>>,
}

impl Currency {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn is_utxo(&self) -> bool {
        self.chain.is_some()
    }

    pub fn has_lightning(&self) -> bool {
        self.lnd.is_some() || self.cln.is_some()
    }

    /// Preferred Lightning handle; LND wins when both are configured.
    pub fn lightning(&self) -> Option<Arc<dyn LightningClient>> {
        if let Some(lnd) = &self.lnd {
            let client: Arc<dyn LightningClient> = lnd.clone();
            return Some(client);
        }
        self.cln.as_ref().map(|cln| {
            let client: Arc<dyn LightningClient> = cln.clone();
            client
        })
    }
}

#[derive(Clone, Default)]
pub struct CurrencyRegistry {
    currencies: HashMap<String, Currency>,
}

impl CurrencyRegistry {
    pub fn new(currencies: impl IntoIterator<Item = Currency>) -> Self {
        Self {
            currencies: currencies
                .into_iter()
                .map(|c| (c.symbol.clone(), c))
                .collect(),
        }
    }

    pub fn get(&self, symbol: &str) -> Result<&Currency> {
        self.currencies
            .get(symbol)
            .ok_or_else(|| Error::CurrencyNotFound(symbol.to_string()))
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.currencies.contains_key(symbol)
    }
}

/// Splits a pair id like `BTC/BTC` into `(base, quote)`.
pub fn split_pair(pair: &str) -> Result<(&str, &str)> {
    pair.split_once('/')
        .filter(|(base, quote)| !base.is_empty() && !quote.is_empty())
        .ok_or_else(|| Error::PairNotFound(pair.to_string()))
}
