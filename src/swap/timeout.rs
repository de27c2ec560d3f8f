use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use anyhow::Context as _;
use lightning_invoice::Bolt11Invoice;

use crate::config::{Config, TimeoutDeltaConfig, TimeoutDeltaMinutes};
use crate::currency::{block_time_minutes, convert_blocks, split_pair};
use crate::errors::{Error, Result};
use crate::lightning::invoice::route_probe_amount_sat;
use crate::lightning::{LightningClient, Routability};
use crate::swap::{OrderSide, SwapKind};

/// Wall-clock slack added on top of a route's CLTV requirement to absorb
/// routing retries before the on-chain timeout starts to matter.
const ROUTING_OFFSET_MINUTES: u64 = 60;

/// Timeout deltas for one side of a pair, in blocks of that side's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairTimeoutBlockDeltas {
    pub reverse: u32,
    pub swap_minimal: u32,
    pub swap_maximal: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairDeltas {
    pub base: PairTimeoutBlockDeltas,
    pub quote: PairTimeoutBlockDeltas,
}

impl PairDeltas {
    pub fn side(&self, side: PairSide) -> PairTimeoutBlockDeltas {
        match side {
            PairSide::Base => self.base,
            PairSide::Quote => self.quote,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSide {
    Base,
    Quote,
}

impl PairSide {
    pub fn other(self) -> PairSide {
        match self {
            PairSide::Base => PairSide::Quote,
            PairSide::Quote => PairSide::Base,
        }
    }
}

/// Pair side of the on-chain leg of a swap.
pub fn chain_pair_side(side: OrderSide, kind: SwapKind) -> PairSide {
    match kind {
        // The service locks up on the chain the user is buying on.
        SwapKind::ReverseSubmarine | SwapKind::ChainToChain => match side {
            OrderSide::Buy => PairSide::Base,
            OrderSide::Sell => PairSide::Quote,
        },
        SwapKind::Submarine => match side {
            OrderSide::Buy => PairSide::Quote,
            OrderSide::Sell => PairSide::Base,
        },
    }
}

pub fn lightning_pair_side(side: OrderSide, kind: SwapKind) -> PairSide {
    chain_pair_side(side, kind).other()
}

pub fn pair_symbol<'a>(base: &'a str, quote: &'a str, side: PairSide) -> &'a str {
    match side {
        PairSide::Base => base,
        PairSide::Quote => quote,
    }
}

/// Couples on-chain block timeouts with Lightning CLTV so that in every
/// adversarial ordering the honest party can recover.
pub struct TimeoutDeltaProvider {
    config_path: PathBuf,
    config: Mutex<Config>,
    deltas: RwLock<HashMap<String, PairDeltas>>,
}

impl TimeoutDeltaProvider {
    pub fn new(config: Config, config_path: PathBuf) -> Result<Self> {
        let mut deltas = HashMap::new();
        for pair in &config.pairs {
            let minutes = pair.timeout_delta.minutes();
            let entry = PairDeltas {
                base: minutes_to_block_deltas(&pair.base, minutes)?,
                quote: minutes_to_block_deltas(&pair.quote, minutes)?,
            };
            deltas.insert(pair.id(), entry);
        }

        Ok(Self {
            config_path,
            config: Mutex::new(config),
            deltas: RwLock::new(deltas),
        })
    }

    pub fn get_timeouts(&self, pair: &str) -> Result<PairDeltas> {
        self.deltas
            .read()
            .expect("deltas lock poisoned")
            .get(pair)
            .copied()
            .ok_or_else(|| Error::PairNotFound(pair.to_string()))
    }

    /// Timeout delta in blocks for a new swap, plus whether the value is
    /// usable as-is. Reverse swaps report `false` since the delta applies to
    /// the service's own leg; a submarine swap whose invoice could not be
    /// probed reports `false` to flag the maximal fallback.
    pub async fn get_timeout(
        &self,
        pair: &str,
        side: OrderSide,
        kind: SwapKind,
        invoice: Option<&Bolt11Invoice>,
        lightning: Option<&dyn LightningClient>,
    ) -> Result<(u32, bool)> {
        let (base, quote) = split_pair(pair)?;
        let deltas = self.get_timeouts(pair)?;
        let chain_side = chain_pair_side(side, kind);

        match kind {
            SwapKind::ReverseSubmarine => Ok((deltas.side(chain_side).reverse, false)),
            SwapKind::Submarine => match invoice {
                None => Ok((deltas.side(chain_side).swap_minimal, true)),
                Some(invoice) => {
                    let lightning =
                        lightning.ok_or_else(|| Error::NoLndClient(pair.to_string()))?;
                    let chain_symbol = pair_symbol(base, quote, chain_side);
                    let ln_symbol = pair_symbol(base, quote, chain_side.other());
                    self.get_timeout_invoice(
                        chain_symbol,
                        ln_symbol,
                        deltas.side(chain_side),
                        deltas.side(chain_side.other()),
                        invoice,
                        lightning,
                    )
                    .await
                }
            },
            SwapKind::ChainToChain => Ok((deltas.side(chain_side).reverse, false)),
        }
    }

    /// Probes routes to the invoice's payee and fits the on-chain timeout to
    /// the CLTV the routes actually need.
    async fn get_timeout_invoice(
        &self,
        chain_symbol: &str,
        ln_symbol: &str,
        chain_deltas: PairTimeoutBlockDeltas,
        ln_deltas: PairTimeoutBlockDeltas,
        invoice: &Bolt11Invoice,
        lightning: &dyn LightningClient,
    ) -> Result<(u32, bool)> {
        let routability =
            check_routability(lightning, invoice, ln_deltas.swap_maximal).await;

        let route_time_lock = match routability {
            Routability::NoRoutes => {
                tracing::warn!(
                    payee = %invoice.payment_hash(),
                    "no routes found; accepting swap with maximal timeout"
                );
                return Ok((chain_deltas.swap_maximal, false));
            }
            Routability::TimeLock(lock) => lock,
        };

        let current_ln_block = lightning
            .block_height()
            .await
            .context("get lightning block height")?;
        let route_delta_blocks = u64::from(route_time_lock.saturating_sub(current_ln_block));

        let ln_block_time = block_time_minutes(ln_symbol);
        let chain_block_time = block_time_minutes(chain_symbol);

        let route_minutes = (route_delta_blocks as f64 * ln_block_time).ceil() as u64;
        let final_expiry_minutes = route_minutes + ROUTING_OFFSET_MINUTES;
        let min_timeout = (final_expiry_minutes as f64 / chain_block_time).ceil() as u32;

        if min_timeout > chain_deltas.swap_maximal {
            return Err(Error::MinExpiryTooBig {
                max_minutes: (f64::from(chain_deltas.swap_maximal) * chain_block_time).ceil()
                    as u64,
                route_minutes,
            });
        }

        Ok((chain_deltas.swap_minimal.max(min_timeout), true))
    }

    /// Replaces a pair's deltas and persists them back to the config file.
    pub fn set_timeout(&self, pair: &str, minutes: TimeoutDeltaMinutes) -> Result<()> {
        let (base, quote) = split_pair(pair)?;
        let entry = PairDeltas {
            base: minutes_to_block_deltas(base, minutes)?,
            quote: minutes_to_block_deltas(quote, minutes)?,
        };

        {
            let mut deltas = self.deltas.write().expect("deltas lock poisoned");
            if !deltas.contains_key(pair) {
                return Err(Error::PairNotFound(pair.to_string()));
            }
            deltas.insert(pair.to_string(), entry);
        }

        let mut config = self.config.lock().expect("config lock poisoned");
        let pair_config = config
            .pair_mut(pair)
            .ok_or_else(|| Error::PairNotFound(pair.to_string()))?;
        pair_config.timeout_delta = TimeoutDeltaConfig::Table(minutes);
        config.save(&self.config_path).context("persist config")?;

        tracing::info!(%pair, ?minutes, "updated timeout deltas");
        Ok(())
    }

    /// CLTV budget for an outbound Lightning payment, given the blocks left
    /// until the on-chain timeout. Keeps a safety margin of two blocks.
    pub fn cltv_limit(&self, chain_symbol: &str, ln_symbol: &str, blocks_left: u32) -> u32 {
        convert_blocks(chain_symbol, ln_symbol, blocks_left).saturating_sub(2)
    }
}

/// Maximum `total_time_lock` across routes to the payee, within `cltv_limit`.
/// Probe failures count as unroutable rather than failing the swap.
pub async fn check_routability(
    lightning: &dyn LightningClient,
    invoice: &Bolt11Invoice,
    cltv_limit: u32,
) -> Routability {
    let destination = invoice.recover_payee_pub_key();
    let amount = route_probe_amount_sat(invoice);

    match lightning.query_routes(destination, amount, cltv_limit).await {
        Ok(routes) => routes
            .iter()
            .map(|r| r.total_time_lock)
            .max()
            .map_or(Routability::NoRoutes, Routability::TimeLock),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "route query failed");
            Routability::NoRoutes
        }
    }
}

fn minutes_to_block_deltas(
    symbol: &str,
    minutes: TimeoutDeltaMinutes,
) -> Result<PairTimeoutBlockDeltas> {
    Ok(PairTimeoutBlockDeltas {
        reverse: minutes_to_blocks(symbol, minutes.reverse)?,
        swap_minimal: minutes_to_blocks(symbol, minutes.swap_minimal)?,
        swap_maximal: minutes_to_blocks(symbol, minutes.swap_maximal)?,
    })
}

fn minutes_to_blocks(symbol: &str, minutes: u64) -> Result<u32> {
    let blocks = minutes as f64 / block_time_minutes(symbol);
    if blocks < 1.0 || (blocks - blocks.round()).abs() > 1e-9 {
        return Err(Error::InvalidTimeoutBlockDelta(format!(
            "{minutes} minutes is not a whole number of {symbol} blocks"
        )));
    }
    Ok(blocks.round() as u32)
}
