use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use bitcoin::Network;
use bitcoin::secp256k1::{PublicKey, Secp256k1};

use crate::chain::scripts::{HtlcSpec, SwapTree, bip21};
use crate::currency::{CurrencyRegistry, split_pair};
use crate::errors::{Error, Result};
use crate::lightning::invoice::{decode_bolt11, payment_hash_from_bolt11};
use crate::rates::{FeeEstimator, PairInfo, RateProvider};
use crate::swap::musig::aggregate_public_keys;
use crate::swap::service::ServiceState;
use crate::swap::store::SqliteStore;
use crate::swap::timeout::{TimeoutDeltaProvider, chain_pair_side, lightning_pair_side, pair_symbol};
use crate::swap::{
    ChainSwap, ChainSwapLeg, OrderSide, ReverseSwap, SubmarineSwap, SwapKind, SwapStatus,
    SwapVersion, generate_id,
};

const HOLD_INVOICE_EXPIRY_SECS: u32 = 3600;

/// Key roles of a lockup output. `service`/`counterparty` fix the MuSig2
/// aggregation order; `claim`/`refund` pick the script-path leaves.
#[derive(Debug, Clone, Copy)]
struct LockupKeys {
    service: PublicKey,
    counterparty: PublicKey,
    claim: PublicKey,
    refund: PublicKey,
}

#[derive(Debug, Clone)]
pub struct CreatedSubmarineSwap {
    pub id: String,
    pub address: String,
    pub redeem_script: String,
    pub accept_zero_conf: bool,
    pub expected_amount: u64,
    pub timeout_block_height: u32,
    pub bip21: String,
}

#[derive(Debug, Clone)]
pub struct CreatedReverseSwap {
    pub id: String,
    pub invoice: String,
    pub lockup_address: String,
    pub redeem_script: String,
    pub onchain_amount: u64,
    pub lockup_transaction_id: String,
    pub timeout_block_height: u32,
}

#[derive(Debug, Clone)]
pub struct CreatedChainSwap {
    pub id: String,
    pub receiving_address: String,
    pub receiving_expected_amount: u64,
    pub receiving_timeout_block_height: u32,
    pub sending_timeout_block_height: u32,
    pub bip21: String,
}

/// Validates quote requests, generates lockup scripts, funds the legs the
/// service owns, and hands finished records to the repository.
pub struct SwapBuilder {
    network: Network,
    currencies: CurrencyRegistry,
    rates: Arc<dyn RateProvider>,
    fees: Arc<dyn FeeEstimator>,
    timeouts: Arc<TimeoutDeltaProvider>,
    store: Arc<Mutex<SqliteStore>>,
    state: Arc<ServiceState>,
}

impl SwapBuilder {
    pub fn new(
        network: Network,
        currencies: CurrencyRegistry,
        rates: Arc<dyn RateProvider>,
        fees: Arc<dyn FeeEstimator>,
        timeouts: Arc<TimeoutDeltaProvider>,
        store: Arc<Mutex<SqliteStore>>,
        state: Arc<ServiceState>,
    ) -> Self {
        Self {
            network,
            currencies,
            rates,
            fees,
            timeouts,
            store,
            state,
        }
    }

    /// Chain → Lightning. The user locks funds on-chain; the service pays the
    /// invoice and claims the lockup with the revealed preimage.
    pub async fn create_swap(
        &self,
        pair: &str,
        side: OrderSide,
        version: SwapVersion,
        invoice: &str,
        refund_public_key: &str,
    ) -> Result<CreatedSubmarineSwap> {
        let (info, chain_symbol, ln_symbol) =
            self.pair_context(pair, side, SwapKind::Submarine).await?;
        let chain_currency = self.currencies.get(chain_symbol)?.clone();
        let ln_currency = self.currencies.get(ln_symbol)?.clone();
        let lightning = ln_currency
            .lightning()
            .ok_or_else(|| Error::NoLndClient(ln_symbol.to_string()))?;

        let decoded = decode_bolt11(invoice)?;
        let invoice_amount = crate::lightning::invoice::amount_sat_from_bolt11(&decoded)
            .context("invoice must specify an amount")?;
        let preimage_hash = payment_hash_from_bolt11(&decoded);

        if self.store_lock().invoice_exists(invoice)? {
            return Err(Error::SwapWithInvoiceExists);
        }

        verify_amount(&info, invoice_amount, side, SwapKind::Submarine)?;

        let fees = self.fees.estimate(pair, invoice_amount).await?;
        let expected_amount = (invoice_amount as f64 * info.rate).ceil() as u64
            + fees.base
            + fees.percentage;

        let accept_zero_conf = self
            .rates
            .accept_zero_conf(chain_symbol, expected_amount)
            .await;

        let (timeout_delta, _usable) = self
            .timeouts
            .get_timeout(
                pair,
                side,
                SwapKind::Submarine,
                Some(&decoded),
                Some(lightning.as_ref()),
            )
            .await?;

        let chain = chain_currency
            .chain
            .as_ref()
            .ok_or_else(|| Error::CurrencyNotUtxoBased(chain_symbol.to_string()))?;
        let timeout_block_height = chain.block_height().await.context("get chain height")?
            + timeout_delta;

        let wallet = chain_currency
            .wallet
            .as_ref()
            .ok_or_else(|| Error::CurrencyNotFound(chain_symbol.to_string()))?;
        let key_index = wallet.next_key_index();
        let service_key = wallet.derive_public_key(key_index)?;
        let refund_key = parse_public_key(refund_public_key)?;

        // Service claims with the preimage; the user refunds after timeout.
        let (address, redeem_script) = self.lockup_script(
            version,
            preimage_hash,
            LockupKeys {
                service: service_key,
                counterparty: refund_key,
                claim: service_key,
                refund: refund_key,
            },
            timeout_block_height,
        )?;

        let id = generate_id();
        let swap = SubmarineSwap {
            id: id.clone(),
            pair: pair.to_string(),
            order_side: side,
            version,
            status: SwapStatus::initial(SwapKind::Submarine),
            fee: fees.base + fees.percentage,
            preimage_hash: hex::encode(preimage_hash),
            preimage: None,
            invoice: invoice.to_string(),
            invoice_amount,
            expected_amount,
            accept_zero_conf,
            lockup_address: address.clone(),
            redeem_script: redeem_script.clone(),
            key_index,
            refund_public_key: refund_public_key.to_string(),
            timeout_block_height,
            lockup_transaction_id: None,
        };
        self.store_lock().insert_submarine(&swap)?;

        tracing::info!(swap_id = %id, %pair, expected_amount, "created submarine swap");

        Ok(CreatedSubmarineSwap {
            bip21: bip21(
                &address,
                expected_amount,
                &format!("Send to {ln_symbol} lightning"),
            ),
            id,
            address,
            redeem_script,
            accept_zero_conf,
            expected_amount,
            timeout_block_height,
        })
    }

    /// Lightning → chain. The service issues a hold invoice locked to the
    /// user's preimage hash and locks the on-chain payout up front.
    pub async fn create_reverse_swap(
        &self,
        pair: &str,
        side: OrderSide,
        version: SwapVersion,
        invoice_amount: u64,
        preimage_hash: &str,
        claim_public_key: &str,
    ) -> Result<CreatedReverseSwap> {
        if !self.state.allow_reverse_swaps() {
            return Err(Error::ReverseSwapsDisabled);
        }

        let (info, chain_symbol, ln_symbol) =
            self.pair_context(pair, side, SwapKind::ReverseSubmarine).await?;
        let chain_currency = self.currencies.get(chain_symbol)?.clone();
        let ln_currency = self.currencies.get(ln_symbol)?.clone();
        let lightning = ln_currency
            .lightning()
            .ok_or_else(|| Error::NoLndClient(ln_symbol.to_string()))?;

        let preimage_hash_bytes = parse_preimage_hash(preimage_hash)?;
        if self.store_lock().preimage_hash_exists(preimage_hash)? {
            return Err(Error::SwapWithPreimageExists);
        }

        verify_amount(&info, invoice_amount, side, SwapKind::ReverseSubmarine)?;

        let fees = self.fees.estimate(pair, invoice_amount).await?;
        let onchain_amount = (invoice_amount as f64 * info.rate).floor() as i64
            - (fees.base + fees.percentage) as i64;
        if onchain_amount < 1 {
            return Err(Error::OnchainAmountTooLow);
        }
        let onchain_amount = onchain_amount as u64;

        let (timeout_delta, _) = self
            .timeouts
            .get_timeout(pair, side, SwapKind::ReverseSubmarine, None, None)
            .await?;

        let chain = chain_currency
            .chain
            .as_ref()
            .ok_or_else(|| Error::CurrencyNotUtxoBased(chain_symbol.to_string()))?;
        let timeout_block_height = chain.block_height().await.context("get chain height")?
            + timeout_delta;

        let wallet = chain_currency
            .wallet
            .as_ref()
            .ok_or_else(|| Error::CurrencyNotFound(chain_symbol.to_string()))?;
        let key_index = wallet.next_key_index();
        let service_key = wallet.derive_public_key(key_index)?;
        let claim_key = parse_public_key(claim_public_key)?;

        // User claims with the preimage; the service refunds after timeout.
        let (address, redeem_script) = self.lockup_script(
            version,
            preimage_hash_bytes,
            LockupKeys {
                service: service_key,
                counterparty: claim_key,
                claim: claim_key,
                refund: service_key,
            },
            timeout_block_height,
        )?;

        let invoice = lightning
            .create_hold_invoice(
                preimage_hash_bytes,
                invoice_amount * 1000,
                HOLD_INVOICE_EXPIRY_SECS,
            )
            .await
            .context("create hold invoice")?;

        let funding = wallet
            .send_to_address(&address, onchain_amount)
            .await
            .context("fund reverse swap lockup")?;

        let id = generate_id();
        let swap = ReverseSwap {
            id: id.clone(),
            pair: pair.to_string(),
            order_side: side,
            version,
            status: SwapStatus::initial(SwapKind::ReverseSubmarine),
            fee: fees.base + fees.percentage,
            preimage_hash: preimage_hash.to_string(),
            preimage: None,
            invoice: invoice.clone(),
            invoice_amount,
            onchain_amount,
            miner_fee: funding.miner_fee,
            claim_public_key: claim_public_key.to_string(),
            lockup_address: address.clone(),
            redeem_script: redeem_script.clone(),
            key_index,
            transaction_id: funding.transaction_id.clone(),
            timeout_block_height,
        };
        self.store_lock().insert_reverse(&swap)?;

        tracing::info!(swap_id = %id, %pair, onchain_amount, "created reverse swap");

        Ok(CreatedReverseSwap {
            id,
            invoice,
            lockup_address: address,
            redeem_script,
            onchain_amount,
            lockup_transaction_id: funding.transaction_id,
            timeout_block_height,
        })
    }

    /// Chain → chain. The user funds the receiving leg; the service funds the
    /// sending leg once that lockup is acceptable, and claims the user's
    /// lockup when the preimage shows up on its own leg.
    pub async fn create_chain_swap(
        &self,
        pair: &str,
        side: OrderSide,
        version: SwapVersion,
        amount: u64,
        preimage_hash: &str,
        claim_public_key: &str,
        refund_public_key: &str,
    ) -> Result<CreatedChainSwap> {
        let (base, quote) = split_pair(pair)?;
        let info = self.pair_info(pair).await?;
        let sending_symbol = pair_symbol(base, quote, chain_pair_side(side, SwapKind::ChainToChain));
        let receiving_symbol =
            pair_symbol(base, quote, chain_pair_side(side, SwapKind::ChainToChain).other());

        let preimage_hash_bytes = parse_preimage_hash(preimage_hash)?;
        if self.store_lock().preimage_hash_exists(preimage_hash)? {
            return Err(Error::SwapWithPreimageExists);
        }

        verify_amount(&info, amount, side, SwapKind::ChainToChain)?;

        let fees = self.fees.estimate(pair, amount).await?;
        let expected_amount =
            (amount as f64 * info.rate + (fees.base + fees.percentage) as f64).ceil() as u64;

        let sending_currency = self.currencies.get(sending_symbol)?.clone();
        let receiving_currency = self.currencies.get(receiving_symbol)?.clone();

        let sending_wallet = sending_currency
            .wallet
            .as_ref()
            .ok_or_else(|| Error::CurrencyNotFound(sending_symbol.to_string()))?;
        let available = sending_wallet.balance().await.context("sending balance")?;
        if available <= amount {
            return Err(Error::NotEnoughFunds {
                available,
                required: amount,
            });
        }

        let deltas = self.timeouts.get_timeouts(pair)?;
        let sending_side = chain_pair_side(side, SwapKind::ChainToChain);
        let sending_deltas = deltas.side(sending_side);
        let receiving_deltas = deltas.side(sending_side.other());

        // The service's leg must expire first in wall-clock terms so the user
        // cannot refund before the service can claim on the same preimage.
        let sending_delta = sending_deltas.reverse.min(crate::currency::convert_blocks(
            receiving_symbol,
            sending_symbol,
            receiving_deltas.reverse,
        ));
        let receiving_delta = receiving_deltas.reverse.max(crate::currency::convert_blocks(
            sending_symbol,
            receiving_symbol,
            sending_deltas.reverse,
        ));

        let sending_chain = sending_currency
            .chain
            .as_ref()
            .ok_or_else(|| Error::CurrencyNotUtxoBased(sending_symbol.to_string()))?;
        let receiving_chain = receiving_currency
            .chain
            .as_ref()
            .ok_or_else(|| Error::CurrencyNotUtxoBased(receiving_symbol.to_string()))?;

        let sending_height = sending_chain.block_height().await.context("sending height")?;
        let receiving_height = receiving_chain
            .block_height()
            .await
            .context("receiving height")?;

        let receiving_wallet = receiving_currency
            .wallet
            .as_ref()
            .ok_or_else(|| Error::CurrencyNotFound(receiving_symbol.to_string()))?;

        let claim_key = parse_public_key(claim_public_key)?;
        let refund_key = parse_public_key(refund_public_key)?;

        // Receiving leg: the user locks up, the service claims.
        let receiving_index = receiving_wallet.next_key_index();
        let receiving_service_key = receiving_wallet.derive_public_key(receiving_index)?;
        let receiving_timeout = receiving_height + receiving_delta;
        let (receiving_address, receiving_script) = self.lockup_script(
            version,
            preimage_hash_bytes,
            LockupKeys {
                service: receiving_service_key,
                counterparty: refund_key,
                claim: receiving_service_key,
                refund: refund_key,
            },
            receiving_timeout,
        )?;

        // Sending leg: the service locks up, the user claims.
        let sending_index = sending_wallet.next_key_index();
        let sending_service_key = sending_wallet.derive_public_key(sending_index)?;
        let sending_timeout = sending_height + sending_delta;
        let (sending_address, sending_script) = self.lockup_script(
            version,
            preimage_hash_bytes,
            LockupKeys {
                service: sending_service_key,
                counterparty: claim_key,
                claim: claim_key,
                refund: sending_service_key,
            },
            sending_timeout,
        )?;

        let accept_zero_conf = self
            .rates
            .accept_zero_conf(receiving_symbol, expected_amount)
            .await;

        let id = generate_id();
        let swap = ChainSwap {
            id: id.clone(),
            pair: pair.to_string(),
            order_side: side,
            version,
            status: SwapStatus::initial(SwapKind::ChainToChain),
            fee: fees.base + fees.percentage,
            preimage_hash: preimage_hash.to_string(),
            preimage: None,
            accept_zero_conf,
            claim_public_key: claim_public_key.to_string(),
            refund_public_key: refund_public_key.to_string(),
            sending: ChainSwapLeg {
                symbol: sending_symbol.to_string(),
                lockup_address: sending_address,
                expected_amount: amount,
                redeem_script: sending_script,
                key_index: sending_index,
                timeout_block_height: sending_timeout,
                lockup_transaction_id: None,
            },
            receiving: ChainSwapLeg {
                symbol: receiving_symbol.to_string(),
                lockup_address: receiving_address.clone(),
                expected_amount,
                redeem_script: receiving_script,
                key_index: receiving_index,
                timeout_block_height: receiving_timeout,
                lockup_transaction_id: None,
            },
        };
        self.store_lock().insert_chain(&swap)?;

        tracing::info!(swap_id = %id, %pair, expected_amount, "created chain swap");

        Ok(CreatedChainSwap {
            bip21: bip21(
                &receiving_address,
                expected_amount,
                &format!("Send to {sending_symbol} address"),
            ),
            id,
            receiving_address,
            receiving_expected_amount: expected_amount,
            receiving_timeout_block_height: receiving_timeout,
            sending_timeout_block_height: sending_timeout,
        })
    }

    /// Builds the lockup script and address. For Taproot the internal key is
    /// always the MuSig2 aggregate of `[service, counterparty]`, regardless
    /// of which role claims and which refunds, so the cooperative signer
    /// reconstructs the same key.
    fn lockup_script(
        &self,
        version: SwapVersion,
        preimage_hash: [u8; 32],
        keys: LockupKeys,
        timeout_block_height: u32,
    ) -> Result<(String, String)> {
        match version {
            SwapVersion::Legacy => {
                let spec = HtlcSpec {
                    preimage_hash,
                    claim_pubkey: keys.claim,
                    refund_pubkey: keys.refund,
                    timeout_block_height,
                };
                let script = spec.witness_script();
                let address = spec.p2wsh_address(self.network);
                Ok((address.to_string(), hex::encode(script.as_bytes())))
            }
            SwapVersion::Taproot => {
                let secp = Secp256k1::new();
                let internal_key = aggregate_public_keys(&keys.service, &keys.counterparty)?;
                let tree = SwapTree::new(
                    preimage_hash,
                    keys.claim.x_only_public_key().0,
                    keys.refund.x_only_public_key().0,
                    timeout_block_height,
                );
                let address = tree.address(&secp, internal_key, self.network)?;
                Ok((address.to_string(), tree.serialize_hex()))
            }
        }
    }

    async fn pair_context<'a>(
        &self,
        pair: &'a str,
        side: OrderSide,
        kind: SwapKind,
    ) -> Result<(PairInfo, &'a str, &'a str)> {
        let (base, quote) = split_pair(pair)?;
        for symbol in [base, quote] {
            if !self.currencies.contains(symbol) {
                return Err(Error::CurrencyNotFound(symbol.to_string()));
            }
        }

        let info = self.pair_info(pair).await?;
        let chain_symbol = pair_symbol(base, quote, chain_pair_side(side, kind));
        let ln_symbol = pair_symbol(base, quote, lightning_pair_side(side, kind));
        Ok((info, chain_symbol, ln_symbol))
    }

    async fn pair_info(&self, pair: &str) -> Result<PairInfo> {
        self.rates
            .pair_info(pair)
            .await
            .context("fetch pair info")?
            .ok_or_else(|| Error::PairNotFound(pair.to_string()))
    }

    fn store_lock(&self) -> std::sync::MutexGuard<'_, SqliteStore> {
        self.store.lock().expect("store mutex poisoned")
    }
}

/// Normalizes `amount` into the unit of the pair limits, then enforces them.
pub fn verify_amount(info: &PairInfo, amount: u64, side: OrderSide, kind: SwapKind) -> Result<()> {
    let reverse = kind == SwapKind::ReverseSubmarine;
    let normalized = if (!reverse && side == OrderSide::Buy) || (reverse && side == OrderSide::Sell)
    {
        (amount as f64 * info.rate).floor()
    } else {
        amount as f64
    };

    if normalized.floor() as u64 > info.limits.maximal {
        return Err(Error::ExceedMaximalAmount {
            amount: normalized.floor() as u64,
            maximal: info.limits.maximal,
        });
    }
    if (normalized.ceil() as u64) < info.limits.minimal {
        return Err(Error::BeneathMinimalAmount {
            amount: normalized.ceil() as u64,
            minimal: info.limits.minimal,
        });
    }
    Ok(())
}

fn parse_public_key(hex_key: &str) -> Result<PublicKey> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| Error::Internal(anyhow::anyhow!("decode public key: {e}")))?;
    PublicKey::from_slice(&bytes)
        .map_err(|e| Error::Internal(anyhow::anyhow!("parse public key: {e}")))
}

fn parse_preimage_hash(hex_hash: &str) -> Result<[u8; 32]> {
    let bytes =
        hex::decode(hex_hash).map_err(|_| Error::InvalidPreimageHash(hex_hash.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| Error::InvalidPreimageHash(hex_hash.to_string()))
}
