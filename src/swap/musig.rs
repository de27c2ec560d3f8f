use std::str::FromStr as _;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use bitcoin::consensus::encode::deserialize as consensus_deserialize;
use bitcoin::hashes::Hash as _;
use bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};
use bitcoin::taproot::TapTweakHash;
use bitcoin::{Address, Network, Transaction, TxOut};
use secp256k1::musig::{AggregatedNonce, KeyAggCache, PublicNonce, SessionSecretRand};

use crate::chain::scripts::{SwapTree, sha256_preimage};
use crate::currency::{Currency, CurrencyRegistry, split_pair};
use crate::errors::{Error, Result};
use crate::lightning::PaymentState;
use crate::swap::events::EventBus;
use crate::swap::nursery::KindLocks;
use crate::swap::store::SqliteStore;
use crate::swap::timeout::{chain_pair_side, lightning_pair_side, pair_symbol};
use crate::swap::{AnySwap, SwapKind, SwapStatus, SwapVersion};

/// A MuSig2 public nonce and partial signature returned to the peer.
#[derive(Debug, Clone)]
pub struct CooperativeSignature {
    pub pub_nonce: [u8; 66],
    pub partial_signature: [u8; 32],
}

/// Co-signs key-path spends of Taproot swaps after checking that the swap can
/// no longer be settled against the service.
pub struct MusigSigner {
    network: Network,
    currencies: CurrencyRegistry,
    store: Arc<Mutex<SqliteStore>>,
    locks: Arc<KindLocks>,
    bus: EventBus,
}

impl MusigSigner {
    pub fn new(
        network: Network,
        currencies: CurrencyRegistry,
        store: Arc<Mutex<SqliteStore>>,
        locks: Arc<KindLocks>,
        bus: EventBus,
    ) -> Self {
        Self {
            network,
            currencies,
            store,
            locks,
            bus,
        }
    }

    /// Partial signature for a cooperative refund of a submarine or chain
    /// swap the user could otherwise only recover via the script path.
    pub async fn sign_refund(
        &self,
        swap_id: &str,
        their_nonce: &[u8],
        raw_transaction: &[u8],
        input_index: usize,
    ) -> Result<CooperativeSignature> {
        let swap = self
            .store_lock()
            .get_any(swap_id)?
            .ok_or_else(|| Error::SwapNotFound(swap_id.to_string()))?;

        let (details, lightning_currency) = match &swap {
            AnySwap::Submarine(submarine) => {
                if submarine.version != SwapVersion::Taproot {
                    return Err(Error::NotEligibleForCooperativeRefund);
                }
                let (base, quote) = split_pair(&submarine.pair)?;
                let chain_symbol = pair_symbol(
                    base,
                    quote,
                    chain_pair_side(submarine.order_side, SwapKind::Submarine),
                );
                let ln_symbol = pair_symbol(
                    base,
                    quote,
                    lightning_pair_side(submarine.order_side, SwapKind::Submarine),
                );
                let lockup_transaction_id = submarine
                    .lockup_transaction_id
                    .clone()
                    .ok_or(Error::NotEligibleForCooperativeRefund)?;

                (
                    RefundDetails {
                        chain_symbol: chain_symbol.to_string(),
                        lockup_address: submarine.lockup_address.clone(),
                        lockup_transaction_id,
                        redeem_script: submarine.redeem_script.clone(),
                        key_index: submarine.key_index,
                        counterparty_key: submarine.refund_public_key.clone(),
                        preimage_hash: submarine.preimage_hash.clone(),
                        invoice: Some(submarine.invoice.clone()),
                    },
                    Some(self.currencies.get(ln_symbol)?.clone()),
                )
            }
            AnySwap::Chain(chain) => {
                if chain.version != SwapVersion::Taproot {
                    return Err(Error::NotEligibleForCooperativeRefund);
                }
                let lockup_transaction_id = chain
                    .receiving
                    .lockup_transaction_id
                    .clone()
                    .ok_or(Error::NotEligibleForCooperativeRefund)?;

                (
                    RefundDetails {
                        chain_symbol: chain.receiving.symbol.clone(),
                        lockup_address: chain.receiving.lockup_address.clone(),
                        lockup_transaction_id,
                        redeem_script: chain.receiving.redeem_script.clone(),
                        key_index: chain.receiving.key_index,
                        counterparty_key: chain.refund_public_key.clone(),
                        preimage_hash: chain.preimage_hash.clone(),
                        invoice: None,
                    },
                    None,
                )
            }
            AnySwap::Reverse(_) => return Err(Error::NotEligibleForCooperativeRefund),
        };

        let currency = self.currencies.get(&details.chain_symbol)?.clone();
        if !currency.is_utxo() {
            return Err(Error::CurrencyNotUtxoBased(details.chain_symbol.clone()));
        }

        let _guard = self.locks.lock(swap.kind()).await;

        if !swap.status().is_failed() {
            return Err(Error::NotEligibleForCooperativeRefund);
        }
        if let Some(ln) = &lightning_currency
            && has_non_failed_lightning_payment(ln, &details).await
        {
            return Err(Error::NotEligibleForCooperativeRefund);
        }

        let signature = self
            .partial_sign(
                &currency,
                &details.redeem_script,
                details.key_index,
                &details.counterparty_key,
                &details.lockup_address,
                &details.lockup_transaction_id,
                their_nonce,
                raw_transaction,
                input_index,
            )
            .await?;

        tracing::info!(swap_id = %swap_id, "co-signed cooperative refund");
        Ok(signature)
    }

    /// Partial signature for a cooperative key-path claim of a reverse swap.
    /// Settles the held invoice first so the Lightning side is irrevocable
    /// before the on-chain side can move.
    pub async fn sign_reverse_swap_claim(
        &self,
        swap_id: &str,
        preimage: [u8; 32],
        their_nonce: &[u8],
        raw_transaction: &[u8],
        input_index: usize,
    ) -> Result<CooperativeSignature> {
        let swap = self
            .store_lock()
            .get_reverse(swap_id)?
            .ok_or_else(|| Error::SwapNotFound(swap_id.to_string()))?;

        if swap.version != SwapVersion::Taproot
            || !matches!(
                swap.status,
                SwapStatus::TransactionMempool
                    | SwapStatus::TransactionConfirmed
                    | SwapStatus::InvoiceSettled
            )
        {
            return Err(Error::NotEligibleForCooperativeClaim);
        }

        let preimage_hash =
            hex::decode(&swap.preimage_hash).context("decode stored preimage hash")?;
        if sha256_preimage(&preimage).as_slice() != preimage_hash.as_slice() {
            return Err(Error::IncorrectPreimage);
        }

        // Persisted before anything else so recovery can claim the lockup
        // even if the peer never finishes the cooperative spend.
        self.store_lock()
            .set_reverse_preimage(swap_id, &hex::encode(preimage))?;

        let _guard = self.locks.lock(SwapKind::ReverseSubmarine).await;

        if swap.status != SwapStatus::InvoiceSettled {
            let (base, quote) = split_pair(&swap.pair)?;
            let ln_symbol = pair_symbol(
                base,
                quote,
                lightning_pair_side(swap.order_side, SwapKind::ReverseSubmarine),
            );
            let lightning = self
                .currencies
                .get(ln_symbol)?
                .lightning()
                .ok_or_else(|| Error::NoLndClient(ln_symbol.to_string()))?;
            lightning
                .settle_hold_invoice(preimage)
                .await
                .context("settle hold invoice")?;

            self.store_lock()
                .update_reverse_status(swap_id, SwapStatus::InvoiceSettled)?;
            self.bus.publish(
                swap_id,
                SwapKind::ReverseSubmarine,
                SwapStatus::InvoiceSettled,
            );
        }

        let (base, quote) = split_pair(&swap.pair)?;
        let chain_symbol = pair_symbol(
            base,
            quote,
            chain_pair_side(swap.order_side, SwapKind::ReverseSubmarine),
        );
        let currency = self.currencies.get(chain_symbol)?.clone();
        if !currency.is_utxo() {
            return Err(Error::CurrencyNotUtxoBased(chain_symbol.to_string()));
        }

        let signature = self
            .partial_sign(
                &currency,
                &swap.redeem_script,
                swap.key_index,
                &swap.claim_public_key,
                &swap.lockup_address,
                &swap.transaction_id,
                their_nonce,
                raw_transaction,
                input_index,
            )
            .await?;

        tracing::info!(swap_id = %swap_id, "co-signed cooperative claim");
        Ok(signature)
    }

    #[allow(clippy::too_many_arguments)]
    async fn partial_sign(
        &self,
        currency: &Currency,
        redeem_script: &str,
        key_index: u32,
        counterparty_key_hex: &str,
        lockup_address: &str,
        lockup_transaction_id: &str,
        their_nonce: &[u8],
        raw_transaction: &[u8],
        input_index: usize,
    ) -> Result<CooperativeSignature> {
        let tree = SwapTree::from_hex(redeem_script).context("deserialize swap tree")?;

        let wallet = currency
            .wallet
            .as_ref()
            .ok_or_else(|| Error::CurrencyNotFound(currency.symbol.clone()))?;
        let service_secret = wallet.derive_secret_key(key_index)?;
        let secp = bitcoin::secp256k1::Secp256k1::new();
        let service_key = service_secret.public_key(&secp);
        let counterparty_key = {
            let bytes = hex::decode(counterparty_key_hex).context("decode counterparty key")?;
            bitcoin::secp256k1::PublicKey::from_slice(&bytes).context("parse counterparty key")?
        };

        let lockup_script = Address::from_str(lockup_address)
            .context("parse lockup address")?
            .require_network(self.network)
            .context("lockup address network")?
            .script_pubkey();

        let chain = currency
            .chain
            .as_ref()
            .ok_or_else(|| Error::CurrencyNotUtxoBased(currency.symbol.clone()))?;
        let lockup_raw = chain
            .raw_transaction(lockup_transaction_id)
            .await
            .context("fetch lockup transaction")?;
        let lockup_tx: Transaction =
            consensus_deserialize(&lockup_raw).context("decode lockup transaction")?;
        let lockup_txid = lockup_tx.compute_txid();
        let (lockup_vout, lockup_txout) = lockup_tx
            .output
            .iter()
            .enumerate()
            .find(|(_, out)| out.script_pubkey == lockup_script)
            .map(|(vout, out)| (vout as u32, out.clone()))
            .context("lockup transaction pays no output to the swap address")?;

        let tx: Transaction =
            consensus_deserialize(raw_transaction).context("decode transaction to sign")?;
        verify_spend_shape(&tx, input_index, lockup_txid, lockup_vout)?;

        let sighash = key_spend_sighash(&tx, input_index, &lockup_txout)?;

        let internal_key = aggregate_public_keys(&service_key, &counterparty_key)?;
        let merkle_root = tree
            .spend_info(&secp, internal_key)?
            .merkle_root()
            .context("swap tree has no merkle root")?;
        let tweak = TapTweakHash::from_key_and_tweak(internal_key, Some(merkle_root));

        partial_sign_tweaked(
            &service_secret,
            &service_key,
            &counterparty_key,
            their_nonce,
            tweak.to_byte_array(),
            sighash,
        )
    }

    fn store_lock(&self) -> std::sync::MutexGuard<'_, SqliteStore> {
        self.store.lock().expect("store mutex poisoned")
    }
}

struct RefundDetails {
    chain_symbol: String,
    lockup_address: String,
    lockup_transaction_id: String,
    redeem_script: String,
    key_index: u32,
    counterparty_key: String,
    preimage_hash: String,
    invoice: Option<String>,
}

/// Whether the Lightning side still has a payment that could settle. CLN RPC
/// errors count as "payment exists"; refusing to co-sign is recoverable,
/// double spending the preimage is not.
async fn has_non_failed_lightning_payment(currency: &Currency, details: &RefundDetails) -> bool {
    if let Some(lnd) = &currency.lnd {
        let hash: std::result::Result<[u8; 32], _> = hex::decode(&details.preimage_hash)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or(());
        if let Ok(hash) = hash {
            match lnd.track_payment(hash).await {
                Ok(state) => {
                    if state != PaymentState::Failed {
                        return true;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "trackPayment failed");
                }
            }
        }
    }

    if let (Some(cln), Some(invoice)) = (&currency.cln, &details.invoice) {
        match cln.check_pay_status(invoice).await {
            Ok(has_record) => return has_record,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "checkPayStatus failed");
                return true;
            }
        }
    }

    false
}

/// The transaction must spend exactly the swap's lockup output and pay to a
/// single output; anything else is not a refund or claim we should endorse.
fn verify_spend_shape(
    tx: &Transaction,
    input_index: usize,
    lockup_txid: bitcoin::Txid,
    lockup_vout: u32,
) -> anyhow::Result<()> {
    anyhow::ensure!(tx.input.len() == 1, "expected a single input");
    anyhow::ensure!(input_index == 0, "input index out of range");
    anyhow::ensure!(tx.output.len() == 1, "expected a single output");

    let outpoint = tx.input[0].previous_output;
    anyhow::ensure!(
        outpoint.txid == lockup_txid && outpoint.vout == lockup_vout,
        "transaction does not spend the swap lockup output"
    );
    Ok(())
}

fn key_spend_sighash(tx: &Transaction, input_index: usize, prevout: &TxOut) -> Result<[u8; 32]> {
    let mut cache = SighashCache::new(tx);
    let sighash = cache
        .taproot_key_spend_signature_hash(
            input_index,
            &Prevouts::All(&[prevout.clone()]),
            TapSighashType::Default,
        )
        .context("compute taproot sighash")?;
    Ok(sighash.to_byte_array())
}

/// MuSig2 aggregate of `[service, counterparty]`, as the taproot internal
/// key. Both sides must aggregate in this order.
pub fn aggregate_public_keys(
    service: &bitcoin::secp256k1::PublicKey,
    counterparty: &bitcoin::secp256k1::PublicKey,
) -> Result<bitcoin::XOnlyPublicKey> {
    let secp = secp256k1::Secp256k1::new();
    let keys = [
        musig_public_key(service)?,
        musig_public_key(counterparty)?,
    ];
    let cache = KeyAggCache::new(&secp, &[&keys[0], &keys[1]]);
    bitcoin::XOnlyPublicKey::from_slice(&cache.agg_pk().serialize())
        .context("convert aggregated key")
        .map_err(Error::Internal)
}

/// Produces our half of a MuSig2 key-path signature over `sighash`, with the
/// aggregate key tweaked for taproot commitment `tweak`.
fn partial_sign_tweaked(
    service_secret: &bitcoin::secp256k1::SecretKey,
    service_key: &bitcoin::secp256k1::PublicKey,
    counterparty_key: &bitcoin::secp256k1::PublicKey,
    their_nonce: &[u8],
    tweak: [u8; 32],
    sighash: [u8; 32],
) -> Result<CooperativeSignature> {
    let secp = secp256k1::Secp256k1::new();

    let our_key = musig_public_key(service_key)?;
    let their_key = musig_public_key(counterparty_key)?;
    let mut cache = KeyAggCache::new(&secp, &[&our_key, &their_key]);

    let tweak_scalar = secp256k1::Scalar::from_be_bytes(tweak)
        .map_err(|_| anyhow::anyhow!("taproot tweak out of range"))?;
    cache
        .pubkey_xonly_tweak_add(&secp, &tweak_scalar)
        .context("apply taproot tweak")?;

    let their_nonce: [u8; 66] = their_nonce
        .try_into()
        .map_err(|_| anyhow::anyhow!("public nonce must be 66 bytes"))?;
    let their_nonce =
        PublicNonce::from_byte_array(&their_nonce).context("parse counterparty nonce")?;

    let msg = secp256k1::Message::from_digest(sighash);
    let session_secrand = SessionSecretRand::from_rng(&mut rand::thread_rng());
    let (our_secnonce, our_pubnonce) = cache.nonce_gen(
        &secp,
        session_secrand,
        our_key,
        msg,
        None,
    );

    let agg_nonce = AggregatedNonce::new(&secp, &[&their_nonce, &our_pubnonce]);
    let session = secp256k1::musig::Session::new(&secp, &cache, agg_nonce, msg);

    let secret = secp256k1::SecretKey::from_slice(&service_secret.secret_bytes())
        .map_err(|_| anyhow::anyhow!("convert service secret key"))?;
    let keypair = secp256k1::Keypair::from_secret_key(&secp, &secret);
    let partial = session.partial_sign(&secp, keypair, our_secnonce, &cache);

    Ok(CooperativeSignature {
        pub_nonce: our_pubnonce.serialize(),
        partial_signature: partial.serialize(),
    })
}

fn musig_public_key(key: &bitcoin::secp256k1::PublicKey) -> Result<secp256k1::PublicKey> {
    secp256k1::PublicKey::from_slice(&key.serialize())
        .context("convert public key")
        .map_err(Error::Internal)
}
