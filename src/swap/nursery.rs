use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use bitcoin::hashes::{Hash as _, sha256};
use tokio::sync::mpsc;

use crate::chain::HtlcRef;
use crate::currency::{CurrencyRegistry, split_pair};
use crate::rates::RateProvider;
use crate::swap::events::EventBus;
use crate::swap::store::{LegDirection, SqliteStore};
use crate::swap::timeout::{TimeoutDeltaProvider, chain_pair_side, lightning_pair_side, pair_symbol};
use crate::swap::{ChainSwap, ReverseSwap, SubmarineSwap, SwapKind, SwapStatus};

/// One lock per swap kind. Every state-mutating callback and every
/// cooperative co-signing request serializes on the matching lock, turning
/// the event stream into a per-kind totally ordered log.
#[derive(Default)]
pub struct KindLocks {
    submarine: tokio::sync::Mutex<()>,
    reverse: tokio::sync::Mutex<()>,
    chain: tokio::sync::Mutex<()>,
}

impl KindLocks {
    pub async fn lock(&self, kind: SwapKind) -> tokio::sync::MutexGuard<'_, ()> {
        match kind {
            SwapKind::Submarine => self.submarine.lock().await,
            SwapKind::ReverseSubmarine => self.reverse.lock().await,
            SwapKind::ChainToChain => self.chain.lock().await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub address: String,
    pub value: u64,
}

/// Ledger and Lightning observations delivered by the external observers.
#[derive(Debug, Clone)]
pub enum NurseryEvent {
    Block {
        symbol: String,
        height: u32,
    },
    /// A transaction paying the listed outputs, delivered once on mempool
    /// acceptance and again on first confirmation.
    Transaction {
        symbol: String,
        transaction_id: String,
        outputs: Vec<TxOutput>,
        confirmed: bool,
    },
    /// A spend of a watched lockup output, with the spending witness.
    Spend {
        symbol: String,
        transaction_id: String,
        spent_transaction_id: String,
        spent_vout: u32,
        witness: Vec<Vec<u8>>,
    },
    InvoiceAccepted {
        preimage_hash: String,
    },
    InvoiceCancelled {
        preimage_hash: String,
    },
}

struct KindChannels {
    submarine: mpsc::UnboundedSender<NurseryEvent>,
    reverse: mpsc::UnboundedSender<NurseryEvent>,
    chain: mpsc::UnboundedSender<NurseryEvent>,
}

/// Long-running observer that advances every swap's state machine in
/// response to ledger and Lightning events.
pub struct SwapNursery {
    currencies: CurrencyRegistry,
    rates: Arc<dyn RateProvider>,
    timeouts: Arc<TimeoutDeltaProvider>,
    store: Arc<Mutex<SqliteStore>>,
    locks: Arc<KindLocks>,
    bus: EventBus,
    channels: Mutex<Option<KindChannels>>,
}

impl SwapNursery {
    pub fn new(
        currencies: CurrencyRegistry,
        rates: Arc<dyn RateProvider>,
        timeouts: Arc<TimeoutDeltaProvider>,
        store: Arc<Mutex<SqliteStore>>,
        locks: Arc<KindLocks>,
        bus: EventBus,
    ) -> Self {
        Self {
            currencies,
            rates,
            timeouts,
            store,
            locks,
            bus,
            channels: Mutex::new(None),
        }
    }

    pub fn locks(&self) -> Arc<KindLocks> {
        self.locks.clone()
    }

    /// Spawns one dispatcher task per swap kind. Each processes its channel
    /// serially under the kind lock.
    pub fn start(self: &Arc<Self>) {
        let mut channels = self.channels.lock().expect("channels lock poisoned");
        if channels.is_some() {
            return;
        }

        let (submarine_tx, submarine_rx) = mpsc::unbounded_channel();
        let (reverse_tx, reverse_rx) = mpsc::unbounded_channel();
        let (chain_tx, chain_rx) = mpsc::unbounded_channel();

        *channels = Some(KindChannels {
            submarine: submarine_tx,
            reverse: reverse_tx,
            chain: chain_tx,
        });
        drop(channels);

        for (kind, mut rx) in [
            (SwapKind::Submarine, submarine_rx),
            (SwapKind::ReverseSubmarine, reverse_rx),
            (SwapKind::ChainToChain, chain_rx),
        ] {
            let nursery = self.clone();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    let _guard = nursery.locks.lock(kind).await;
                    let result = match kind {
                        SwapKind::Submarine => nursery.handle_submarine(&event).await,
                        SwapKind::ReverseSubmarine => nursery.handle_reverse(&event).await,
                        SwapKind::ChainToChain => nursery.handle_chain(&event).await,
                    };
                    if let Err(err) = result {
                        tracing::warn!(%kind, error = %format!("{err:#}"), "nursery event failed");
                    }
                }
            });
        }
    }

    /// Fans an observation out to the kinds it concerns.
    pub fn enqueue(&self, event: NurseryEvent) {
        let channels = self.channels.lock().expect("channels lock poisoned");
        let Some(channels) = channels.as_ref() else {
            tracing::warn!("nursery not started; dropping event");
            return;
        };

        // Invoice events only concern reverse swaps; ledger events concern
        // every kind.
        let ledger = matches!(
            event,
            NurseryEvent::Block { .. }
                | NurseryEvent::Transaction { .. }
                | NurseryEvent::Spend { .. }
        );

        if ledger {
            let _ = channels.submarine.send(event.clone());
            let _ = channels.chain.send(event.clone());
        }
        let _ = channels.reverse.send(event);
    }

    // --- submarine swaps ---

    async fn handle_submarine(&self, event: &NurseryEvent) -> Result<()> {
        match event {
            NurseryEvent::Transaction {
                symbol,
                transaction_id,
                outputs,
                confirmed,
            } => {
                let candidates: Vec<SubmarineSwap> = {
                    let store = self.store_lock();
                    let mut found = Vec::new();
                    for output in outputs {
                        if let Some(swap) = store.submarine_by_lockup_address(&output.address)? {
                            found.push(swap);
                        }
                    }
                    found
                };

                for swap in candidates {
                    if submarine_chain_symbol(&swap)? != symbol.as_str() {
                        continue;
                    }
                    self.submarine_lockup(&swap, transaction_id, outputs, *confirmed)
                        .await?;
                }
                Ok(())
            }
            NurseryEvent::Spend {
                spent_transaction_id,
                ..
            } => {
                let swap = self
                    .store_lock()
                    .list_submarines_watching()?
                    .into_iter()
                    .find(|s| {
                        s.lockup_transaction_id.as_deref() == Some(spent_transaction_id.as_str())
                    });
                if let Some(swap) = swap
                    && swap.status == SwapStatus::SwapExpired
                {
                    // The user took the refund path.
                    self.advance_submarine(&swap.id, swap.status, SwapStatus::TransactionRefunded)?;
                }
                Ok(())
            }
            NurseryEvent::Block { symbol, height } => {
                let swaps = self.store_lock().list_submarines_watching()?;
                for swap in swaps {
                    if submarine_chain_symbol(&swap)? != symbol.as_str()
                        || *height < swap.timeout_block_height
                        || swap.status == SwapStatus::SwapExpired
                    {
                        continue;
                    }
                    if self.advance_submarine(&swap.id, swap.status, SwapStatus::SwapExpired)? {
                        tracing::info!(swap_id = %swap.id, "submarine swap expired");
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn submarine_lockup(
        &self,
        swap: &SubmarineSwap,
        transaction_id: &str,
        outputs: &[TxOutput],
        confirmed: bool,
    ) -> Result<()> {
        let value: u64 = outputs
            .iter()
            .filter(|o| o.address == swap.lockup_address)
            .map(|o| o.value)
            .sum();

        if value < swap.expected_amount {
            tracing::warn!(
                swap_id = %swap.id,
                value,
                expected = swap.expected_amount,
                "submarine lockup pays too little"
            );
            self.advance_submarine(&swap.id, swap.status, SwapStatus::TransactionLockupFailed)?;
            return Ok(());
        }

        let mut swap = swap.clone();
        if swap.lockup_transaction_id.is_none() {
            self.store_lock().set_submarine_lockup(&swap.id, transaction_id)?;
            swap.lockup_transaction_id = Some(transaction_id.to_string());
        }
        let mut status = swap.status;
        if self.advance_submarine(&swap.id, status, SwapStatus::TransactionMempool)? {
            status = SwapStatus::TransactionMempool;
        }

        let zero_conf_ok = swap.accept_zero_conf
            && self
                .rates
                .accept_zero_conf(submarine_chain_symbol(&swap)?, value)
                .await;

        if confirmed && self.advance_submarine(&swap.id, status, SwapStatus::TransactionConfirmed)? {
            status = SwapStatus::TransactionConfirmed;
        }

        if status == SwapStatus::TransactionConfirmed || zero_conf_ok {
            self.pay_submarine_invoice(&swap, status).await?;
        }
        Ok(())
    }

    /// Pays the swap invoice and claims the lockup with the preimage the
    /// payment reveals.
    async fn pay_submarine_invoice(&self, swap: &SubmarineSwap, status: SwapStatus) -> Result<()> {
        if !self.advance_submarine(&swap.id, status, SwapStatus::InvoicePending)? {
            return Ok(());
        }

        let (base, quote) = split_pair(&swap.pair)?;
        let chain_symbol = pair_symbol(
            base,
            quote,
            chain_pair_side(swap.order_side, SwapKind::Submarine),
        );
        let ln_symbol = pair_symbol(
            base,
            quote,
            lightning_pair_side(swap.order_side, SwapKind::Submarine),
        );
        let lightning = self
            .currencies
            .get(ln_symbol)?
            .lightning()
            .context("lightning client gone")?;

        let chain = self
            .currencies
            .get(chain_symbol)?
            .chain
            .clone()
            .context("chain client gone")?;
        let height = chain.block_height().await.context("get chain height")?;
        let blocks_left = swap.timeout_block_height.saturating_sub(height);
        let cltv_limit = self.timeouts.cltv_limit(chain_symbol, ln_symbol, blocks_left);

        match lightning.pay_invoice(&swap.invoice, Some(cltv_limit)).await {
            Ok(preimage) => {
                let preimage_hash = sha256::Hash::hash(&preimage).to_byte_array();
                anyhow::ensure!(
                    hex::encode(preimage_hash) == swap.preimage_hash,
                    "payment preimage does not match the swap hash"
                );

                self.store_lock()
                    .set_submarine_preimage(&swap.id, &hex::encode(preimage))?;
                self.advance_submarine(&swap.id, SwapStatus::InvoicePending, SwapStatus::InvoicePaid)?;

                let wallet = self
                    .currencies
                    .get(chain_symbol)?
                    .wallet
                    .clone()
                    .context("wallet gone")?;
                let htlc = HtlcRef {
                    symbol: chain_symbol.to_string(),
                    lockup_transaction_id: swap
                        .lockup_transaction_id
                        .clone()
                        .unwrap_or_default(),
                    lockup_address: swap.lockup_address.clone(),
                    redeem_script: swap.redeem_script.clone(),
                    key_index: swap.key_index,
                    timeout_block_height: swap.timeout_block_height,
                };
                let claim_txid = wallet
                    .claim_htlc(&htlc, preimage)
                    .await
                    .context("broadcast claim")?;
                tracing::info!(swap_id = %swap.id, %claim_txid, "claimed submarine lockup");

                self.advance_submarine(
                    &swap.id,
                    SwapStatus::InvoicePaid,
                    SwapStatus::TransactionClaimed,
                )?;
            }
            Err(err) => {
                tracing::warn!(swap_id = %swap.id, error = %format!("{err:#}"), "invoice payment failed");
                self.advance_submarine(
                    &swap.id,
                    SwapStatus::InvoicePending,
                    SwapStatus::InvoiceFailedToPay,
                )?;
            }
        }
        Ok(())
    }

    // --- reverse swaps ---

    async fn handle_reverse(&self, event: &NurseryEvent) -> Result<()> {
        match event {
            NurseryEvent::Transaction {
                transaction_id,
                confirmed,
                ..
            } => {
                if !confirmed {
                    return Ok(());
                }
                if let Some(swap) = self.store_lock().reverse_by_lockup_transaction(transaction_id)? {
                    self.advance_reverse(&swap.id, swap.status, SwapStatus::TransactionConfirmed)?;
                }
                Ok(())
            }
            NurseryEvent::InvoiceAccepted { preimage_hash } => {
                if let Some(swap) = self.store_lock().reverse_by_preimage_hash(preimage_hash)? {
                    self.advance_reverse(&swap.id, swap.status, SwapStatus::InvoicePending)?;
                }
                Ok(())
            }
            NurseryEvent::InvoiceCancelled { preimage_hash } => {
                if let Some(swap) = self.store_lock().reverse_by_preimage_hash(preimage_hash)? {
                    self.advance_reverse(&swap.id, swap.status, SwapStatus::InvoiceExpired)?;
                }
                Ok(())
            }
            NurseryEvent::Spend {
                spent_transaction_id,
                witness,
                ..
            } => {
                let swap = self
                    .store_lock()
                    .reverse_by_lockup_transaction(spent_transaction_id)?;
                let Some(swap) = swap else {
                    return Ok(());
                };
                self.reverse_claimed(&swap, witness).await
            }
            NurseryEvent::Block { symbol, height } => {
                let swaps = self.store_lock().list_reverse_watching()?;
                for swap in swaps {
                    if reverse_chain_symbol(&swap)? != symbol.as_str()
                        || *height < swap.timeout_block_height
                        || swap.status.is_terminal()
                    {
                        continue;
                    }
                    self.expire_reverse(&swap).await?;
                }
                Ok(())
            }
        }
    }

    /// The user claimed the lockup; the witness reveals the preimage, which
    /// settles the held invoice.
    async fn reverse_claimed(&self, swap: &ReverseSwap, witness: &[Vec<u8>]) -> Result<()> {
        let Some(preimage) = extract_preimage(witness, &swap.preimage_hash) else {
            tracing::warn!(swap_id = %swap.id, "spend of reverse lockup without preimage");
            return Ok(());
        };

        if swap.preimage.is_none() {
            self.store_lock()
                .set_reverse_preimage(&swap.id, &hex::encode(preimage))?;
        }

        let mut status = swap.status;
        if status != SwapStatus::InvoiceSettled {
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
                .context("lightning client gone")?;
            lightning
                .settle_hold_invoice(preimage)
                .await
                .context("settle hold invoice")?;
            if self.advance_reverse(&swap.id, status, SwapStatus::InvoiceSettled)? {
                status = SwapStatus::InvoiceSettled;
            }
        }

        self.advance_reverse(&swap.id, status, SwapStatus::TransactionClaimed)?;
        Ok(())
    }

    /// Timeout hit without a preimage: cancel the held invoice and refund the
    /// service's lockup.
    async fn expire_reverse(&self, swap: &ReverseSwap) -> Result<()> {
        // Already-expired swaps fall through so a failed refund broadcast is
        // retried on the next block.
        if swap.status != SwapStatus::SwapExpired
            && !self.advance_reverse(&swap.id, swap.status, SwapStatus::SwapExpired)?
        {
            return Ok(());
        }

        let (base, quote) = split_pair(&swap.pair)?;
        let ln_symbol = pair_symbol(
            base,
            quote,
            lightning_pair_side(swap.order_side, SwapKind::ReverseSubmarine),
        );
        let chain_symbol = reverse_chain_symbol(swap)?.to_string();

        let preimage_hash: [u8; 32] = hex::decode(&swap.preimage_hash)
            .ok()
            .and_then(|b| b.try_into().ok())
            .context("stored preimage hash is invalid")?;
        if let Some(lightning) = self.currencies.get(ln_symbol)?.lightning()
            && let Err(err) = lightning.cancel_hold_invoice(preimage_hash).await
        {
            tracing::warn!(swap_id = %swap.id, error = %format!("{err:#}"), "cancel hold invoice failed");
        }

        let wallet = self
            .currencies
            .get(&chain_symbol)?
            .wallet
            .clone()
            .context("wallet gone")?;
        let htlc = HtlcRef {
            symbol: chain_symbol,
            lockup_transaction_id: swap.transaction_id.clone(),
            lockup_address: swap.lockup_address.clone(),
            redeem_script: swap.redeem_script.clone(),
            key_index: swap.key_index,
            timeout_block_height: swap.timeout_block_height,
        };
        let refund_txid = wallet.refund_htlc(&htlc).await.context("broadcast refund")?;
        tracing::info!(swap_id = %swap.id, %refund_txid, "refunded reverse swap lockup");

        self.advance_reverse(&swap.id, SwapStatus::SwapExpired, SwapStatus::TransactionRefunded)?;
        Ok(())
    }

    // --- chain swaps ---

    async fn handle_chain(&self, event: &NurseryEvent) -> Result<()> {
        match event {
            NurseryEvent::Transaction {
                symbol,
                transaction_id,
                outputs,
                confirmed,
            } => {
                for output in outputs {
                    let found = self
                        .store_lock()
                        .chain_by_leg_lockup_address(&output.address)?;
                    let Some((swap, direction)) = found else {
                        continue;
                    };
                    if direction != LegDirection::Receiving || &swap.receiving.symbol != symbol {
                        continue;
                    }
                    self.chain_user_lockup(&swap, transaction_id, outputs, *confirmed)
                        .await?;
                }
                Ok(())
            }
            NurseryEvent::Spend {
                spent_transaction_id,
                witness,
                ..
            } => {
                let claimed = self
                    .store_lock()
                    .chain_by_sending_lockup_transaction(spent_transaction_id)?;
                if let Some(swap) = claimed {
                    return self.chain_claimed(&swap, witness).await;
                }

                // A spend of the user's own leg after expiry is their refund.
                let refunded = self.store_lock().list_chain_watching()?.into_iter().find(|s| {
                    s.receiving.lockup_transaction_id.as_deref()
                        == Some(spent_transaction_id.as_str())
                });
                if let Some(swap) = refunded
                    && swap.status == SwapStatus::SwapExpired
                {
                    self.advance_chain(&swap.id, swap.status, SwapStatus::TransactionRefunded)?;
                }
                Ok(())
            }
            NurseryEvent::Block { symbol, height } => {
                let swaps = self.store_lock().list_chain_watching()?;
                for swap in swaps {
                    if &swap.sending.symbol != symbol
                        || *height < swap.sending.timeout_block_height
                        || swap.status.is_terminal()
                    {
                        continue;
                    }
                    self.expire_chain(&swap).await?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// The user funded their leg; once acceptable, the service funds its own.
    async fn chain_user_lockup(
        &self,
        swap: &ChainSwap,
        transaction_id: &str,
        outputs: &[TxOutput],
        confirmed: bool,
    ) -> Result<()> {
        let value: u64 = outputs
            .iter()
            .filter(|o| o.address == swap.receiving.lockup_address)
            .map(|o| o.value)
            .sum();

        if value < swap.receiving.expected_amount {
            tracing::warn!(
                swap_id = %swap.id,
                value,
                expected = swap.receiving.expected_amount,
                "chain swap lockup pays too little"
            );
            self.advance_chain(&swap.id, swap.status, SwapStatus::TransactionLockupFailed)?;
            return Ok(());
        }

        if swap.receiving.lockup_transaction_id.is_none() {
            self.store_lock()
                .set_chain_leg_lockup(&swap.id, LegDirection::Receiving, transaction_id)?;
        }
        let mut status = swap.status;
        if self.advance_chain(&swap.id, status, SwapStatus::TransactionMempool)? {
            status = SwapStatus::TransactionMempool;
        }

        let zero_conf_ok = swap.accept_zero_conf
            && self
                .rates
                .accept_zero_conf(&swap.receiving.symbol, value)
                .await;

        if confirmed && self.advance_chain(&swap.id, status, SwapStatus::TransactionConfirmed)? {
            status = SwapStatus::TransactionConfirmed;
        }

        let acceptable = status == SwapStatus::TransactionConfirmed || zero_conf_ok;
        if acceptable && swap.sending.lockup_transaction_id.is_none() {
            let wallet = self
                .currencies
                .get(&swap.sending.symbol)?
                .wallet
                .clone()
                .context("sending wallet gone")?;
            let funding = wallet
                .send_to_address(&swap.sending.lockup_address, swap.sending.expected_amount)
                .await
                .context("fund sending leg")?;
            self.store_lock().set_chain_leg_lockup(
                &swap.id,
                LegDirection::Sending,
                &funding.transaction_id,
            )?;
            tracing::info!(
                swap_id = %swap.id,
                transaction_id = %funding.transaction_id,
                "funded chain swap sending leg"
            );
        }
        Ok(())
    }

    /// The user claimed the service's leg, revealing the preimage; claim the
    /// user's leg with it.
    async fn chain_claimed(&self, swap: &ChainSwap, witness: &[Vec<u8>]) -> Result<()> {
        let Some(preimage) = extract_preimage(witness, &swap.preimage_hash) else {
            tracing::warn!(swap_id = %swap.id, "spend of sending leg without preimage");
            return Ok(());
        };

        if swap.preimage.is_none() {
            self.store_lock()
                .set_chain_preimage(&swap.id, &hex::encode(preimage))?;
        }

        let wallet = self
            .currencies
            .get(&swap.receiving.symbol)?
            .wallet
            .clone()
            .context("receiving wallet gone")?;
        let htlc = HtlcRef {
            symbol: swap.receiving.symbol.clone(),
            lockup_transaction_id: swap
                .receiving
                .lockup_transaction_id
                .clone()
                .unwrap_or_default(),
            lockup_address: swap.receiving.lockup_address.clone(),
            redeem_script: swap.receiving.redeem_script.clone(),
            key_index: swap.receiving.key_index,
            timeout_block_height: swap.receiving.timeout_block_height,
        };
        let claim_txid = wallet
            .claim_htlc(&htlc, preimage)
            .await
            .context("claim receiving leg")?;
        tracing::info!(swap_id = %swap.id, %claim_txid, "claimed chain swap receiving leg");

        self.advance_chain(&swap.id, swap.status, SwapStatus::TransactionClaimed)?;
        Ok(())
    }

    async fn expire_chain(&self, swap: &ChainSwap) -> Result<()> {
        if swap.status != SwapStatus::SwapExpired
            && !self.advance_chain(&swap.id, swap.status, SwapStatus::SwapExpired)?
        {
            return Ok(());
        }

        let Some(lockup_transaction_id) = swap.sending.lockup_transaction_id.clone() else {
            // Never funded; nothing to refund on our side.
            return Ok(());
        };

        let wallet = self
            .currencies
            .get(&swap.sending.symbol)?
            .wallet
            .clone()
            .context("sending wallet gone")?;
        let htlc = HtlcRef {
            symbol: swap.sending.symbol.clone(),
            lockup_transaction_id,
            lockup_address: swap.sending.lockup_address.clone(),
            redeem_script: swap.sending.redeem_script.clone(),
            key_index: swap.sending.key_index,
            timeout_block_height: swap.sending.timeout_block_height,
        };
        let refund_txid = wallet.refund_htlc(&htlc).await.context("broadcast refund")?;
        tracing::info!(swap_id = %swap.id, %refund_txid, "refunded chain swap sending leg");

        self.advance_chain(&swap.id, SwapStatus::SwapExpired, SwapStatus::TransactionRefunded)?;
        Ok(())
    }

    // --- transition plumbing ---

    fn advance_submarine(&self, id: &str, current: SwapStatus, target: SwapStatus) -> Result<bool> {
        self.advance(SwapKind::Submarine, id, current, target)
    }

    fn advance_reverse(&self, id: &str, current: SwapStatus, target: SwapStatus) -> Result<bool> {
        self.advance(SwapKind::ReverseSubmarine, id, current, target)
    }

    fn advance_chain(&self, id: &str, current: SwapStatus, target: SwapStatus) -> Result<bool> {
        self.advance(SwapKind::ChainToChain, id, current, target)
    }

    /// Applies a transition if it moves forward in the DAG. Re-delivered
    /// events are no-ops; unreachable targets are logged and dropped.
    fn advance(
        &self,
        kind: SwapKind,
        id: &str,
        current: SwapStatus,
        target: SwapStatus,
    ) -> Result<bool> {
        if current == target {
            return Ok(false);
        }
        if !current.reachable(target) {
            tracing::warn!(swap_id = %id, %current, %target, "dropping unreachable transition");
            return Ok(false);
        }

        {
            let mut store = self.store_lock();
            match kind {
                SwapKind::Submarine => store.update_submarine_status(id, target)?,
                SwapKind::ReverseSubmarine => store.update_reverse_status(id, target)?,
                SwapKind::ChainToChain => store.update_chain_status(id, target)?,
            }
        }
        self.bus.publish(id, kind, target);
        Ok(true)
    }

    fn store_lock(&self) -> std::sync::MutexGuard<'_, SqliteStore> {
        self.store.lock().expect("store mutex poisoned")
    }
}

fn submarine_chain_symbol(swap: &SubmarineSwap) -> Result<&str> {
    let (base, quote) = split_pair(&swap.pair)?;
    Ok(pair_symbol(
        base,
        quote,
        chain_pair_side(swap.order_side, SwapKind::Submarine),
    ))
}

fn reverse_chain_symbol(swap: &ReverseSwap) -> Result<&str> {
    let (base, quote) = split_pair(&swap.pair)?;
    Ok(pair_symbol(
        base,
        quote,
        chain_pair_side(swap.order_side, SwapKind::ReverseSubmarine),
    ))
}

/// Finds the 32-byte witness item hashing to the swap's preimage hash.
fn extract_preimage(witness: &[Vec<u8>], preimage_hash_hex: &str) -> Option<[u8; 32]> {
    witness
        .iter()
        .filter_map(|item| <[u8; 32]>::try_from(item.as_slice()).ok())
        .find(|candidate| {
            hex::encode(sha256::Hash::hash(candidate).to_byte_array()) == preimage_hash_hex
        })
}
