use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bitcoin::Network;
use tokio::sync::broadcast;

use crate::config::{Config, TimeoutDeltaMinutes};
use crate::currency::CurrencyRegistry;
use crate::errors::Result;
use crate::rates::{FeeEstimator, RateProvider};
use crate::swap::builder::{
    CreatedChainSwap, CreatedReverseSwap, CreatedSubmarineSwap, SwapBuilder,
};
use crate::swap::events::{EventBus, SwapUpdate};
use crate::swap::musig::{CooperativeSignature, MusigSigner};
use crate::swap::nursery::{KindLocks, NurseryEvent, SwapNursery};
use crate::swap::store::SqliteStore;
use crate::swap::timeout::{PairDeltas, TimeoutDeltaProvider};
use crate::swap::{AnySwap, OrderSide, SwapVersion};

/// Process-wide toggles, localized instead of floating as globals.
#[derive(Debug)]
pub struct ServiceState {
    allow_reverse_swaps: AtomicBool,
}

impl ServiceState {
    pub fn new(allow_reverse_swaps: bool) -> Self {
        Self {
            allow_reverse_swaps: AtomicBool::new(allow_reverse_swaps),
        }
    }

    pub fn allow_reverse_swaps(&self) -> bool {
        self.allow_reverse_swaps.load(Ordering::Relaxed)
    }

    pub fn set_allow_reverse_swaps(&self, allow: bool) {
        self.allow_reverse_swaps.store(allow, Ordering::Relaxed);
    }
}

/// The one API the transport layer talks to: swap creation, the status feed,
/// timeout administration, and cooperative co-signing.
pub struct SwapService {
    builder: SwapBuilder,
    nursery: Arc<SwapNursery>,
    signer: MusigSigner,
    timeouts: Arc<TimeoutDeltaProvider>,
    store: Arc<Mutex<SqliteStore>>,
    bus: EventBus,
    state: Arc<ServiceState>,
}

impl SwapService {
    pub fn new(
        network: Network,
        currencies: CurrencyRegistry,
        rates: Arc<dyn RateProvider>,
        fees: Arc<dyn FeeEstimator>,
        config: Config,
        config_path: PathBuf,
        store: SqliteStore,
        allow_reverse_swaps: bool,
    ) -> Result<Self> {
        let timeouts = Arc::new(TimeoutDeltaProvider::new(config, config_path)?);
        let store = Arc::new(Mutex::new(store));
        let state = Arc::new(ServiceState::new(allow_reverse_swaps));
        let bus = EventBus::default();
        let locks = Arc::new(KindLocks::default());

        let builder = SwapBuilder::new(
            network,
            currencies.clone(),
            rates.clone(),
            fees,
            timeouts.clone(),
            store.clone(),
            state.clone(),
        );
        let nursery = Arc::new(SwapNursery::new(
            currencies.clone(),
            rates,
            timeouts.clone(),
            store.clone(),
            locks.clone(),
            bus.clone(),
        ));
        let signer = MusigSigner::new(network, currencies, store.clone(), locks, bus.clone());

        Ok(Self {
            builder,
            nursery,
            signer,
            timeouts,
            store,
            bus,
            state,
        })
    }

    /// Starts the nursery dispatchers. Must be called before observers begin
    /// enqueueing events.
    pub fn start(&self) {
        self.nursery.start();
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    pub async fn create_swap(
        &self,
        pair: &str,
        side: OrderSide,
        version: SwapVersion,
        invoice: &str,
        refund_public_key: &str,
    ) -> Result<CreatedSubmarineSwap> {
        self.builder
            .create_swap(pair, side, version, invoice, refund_public_key)
            .await
    }

    pub async fn create_reverse_swap(
        &self,
        pair: &str,
        side: OrderSide,
        version: SwapVersion,
        invoice_amount: u64,
        preimage_hash: &str,
        claim_public_key: &str,
    ) -> Result<CreatedReverseSwap> {
        self.builder
            .create_reverse_swap(
                pair,
                side,
                version,
                invoice_amount,
                preimage_hash,
                claim_public_key,
            )
            .await
    }

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
        self.builder
            .create_chain_swap(
                pair,
                side,
                version,
                amount,
                preimage_hash,
                claim_public_key,
                refund_public_key,
            )
            .await
    }

    pub async fn sign_refund(
        &self,
        swap_id: &str,
        their_nonce: &[u8],
        raw_transaction: &[u8],
        input_index: usize,
    ) -> Result<CooperativeSignature> {
        self.signer
            .sign_refund(swap_id, their_nonce, raw_transaction, input_index)
            .await
    }

    pub async fn sign_reverse_swap_claim(
        &self,
        swap_id: &str,
        preimage: [u8; 32],
        their_nonce: &[u8],
        raw_transaction: &[u8],
        input_index: usize,
    ) -> Result<CooperativeSignature> {
        self.signer
            .sign_reverse_swap_claim(swap_id, preimage, their_nonce, raw_transaction, input_index)
            .await
    }

    pub fn get_swap(&self, id: &str) -> Result<Option<AnySwap>> {
        self.store
            .lock()
            .expect("store mutex poisoned")
            .get_any(id)
            .map_err(Into::into)
    }

    pub fn get_timeouts(&self, pair: &str) -> Result<PairDeltas> {
        self.timeouts.get_timeouts(pair)
    }

    pub fn set_timeout(&self, pair: &str, minutes: TimeoutDeltaMinutes) -> Result<()> {
        self.timeouts.set_timeout(pair, minutes)
    }

    /// Status feed; every transition of every swap is multicast here.
    pub fn subscribe(&self) -> broadcast::Receiver<SwapUpdate> {
        self.bus.subscribe()
    }

    /// Entry point for ledger and Lightning observers.
    pub fn enqueue(&self, event: NurseryEvent) {
        self.nursery.enqueue(event);
    }
}
