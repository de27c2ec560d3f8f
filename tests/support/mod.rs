#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use bitcoin::Network;
use bitcoin::hashes::{Hash as _, sha256};
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use lightning_invoice::{Currency as InvoiceCurrency, InvoiceBuilder, PaymentSecret};

use swapd::chain::{ChainClient, FundingResult, HtlcRef, Wallet};
use swapd::config::{Config, PairConfig, TimeoutDeltaConfig, TimeoutDeltaMinutes};
use swapd::currency::{Currency, CurrencyRegistry};
use swapd::lightning::{ClnClient, LightningClient, LndClient, PaymentState, Route};
use swapd::rates::{FeeEstimate, FeeEstimator, PairInfo, PairLimits, RateProvider};
use swapd::swap::service::SwapService;
use swapd::swap::store::SqliteStore;

pub const PAIR: &str = "BTC/BTC";

pub struct MockChain {
    pub height: Mutex<u32>,
    pub transactions: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockChain {
    pub fn new(height: u32) -> Self {
        Self {
            height: Mutex::new(height),
            transactions: Mutex::new(HashMap::new()),
        }
    }

    pub fn put_transaction(&self, txid: &str, raw: Vec<u8>) {
        self.transactions
            .lock()
            .unwrap()
            .insert(txid.to_string(), raw);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_height(&self) -> Result<u32> {
        Ok(*self.height.lock().unwrap())
    }

    async fn raw_transaction(&self, txid: &str) -> Result<Vec<u8>> {
        self.transactions
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .with_context(|| format!("unknown transaction {txid}"))
    }
}

pub struct MockWallet {
    seed: u8,
    next_index: AtomicU32,
    pub balance: Mutex<u64>,
    pub funded: Mutex<Vec<(String, u64)>>,
    pub claims: Mutex<Vec<(HtlcRef, [u8; 32])>>,
    pub refunds: Mutex<Vec<HtlcRef>>,
}

impl MockWallet {
    pub fn new(seed: u8, balance: u64) -> Self {
        Self {
            seed,
            next_index: AtomicU32::new(0),
            balance: Mutex::new(balance),
            funded: Mutex::new(Vec::new()),
            claims: Mutex::new(Vec::new()),
            refunds: Mutex::new(Vec::new()),
        }
    }

    pub fn secret_at(&self, index: u32) -> SecretKey {
        let mut data = [0u8; 8];
        data[0] = self.seed;
        data[4..8].copy_from_slice(&index.to_be_bytes());
        let digest = sha256::Hash::hash(&data).to_byte_array();
        SecretKey::from_slice(&digest).expect("hash is a valid secret key")
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn next_key_index(&self) -> u32 {
        self.next_index.fetch_add(1, Ordering::SeqCst)
    }

    fn derive_public_key(&self, index: u32) -> Result<PublicKey> {
        Ok(self.secret_at(index).public_key(&Secp256k1::new()))
    }

    fn derive_secret_key(&self, index: u32) -> Result<SecretKey> {
        Ok(self.secret_at(index))
    }

    async fn balance(&self) -> Result<u64> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn send_to_address(&self, address: &str, amount_sat: u64) -> Result<FundingResult> {
        let mut funded = self.funded.lock().unwrap();
        funded.push((address.to_string(), amount_sat));
        Ok(FundingResult {
            transaction_id: format!("funding-{}", funded.len()),
            miner_fee: 210,
        })
    }

    async fn claim_htlc(&self, htlc: &HtlcRef, preimage: [u8; 32]) -> Result<String> {
        let mut claims = self.claims.lock().unwrap();
        claims.push((htlc.clone(), preimage));
        Ok(format!("claim-{}", claims.len()))
    }

    async fn refund_htlc(&self, htlc: &HtlcRef) -> Result<String> {
        let mut refunds = self.refunds.lock().unwrap();
        refunds.push(htlc.clone());
        Ok(format!("refund-{}", refunds.len()))
    }
}

pub struct MockLightning {
    pub height: Mutex<u32>,
    pub routes: Mutex<Vec<Route>>,
    /// `None` makes `pay_invoice` fail.
    pub pay_preimage: Mutex<Option<[u8; 32]>>,
    pub payment_state: Mutex<Option<PaymentState>>,
    pub hold_invoices: Mutex<Vec<[u8; 32]>>,
    pub settled: Mutex<Vec<[u8; 32]>>,
    pub cancelled: Mutex<Vec<[u8; 32]>>,
}

impl MockLightning {
    pub fn new(height: u32) -> Self {
        Self {
            height: Mutex::new(height),
            routes: Mutex::new(Vec::new()),
            pay_preimage: Mutex::new(None),
            payment_state: Mutex::new(Some(PaymentState::Failed)),
            hold_invoices: Mutex::new(Vec::new()),
            settled: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LightningClient for MockLightning {
    async fn block_height(&self) -> Result<u32> {
        Ok(*self.height.lock().unwrap())
    }

    async fn query_routes(
        &self,
        _destination: PublicKey,
        _amount_sat: u64,
        _cltv_limit: u32,
    ) -> Result<Vec<Route>> {
        Ok(self.routes.lock().unwrap().clone())
    }

    async fn create_hold_invoice(
        &self,
        preimage_hash: [u8; 32],
        amount_msat: u64,
        _expiry_secs: u32,
    ) -> Result<String> {
        self.hold_invoices.lock().unwrap().push(preimage_hash);
        Ok(format!(
            "hold-{}-{amount_msat}",
            hex::encode(preimage_hash)
        ))
    }

    async fn settle_hold_invoice(&self, preimage: [u8; 32]) -> Result<()> {
        self.settled.lock().unwrap().push(preimage);
        Ok(())
    }

    async fn cancel_hold_invoice(&self, preimage_hash: [u8; 32]) -> Result<()> {
        self.cancelled.lock().unwrap().push(preimage_hash);
        Ok(())
    }

    async fn pay_invoice(&self, _invoice: &str, _cltv_limit: Option<u32>) -> Result<[u8; 32]> {
        (*self.pay_preimage.lock().unwrap()).context("payment has no route")
    }
}

#[async_trait]
impl LndClient for MockLightning {
    async fn track_payment(&self, _payment_hash: [u8; 32]) -> Result<PaymentState> {
        (*self.payment_state.lock().unwrap()).context("trackPayment RPC failed")
    }
}

#[async_trait]
impl ClnClient for MockLightning {
    async fn check_pay_status(&self, _invoice: &str) -> Result<bool> {
        Ok(false)
    }
}

pub struct MockRates {
    pub info: Mutex<Option<PairInfo>>,
    pub zero_conf: Mutex<bool>,
}

#[async_trait]
impl RateProvider for MockRates {
    async fn pair_info(&self, pair: &str) -> Result<Option<PairInfo>> {
        if pair != PAIR {
            return Ok(None);
        }
        Ok(*self.info.lock().unwrap())
    }

    async fn accept_zero_conf(&self, _symbol: &str, _amount: u64) -> bool {
        *self.zero_conf.lock().unwrap()
    }
}

pub struct MockFees {
    pub estimate: Mutex<FeeEstimate>,
}

#[async_trait]
impl FeeEstimator for MockFees {
    async fn estimate(&self, _pair: &str, _amount: u64) -> Result<FeeEstimate> {
        Ok(*self.estimate.lock().unwrap())
    }
}

pub struct TestEnv {
    pub service: SwapService,
    pub chain: Arc<MockChain>,
    pub wallet: Arc<MockWallet>,
    pub lightning: Arc<MockLightning>,
    pub rates: Arc<MockRates>,
    pub fees: Arc<MockFees>,
    pub config_path: PathBuf,
    pub store_path: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestEnv {
    /// A second store handle onto the same database, for tests that need to
    /// poke at records directly.
    pub fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(self.store_path.clone())
    }
}

pub struct EnvParams {
    pub rate: f64,
    pub limits: PairLimits,
    pub fees: FeeEstimate,
    pub wallet_balance: u64,
    pub chain_height: u32,
    pub allow_reverse_swaps: bool,
}

impl Default for EnvParams {
    fn default() -> Self {
        Self {
            rate: 1.0,
            limits: PairLimits {
                minimal: 1_000,
                maximal: 10_000_000,
            },
            fees: FeeEstimate {
                base: 500,
                percentage: 1_000,
                miner: 100,
            },
            wallet_balance: 100_000_000,
            chain_height: 1_000,
            allow_reverse_swaps: true,
        }
    }
}

pub fn test_env(params: EnvParams) -> Result<TestEnv> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let config_path = dir.path().join("pairs.toml");
    let store_path = dir.path().join("swaps.sqlite3");

    // 144 / 40 / 144 blocks on BTC.
    let config = Config {
        pairs: vec![PairConfig {
            base: "BTC".to_string(),
            quote: "BTC".to_string(),
            rate: None,
            fee: 0.5,
            timeout_delta: TimeoutDeltaConfig::Table(TimeoutDeltaMinutes {
                reverse: 1_440,
                swap_minimal: 400,
                swap_maximal: 1_440,
            }),
        }],
    };
    config.save(&config_path).context("write config")?;

    let chain = Arc::new(MockChain::new(params.chain_height));
    let wallet = Arc::new(MockWallet::new(7, params.wallet_balance));
    let lightning = Arc::new(MockLightning::new(100));
    // A short route so invoice probes resolve to the minimal timeout.
    *lightning.routes.lock().unwrap() = vec![Route {
        total_time_lock: 110,
    }];
    let rates = Arc::new(MockRates {
        info: Mutex::new(Some(PairInfo {
            rate: params.rate,
            limits: params.limits,
        })),
        zero_conf: Mutex::new(false),
    });
    let fees = Arc::new(MockFees {
        estimate: Mutex::new(params.fees),
    });

    let btc = Currency {
        symbol: "BTC".to_string(),
        chain: Some(chain.clone()),
        wallet: Some(wallet.clone()),
        lnd: Some(lightning.clone()),
        cln: None,
    };
    let currencies = CurrencyRegistry::new([btc]);

    let store = SqliteStore::open(store_path.clone()).context("open store")?;
    let service = SwapService::new(
        Network::Regtest,
        currencies,
        rates.clone(),
        fees.clone(),
        config,
        config_path.clone(),
        store,
        params.allow_reverse_swaps,
    )?;
    service.start();

    Ok(TestEnv {
        service,
        chain,
        wallet,
        lightning,
        rates,
        fees,
        config_path,
        store_path,
        _dir: dir,
    })
}

/// A signed regtest BOLT11 invoice carrying `preimage_hash`.
pub fn test_invoice(preimage_hash: [u8; 32], amount_msat: u64) -> String {
    let secp = Secp256k1::new();
    let key = SecretKey::from_slice(&[0x41; 32]).expect("static key");

    InvoiceBuilder::new(InvoiceCurrency::Regtest)
        .description("swap".to_string())
        .payment_hash(sha256::Hash::from_byte_array(preimage_hash))
        .payment_secret(PaymentSecret([0x11; 32]))
        .amount_milli_satoshis(amount_msat)
        .current_timestamp()
        .min_final_cltv_expiry_delta(80)
        .build_signed(|hash: &Message| secp.sign_ecdsa_recoverable(hash, &key))
        .expect("build invoice")
        .to_string()
}

/// Polls until `f` yields a value or the timeout elapses.
pub async fn wait_until<T, F, Fut>(what: &str, timeout: Duration, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = f().await.with_context(|| format!("poll {what}"))? {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            anyhow::bail!("timeout waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
