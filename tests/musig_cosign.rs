mod support;

use std::str::FromStr as _;

use anyhow::{Context as _, Result};
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize as consensus_serialize;
use bitcoin::hashes::{Hash as _, sha256};
use bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};
use bitcoin::taproot::TapTweakHash;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use secp256k1::musig::{
    AggregatedNonce, KeyAggCache, PartialSignature, PublicNonce, SecretNonce, Session,
    SessionSecretRand,
};

use support::{EnvParams, PAIR, test_env, test_invoice};
use swapd::chain::Wallet as _;
use swapd::chain::scripts::SwapTree;
use swapd::lightning::PaymentState;
use swapd::swap::musig::aggregate_public_keys;
use swapd::swap::{OrderSide, SwapStatus, SwapVersion};

fn user_secret(seed: u8) -> bitcoin::secp256k1::SecretKey {
    bitcoin::secp256k1::SecretKey::from_slice(&[seed; 32]).expect("static key")
}

fn user_pubkey(seed: u8) -> bitcoin::secp256k1::PublicKey {
    user_secret(seed).public_key(&bitcoin::secp256k1::Secp256k1::new())
}

fn preimage_and_hash(seed: u8) -> ([u8; 32], [u8; 32]) {
    let preimage = [seed; 32];
    (preimage, sha256::Hash::hash(&preimage).to_byte_array())
}

/// A transaction with a single output paying `address`.
fn lockup_transaction(address: &str, value: u64) -> Result<Transaction> {
    let script_pubkey = Address::from_str(address)?
        .require_network(Network::Regtest)?
        .script_pubkey();
    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey,
        }],
    })
}

/// A single-input, single-output spend of `outpoint`.
fn spend_transaction(outpoint: OutPoint, value: u64, destination: ScriptBuf) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_LOCKTIME_NO_RBF,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value - 500),
            script_pubkey: destination,
        }],
    }
}

fn key_spend_sighash(tx: &Transaction, prevout: &TxOut) -> Result<[u8; 32]> {
    let mut cache = SighashCache::new(tx);
    let sighash = cache.taproot_key_spend_signature_hash(
        0,
        &Prevouts::All(&[prevout.clone()]),
        TapSighashType::Default,
    )?;
    Ok(sighash.to_byte_array())
}

struct PeerSession {
    cache: KeyAggCache,
    _sec_nonce: SecretNonce,
    pub_nonce: PublicNonce,
    service_key: secp256k1::PublicKey,
}

/// The counterparty's side of the MuSig2 session: aggregate with the service
/// key first, tweak for the tree, generate a nonce over the sighash.
fn peer_session(
    service_key: &bitcoin::secp256k1::PublicKey,
    user_key: &bitcoin::secp256k1::PublicKey,
    redeem_script: &str,
    sighash: [u8; 32],
) -> Result<PeerSession> {
    let secp = secp256k1::Secp256k1::new();
    let service_musig = secp256k1::PublicKey::from_slice(&service_key.serialize())?;
    let user_musig = secp256k1::PublicKey::from_slice(&user_key.serialize())?;

    let mut cache = KeyAggCache::new(&secp, &[&service_musig, &user_musig]);

    let internal = aggregate_public_keys(service_key, user_key)?;
    let tree = SwapTree::from_hex(redeem_script)?;
    let merkle_root = tree
        .spend_info(&bitcoin::secp256k1::Secp256k1::new(), internal)?
        .merkle_root()
        .context("tree without merkle root")?;
    let tweak = TapTweakHash::from_key_and_tweak(internal, Some(merkle_root));
    let scalar = secp256k1::Scalar::from_be_bytes(tweak.to_byte_array())
        .map_err(|_| anyhow::anyhow!("tweak out of range"))?;
    cache.pubkey_xonly_tweak_add(&secp, &scalar)?;

    let msg = secp256k1::Message::from_digest(sighash);
    let (sec_nonce, pub_nonce) = cache.nonce_gen(
        &secp,
        SessionSecretRand::from_rng(&mut rand::thread_rng()),
        user_musig,
        msg,
        None,
    );

    Ok(PeerSession {
        cache,
        _sec_nonce: sec_nonce,
        pub_nonce,
        service_key: service_musig,
    })
}

#[tokio::test]
async fn cooperative_refund_signs_after_failure() -> Result<()> {
    let env = test_env(EnvParams::default())?;
    let (_, preimage_hash) = preimage_and_hash(31);
    let invoice = test_invoice(preimage_hash, 100_000_000);

    let created = env
        .service
        .create_swap(
            PAIR,
            OrderSide::Buy,
            SwapVersion::Taproot,
            &invoice,
            &hex::encode(user_pubkey(9).serialize()),
        )
        .await?;

    let lockup_tx = lockup_transaction(&created.address, created.expected_amount)?;
    let lockup_txid = lockup_tx.compute_txid();
    env.chain
        .put_transaction(&lockup_txid.to_string(), consensus_serialize(&lockup_tx));

    let mut store = env.open_store()?;
    store.set_submarine_lockup(&created.id, &lockup_txid.to_string())?;
    store.update_submarine_status(&created.id, SwapStatus::SwapExpired)?;

    let refund_tx = spend_transaction(
        OutPoint {
            txid: lockup_txid,
            vout: 0,
        },
        created.expected_amount,
        lockup_tx.output[0].script_pubkey.clone(),
    );
    let sighash = key_spend_sighash(&refund_tx, &lockup_tx.output[0])?;

    let swap = store
        .get_submarine(&created.id)?
        .context("swap missing")?;
    let service_key = env.wallet.derive_public_key(swap.key_index)?;
    let peer = peer_session(&service_key, &user_pubkey(9), &swap.redeem_script, sighash)?;

    let signature = env
        .service
        .sign_refund(
            &created.id,
            &peer.pub_nonce.serialize(),
            &consensus_serialize(&refund_tx),
            0,
        )
        .await?;

    // The service's partial signature must verify in the shared session.
    let secp = secp256k1::Secp256k1::new();
    let service_nonce = PublicNonce::from_byte_array(&signature.pub_nonce)?;
    let agg_nonce = AggregatedNonce::new(&secp, &[&peer.pub_nonce, &service_nonce]);
    let msg = secp256k1::Message::from_digest(sighash);
    let session = Session::new(&secp, &peer.cache, agg_nonce, msg);
    let partial = PartialSignature::from_byte_array(&signature.partial_signature)?;
    assert!(session.partial_verify(&secp, &peer.cache, &partial, &service_nonce, peer.service_key));
    Ok(())
}

#[tokio::test]
async fn refund_refused_while_payment_can_still_settle() -> Result<()> {
    let env = test_env(EnvParams::default())?;
    let (_, preimage_hash) = preimage_and_hash(32);
    let invoice = test_invoice(preimage_hash, 100_000_000);

    let created = env
        .service
        .create_swap(
            PAIR,
            OrderSide::Buy,
            SwapVersion::Taproot,
            &invoice,
            &hex::encode(user_pubkey(9).serialize()),
        )
        .await?;

    let lockup_tx = lockup_transaction(&created.address, created.expected_amount)?;
    let lockup_txid = lockup_tx.compute_txid();
    env.chain
        .put_transaction(&lockup_txid.to_string(), consensus_serialize(&lockup_tx));

    let mut store = env.open_store()?;
    store.set_submarine_lockup(&created.id, &lockup_txid.to_string())?;

    let refund_tx = spend_transaction(
        OutPoint {
            txid: lockup_txid,
            vout: 0,
        },
        created.expected_amount,
        lockup_tx.output[0].script_pubkey.clone(),
    );
    let raw_refund = consensus_serialize(&refund_tx);

    // Not failed yet.
    let err = env
        .service
        .sign_refund(&created.id, &[0u8; 66], &raw_refund, 0)
        .await
        .err()
        .context("must refuse before failure")?;
    assert_eq!(err.code(), "NOT_ELIGIBLE_FOR_COOPERATIVE_REFUND");

    // Failed, but the payment is still in flight.
    store.update_submarine_status(&created.id, SwapStatus::SwapExpired)?;
    *env.lightning.payment_state.lock().unwrap() = Some(PaymentState::InFlight);

    let err = env
        .service
        .sign_refund(&created.id, &[0u8; 66], &raw_refund, 0)
        .await
        .err()
        .context("must refuse while in flight")?;
    assert_eq!(err.code(), "NOT_ELIGIBLE_FOR_COOPERATIVE_REFUND");

    let err = env
        .service
        .sign_refund("ffffffffffffffff", &[0u8; 66], &raw_refund, 0)
        .await
        .err()
        .context("unknown swap")?;
    assert_eq!(err.code(), "SWAP_NOT_FOUND");

    Ok(())
}

#[tokio::test]
async fn refund_refuses_foreign_spends() -> Result<()> {
    let env = test_env(EnvParams::default())?;
    let (_, preimage_hash) = preimage_and_hash(33);
    let invoice = test_invoice(preimage_hash, 100_000_000);

    let created = env
        .service
        .create_swap(
            PAIR,
            OrderSide::Buy,
            SwapVersion::Taproot,
            &invoice,
            &hex::encode(user_pubkey(9).serialize()),
        )
        .await?;

    let lockup_tx = lockup_transaction(&created.address, created.expected_amount)?;
    let lockup_txid = lockup_tx.compute_txid();
    env.chain
        .put_transaction(&lockup_txid.to_string(), consensus_serialize(&lockup_tx));

    let mut store = env.open_store()?;
    store.set_submarine_lockup(&created.id, &lockup_txid.to_string())?;
    store.update_submarine_status(&created.id, SwapStatus::SwapExpired)?;

    // Spends something that is not the swap's lockup output.
    let foreign = spend_transaction(
        OutPoint {
            txid: lockup_txid,
            vout: 7,
        },
        created.expected_amount,
        lockup_tx.output[0].script_pubkey.clone(),
    );

    let swap = store.get_submarine(&created.id)?.context("swap missing")?;
    let service_key = env.wallet.derive_public_key(swap.key_index)?;
    let sighash = key_spend_sighash(&foreign, &lockup_tx.output[0])?;
    let peer = peer_session(&service_key, &user_pubkey(9), &swap.redeem_script, sighash)?;

    let err = env
        .service
        .sign_refund(
            &created.id,
            &peer.pub_nonce.serialize(),
            &consensus_serialize(&foreign),
            0,
        )
        .await
        .err()
        .context("must refuse foreign outpoint")?;
    assert!(err.to_string().contains("lockup output"));

    Ok(())
}

#[tokio::test]
async fn reverse_claim_guards_preimage_and_settles() -> Result<()> {
    let env = test_env(EnvParams::default())?;
    let (preimage, preimage_hash) = preimage_and_hash(34);

    let created = env
        .service
        .create_reverse_swap(
            PAIR,
            OrderSide::Sell,
            SwapVersion::Taproot,
            100_000,
            &hex::encode(preimage_hash),
            &hex::encode(user_pubkey(9).serialize()),
        )
        .await?;

    let lockup_tx = lockup_transaction(&created.lockup_address, created.onchain_amount)?;
    let lockup_txid = lockup_tx.compute_txid();
    // The mock chain serves the lockup under the wallet's funding id.
    env.chain
        .put_transaction(&created.lockup_transaction_id, consensus_serialize(&lockup_tx));

    let claim_tx = spend_transaction(
        OutPoint {
            txid: lockup_txid,
            vout: 0,
        },
        created.onchain_amount,
        lockup_tx.output[0].script_pubkey.clone(),
    );
    let raw_claim = consensus_serialize(&claim_tx);

    // A wrong preimage is rejected and nothing is persisted.
    let err = env
        .service
        .sign_reverse_swap_claim(&created.id, [0xFF; 32], &[0u8; 66], &raw_claim, 0)
        .await
        .err()
        .context("wrong preimage must fail")?;
    assert_eq!(err.code(), "INCORRECT_PREIMAGE");

    let store = env.open_store()?;
    let swap = store.get_reverse(&created.id)?.context("swap missing")?;
    assert_eq!(swap.preimage, None);
    assert!(env.lightning.settled.lock().unwrap().is_empty());

    // The correct preimage settles the invoice and yields a signature.
    let sighash = key_spend_sighash(&claim_tx, &lockup_tx.output[0])?;
    let service_key = env.wallet.derive_public_key(swap.key_index)?;
    let peer = peer_session(&service_key, &user_pubkey(9), &swap.redeem_script, sighash)?;

    let signature = env
        .service
        .sign_reverse_swap_claim(
            &created.id,
            preimage,
            &peer.pub_nonce.serialize(),
            &raw_claim,
            0,
        )
        .await?;
    assert_eq!(signature.pub_nonce.len(), 66);
    assert_eq!(signature.partial_signature.len(), 32);

    assert_eq!(env.lightning.settled.lock().unwrap().clone(), vec![preimage]);
    let swap = store.get_reverse(&created.id)?.context("swap missing")?;
    assert_eq!(swap.status, SwapStatus::InvoiceSettled);
    assert_eq!(swap.preimage.as_deref(), Some(hex::encode(preimage).as_str()));

    Ok(())
}
