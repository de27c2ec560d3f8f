use anyhow::{Context as _, Result};
use bitcoin::hashes::{Hash as _, ripemd160, sha256};
use bitcoin::opcodes::all as opcodes;
use bitcoin::script::Builder;
use bitcoin::secp256k1::{All, PublicKey, Secp256k1, XOnlyPublicKey};
use bitcoin::taproot::{TaprootBuilder, TaprootSpendInfo};
use bitcoin::{Address, Network, ScriptBuf};

/// Parameters of a hash time-locked contract output.
#[derive(Debug, Clone)]
pub struct HtlcSpec {
    pub preimage_hash: [u8; 32],
    pub claim_pubkey: PublicKey,
    pub refund_pubkey: PublicKey,
    pub timeout_block_height: u32,
}

impl HtlcSpec {
    /// The legacy P2WSH witness script: preimage branch selects the claim
    /// key, the timeout branch the refund key.
    pub fn witness_script(&self) -> ScriptBuf {
        let hash = ripemd160::Hash::hash(&self.preimage_hash).to_byte_array();

        Builder::new()
            .push_opcode(opcodes::OP_HASH160)
            .push_slice(hash)
            .push_opcode(opcodes::OP_EQUAL)
            .push_opcode(opcodes::OP_IF)
            .push_slice(self.claim_pubkey.serialize())
            .push_opcode(opcodes::OP_ELSE)
            .push_int(i64::from(self.timeout_block_height))
            .push_opcode(opcodes::OP_CLTV)
            .push_opcode(opcodes::OP_DROP)
            .push_slice(self.refund_pubkey.serialize())
            .push_opcode(opcodes::OP_ENDIF)
            .push_opcode(opcodes::OP_CHECKSIG)
            .into_script()
    }

    pub fn p2wsh_address(&self, network: Network) -> Address {
        Address::p2wsh(&self.witness_script(), network)
    }
}

/// The two script-path leaves of a Taproot swap output. The key path is the
/// MuSig2 aggregate of both parties and never appears in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapTree {
    pub claim_leaf: ScriptBuf,
    pub refund_leaf: ScriptBuf,
}

impl SwapTree {
    pub fn new(
        preimage_hash: [u8; 32],
        claim_key: XOnlyPublicKey,
        refund_key: XOnlyPublicKey,
        timeout_block_height: u32,
    ) -> Self {
        let hash = ripemd160::Hash::hash(&preimage_hash).to_byte_array();

        let claim_leaf = Builder::new()
            .push_opcode(opcodes::OP_SIZE)
            .push_int(32)
            .push_opcode(opcodes::OP_EQUALVERIFY)
            .push_opcode(opcodes::OP_HASH160)
            .push_slice(hash)
            .push_opcode(opcodes::OP_EQUALVERIFY)
            .push_x_only_key(&claim_key)
            .push_opcode(opcodes::OP_CHECKSIG)
            .into_script();

        let refund_leaf = Builder::new()
            .push_x_only_key(&refund_key)
            .push_opcode(opcodes::OP_CHECKSIGVERIFY)
            .push_int(i64::from(timeout_block_height))
            .push_opcode(opcodes::OP_CLTV)
            .into_script();

        Self {
            claim_leaf,
            refund_leaf,
        }
    }

    pub fn spend_info(
        &self,
        secp: &Secp256k1<All>,
        internal_key: XOnlyPublicKey,
    ) -> Result<TaprootSpendInfo> {
        TaprootBuilder::new()
            .add_leaf(1, self.claim_leaf.clone())
            .context("add claim leaf")?
            .add_leaf(1, self.refund_leaf.clone())
            .context("add refund leaf")?
            .finalize(secp, internal_key)
            .map_err(|_| anyhow::anyhow!("finalize taproot builder"))
    }

    pub fn address(
        &self,
        secp: &Secp256k1<All>,
        internal_key: XOnlyPublicKey,
        network: Network,
    ) -> Result<Address> {
        let spend_info = self.spend_info(secp, internal_key)?;
        Ok(Address::p2tr(
            secp,
            internal_key,
            spend_info.merkle_root(),
            network,
        ))
    }

    /// Wire form: claim and refund leaf hex joined by `:`.
    pub fn serialize_hex(&self) -> String {
        format!(
            "{}:{}",
            hex::encode(self.claim_leaf.as_bytes()),
            hex::encode(self.refund_leaf.as_bytes())
        )
    }

    pub fn from_hex(serialized: &str) -> Result<Self> {
        let (claim, refund) = serialized
            .split_once(':')
            .context("swap tree must contain two leaves")?;
        Ok(Self {
            claim_leaf: ScriptBuf::from_bytes(hex::decode(claim).context("decode claim leaf")?),
            refund_leaf: ScriptBuf::from_bytes(hex::decode(refund).context("decode refund leaf")?),
        })
    }
}

/// Hash of a claim preimage as committed to in swap scripts and invoices.
pub fn sha256_preimage(preimage: &[u8; 32]) -> [u8; 32] {
    sha256::Hash::hash(preimage).to_byte_array()
}

/// BIP21 payment URI for a lockup address.
pub fn bip21(address: &str, amount_sat: u64, label: &str) -> String {
    format!(
        "bitcoin:{address}?amount={}&label={label}",
        format_btc(amount_sat)
    )
}

fn format_btc(sats: u64) -> String {
    let whole = sats / 100_000_000;
    let frac = sats % 100_000_000;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:08}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
