use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use rusqlite::{Connection, OptionalExtension as _, params};

use super::{
    AnySwap, ChainSwap, ChainSwapLeg, OrderSide, ReverseSwap, SubmarineSwap, SwapStatus,
    SwapVersion,
};

/// Which leg of a chain swap a `chain_swap_legs` row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegDirection {
    Sending,
    Receiving,
}

impl LegDirection {
    fn as_str(self) -> &'static str {
        match self {
            LegDirection::Sending => "sending",
            LegDirection::Receiving => "receiving",
        }
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create sqlite store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // --- submarine swaps ---

    pub fn insert_submarine(&mut self, swap: &SubmarineSwap) -> Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO submarine_swaps (
  id, pair, order_side, version, status, fee,
  preimage_hash, preimage,
  invoice, invoice_amount, expected_amount, accept_zero_conf,
  lockup_address, redeem_script, key_index, refund_public_key,
  timeout_block_height, lockup_transaction_id
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
"#,
                params![
                    &swap.id,
                    &swap.pair,
                    swap.order_side.to_string(),
                    swap.version.to_string(),
                    swap.status.to_string(),
                    swap.fee,
                    &swap.preimage_hash,
                    swap.preimage.as_deref(),
                    &swap.invoice,
                    swap.invoice_amount,
                    swap.expected_amount,
                    swap.accept_zero_conf,
                    &swap.lockup_address,
                    &swap.redeem_script,
                    swap.key_index,
                    &swap.refund_public_key,
                    swap.timeout_block_height,
                    swap.lockup_transaction_id.as_deref(),
                ],
            )
            .with_context(|| format!("insert submarine swap {}", swap.id))?;
        Ok(())
    }

    pub fn get_submarine(&self, id: &str) -> Result<Option<SubmarineSwap>> {
        self.conn
            .query_row(
                &format!("{SUBMARINE_SELECT} WHERE id = ?1"),
                params![id],
                row_to_submarine,
            )
            .optional()
            .with_context(|| format!("get submarine swap {id}"))
    }

    pub fn submarine_by_lockup_address(&self, address: &str) -> Result<Option<SubmarineSwap>> {
        self.conn
            .query_row(
                &format!("{SUBMARINE_SELECT} WHERE lockup_address = ?1"),
                params![address],
                row_to_submarine,
            )
            .optional()
            .with_context(|| format!("get submarine swap by lockup address {address}"))
    }

    pub fn list_submarines_watching(&self) -> Result<Vec<SubmarineSwap>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{SUBMARINE_SELECT} WHERE status NOT IN ({TERMINAL_STATUSES}) ORDER BY id"
            ))
            .context("prepare list submarine swaps")?;
        let rows = stmt
            .query_map([], row_to_submarine)
            .context("query submarine swaps")?;
        collect_rows(rows)
    }

    pub fn update_submarine_status(&mut self, id: &str, status: SwapStatus) -> Result<()> {
        self.update_status("submarine_swaps", id, status)
    }

    pub fn set_submarine_lockup(&mut self, id: &str, transaction_id: &str) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE submarine_swaps SET lockup_transaction_id = ?2 WHERE id = ?1",
                params![id, transaction_id],
            )
            .with_context(|| format!("set submarine lockup {id}"))?;
        anyhow::ensure!(rows == 1, "swap not found: {id}");
        Ok(())
    }

    pub fn set_submarine_preimage(&mut self, id: &str, preimage_hex: &str) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE submarine_swaps SET preimage = ?2 WHERE id = ?1",
                params![id, preimage_hex],
            )
            .with_context(|| format!("set submarine preimage {id}"))?;
        anyhow::ensure!(rows == 1, "swap not found: {id}");
        Ok(())
    }

    // --- reverse swaps ---

    pub fn insert_reverse(&mut self, swap: &ReverseSwap) -> Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO reverse_swaps (
  id, pair, order_side, version, status, fee,
  preimage_hash, preimage,
  invoice, invoice_amount, onchain_amount, miner_fee,
  claim_public_key, lockup_address, redeem_script, key_index,
  transaction_id, timeout_block_height
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
"#,
                params![
                    &swap.id,
                    &swap.pair,
                    swap.order_side.to_string(),
                    swap.version.to_string(),
                    swap.status.to_string(),
                    swap.fee,
                    &swap.preimage_hash,
                    swap.preimage.as_deref(),
                    &swap.invoice,
                    swap.invoice_amount,
                    swap.onchain_amount,
                    swap.miner_fee,
                    &swap.claim_public_key,
                    &swap.lockup_address,
                    &swap.redeem_script,
                    swap.key_index,
                    &swap.transaction_id,
                    swap.timeout_block_height,
                ],
            )
            .with_context(|| format!("insert reverse swap {}", swap.id))?;
        Ok(())
    }

    pub fn get_reverse(&self, id: &str) -> Result<Option<ReverseSwap>> {
        self.conn
            .query_row(
                &format!("{REVERSE_SELECT} WHERE id = ?1"),
                params![id],
                row_to_reverse,
            )
            .optional()
            .with_context(|| format!("get reverse swap {id}"))
    }

    pub fn reverse_by_preimage_hash(&self, preimage_hash: &str) -> Result<Option<ReverseSwap>> {
        self.conn
            .query_row(
                &format!("{REVERSE_SELECT} WHERE preimage_hash = ?1"),
                params![preimage_hash],
                row_to_reverse,
            )
            .optional()
            .with_context(|| format!("get reverse swap by preimage hash {preimage_hash}"))
    }

    pub fn reverse_by_lockup_transaction(&self, transaction_id: &str) -> Result<Option<ReverseSwap>> {
        self.conn
            .query_row(
                &format!("{REVERSE_SELECT} WHERE transaction_id = ?1"),
                params![transaction_id],
                row_to_reverse,
            )
            .optional()
            .with_context(|| format!("get reverse swap by lockup transaction {transaction_id}"))
    }

    pub fn list_reverse_watching(&self) -> Result<Vec<ReverseSwap>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{REVERSE_SELECT} WHERE status NOT IN ({TERMINAL_STATUSES}) ORDER BY id"
            ))
            .context("prepare list reverse swaps")?;
        let rows = stmt
            .query_map([], row_to_reverse)
            .context("query reverse swaps")?;
        collect_rows(rows)
    }

    pub fn update_reverse_status(&mut self, id: &str, status: SwapStatus) -> Result<()> {
        self.update_status("reverse_swaps", id, status)
    }

    pub fn set_reverse_preimage(&mut self, id: &str, preimage_hex: &str) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE reverse_swaps SET preimage = ?2 WHERE id = ?1",
                params![id, preimage_hex],
            )
            .with_context(|| format!("set reverse preimage {id}"))?;
        anyhow::ensure!(rows == 1, "swap not found: {id}");
        Ok(())
    }

    // --- chain swaps ---

    pub fn insert_chain(&mut self, swap: &ChainSwap) -> Result<()> {
        let tx = self.conn.transaction().context("begin chain swap insert")?;
        tx.execute(
            r#"
INSERT INTO chain_swaps (
  id, pair, order_side, version, status, fee,
  preimage_hash, preimage, accept_zero_conf,
  claim_public_key, refund_public_key
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
"#,
            params![
                &swap.id,
                &swap.pair,
                swap.order_side.to_string(),
                swap.version.to_string(),
                swap.status.to_string(),
                swap.fee,
                &swap.preimage_hash,
                swap.preimage.as_deref(),
                swap.accept_zero_conf,
                &swap.claim_public_key,
                &swap.refund_public_key,
            ],
        )
        .with_context(|| format!("insert chain swap {}", swap.id))?;

        for (direction, leg) in [
            (LegDirection::Sending, &swap.sending),
            (LegDirection::Receiving, &swap.receiving),
        ] {
            tx.execute(
                r#"
INSERT INTO chain_swap_legs (
  swap_id, direction, symbol, lockup_address, expected_amount,
  redeem_script, key_index, timeout_block_height, lockup_transaction_id
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
"#,
                params![
                    &swap.id,
                    direction.as_str(),
                    &leg.symbol,
                    &leg.lockup_address,
                    leg.expected_amount,
                    &leg.redeem_script,
                    leg.key_index,
                    leg.timeout_block_height,
                    leg.lockup_transaction_id.as_deref(),
                ],
            )
            .with_context(|| format!("insert chain swap leg {} {}", swap.id, direction.as_str()))?;
        }

        tx.commit().context("commit chain swap insert")?;
        Ok(())
    }

    pub fn get_chain(&self, id: &str) -> Result<Option<ChainSwap>> {
        let head = self
            .conn
            .query_row(
                &format!("{CHAIN_SELECT} WHERE id = ?1"),
                params![id],
                row_to_chain_head,
            )
            .optional()
            .with_context(|| format!("get chain swap {id}"))?;

        let Some(head) = head else {
            return Ok(None);
        };
        Ok(Some(self.attach_legs(head)?))
    }

    pub fn chain_by_leg_lockup_address(
        &self,
        address: &str,
    ) -> Result<Option<(ChainSwap, LegDirection)>> {
        let found: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT swap_id, direction FROM chain_swap_legs WHERE lockup_address = ?1",
                params![address],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .with_context(|| format!("get chain swap leg by lockup address {address}"))?;

        let Some((swap_id, direction)) = found else {
            return Ok(None);
        };
        let direction = match direction.as_str() {
            "sending" => LegDirection::Sending,
            _ => LegDirection::Receiving,
        };
        let swap = self
            .get_chain(&swap_id)?
            .with_context(|| format!("chain swap leg without swap: {swap_id}"))?;
        Ok(Some((swap, direction)))
    }

    pub fn chain_by_sending_lockup_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<ChainSwap>> {
        let swap_id: Option<String> = self
            .conn
            .query_row(
                "SELECT swap_id FROM chain_swap_legs WHERE direction = 'sending' AND lockup_transaction_id = ?1",
                params![transaction_id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("get chain swap by sending lockup {transaction_id}"))?;

        match swap_id {
            Some(id) => self.get_chain(&id),
            None => Ok(None),
        }
    }

    pub fn list_chain_watching(&self) -> Result<Vec<ChainSwap>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{CHAIN_SELECT} WHERE status NOT IN ({TERMINAL_STATUSES}) ORDER BY id"
            ))
            .context("prepare list chain swaps")?;
        let heads = stmt
            .query_map([], row_to_chain_head)
            .context("query chain swaps")?;
        let heads = collect_rows(heads)?;

        heads
            .into_iter()
            .map(|head| self.attach_legs(head))
            .collect()
    }

    pub fn update_chain_status(&mut self, id: &str, status: SwapStatus) -> Result<()> {
        self.update_status("chain_swaps", id, status)
    }

    pub fn set_chain_preimage(&mut self, id: &str, preimage_hex: &str) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE chain_swaps SET preimage = ?2 WHERE id = ?1",
                params![id, preimage_hex],
            )
            .with_context(|| format!("set chain preimage {id}"))?;
        anyhow::ensure!(rows == 1, "swap not found: {id}");
        Ok(())
    }

    pub fn set_chain_leg_lockup(
        &mut self,
        id: &str,
        direction: LegDirection,
        transaction_id: &str,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE chain_swap_legs SET lockup_transaction_id = ?3 WHERE swap_id = ?1 AND direction = ?2",
                params![id, direction.as_str(), transaction_id],
            )
            .with_context(|| format!("set chain leg lockup {id}"))?;
        anyhow::ensure!(rows == 1, "chain swap leg not found: {id}");
        Ok(())
    }

    // --- cross-kind queries ---

    pub fn get_any(&self, id: &str) -> Result<Option<AnySwap>> {
        if let Some(swap) = self.get_submarine(id)? {
            return Ok(Some(AnySwap::Submarine(swap)));
        }
        if let Some(swap) = self.get_reverse(id)? {
            return Ok(Some(AnySwap::Reverse(swap)));
        }
        if let Some(swap) = self.get_chain(id)? {
            return Ok(Some(AnySwap::Chain(swap)));
        }
        Ok(None)
    }

    /// Whether any swap of any kind already uses this preimage hash.
    pub fn preimage_hash_exists(&self, preimage_hash: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                r#"
SELECT
  (SELECT COUNT(*) FROM submarine_swaps WHERE preimage_hash = ?1)
  + (SELECT COUNT(*) FROM reverse_swaps WHERE preimage_hash = ?1)
  + (SELECT COUNT(*) FROM chain_swaps WHERE preimage_hash = ?1)
"#,
                params![preimage_hash],
                |row| row.get(0),
            )
            .context("count swaps by preimage hash")?;
        Ok(count > 0)
    }

    pub fn invoice_exists(&self, invoice: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                r#"
SELECT
  (SELECT COUNT(*) FROM submarine_swaps WHERE invoice = ?1)
  + (SELECT COUNT(*) FROM reverse_swaps WHERE invoice = ?1)
"#,
                params![invoice],
                |row| row.get(0),
            )
            .context("count swaps by invoice")?;
        Ok(count > 0)
    }

    fn update_status(&mut self, table: &str, id: &str, status: SwapStatus) -> Result<()> {
        let rows = self
            .conn
            .execute(
                &format!("UPDATE {table} SET status = ?2 WHERE id = ?1"),
                params![id, status.to_string()],
            )
            .with_context(|| format!("update {table} status {id}"))?;
        anyhow::ensure!(rows == 1, "swap not found: {id}");
        Ok(())
    }

    fn attach_legs(&self, (head, id): (ChainSwapHead, String)) -> Result<ChainSwap> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
SELECT direction, symbol, lockup_address, expected_amount,
       redeem_script, key_index, timeout_block_height, lockup_transaction_id
FROM chain_swap_legs WHERE swap_id = ?1
"#,
            )
            .context("prepare chain swap legs")?;

        let mut sending = None;
        let mut receiving = None;
        let rows = stmt
            .query_map(params![&id], |row| {
                let direction: String = row.get(0)?;
                let leg = ChainSwapLeg {
                    symbol: row.get(1)?,
                    lockup_address: row.get(2)?,
                    expected_amount: col_u64(row, 3)?,
                    redeem_script: row.get(4)?,
                    key_index: col_u32(row, 5)?,
                    timeout_block_height: col_u32(row, 6)?,
                    lockup_transaction_id: row.get(7)?,
                };
                Ok((direction, leg))
            })
            .context("query chain swap legs")?;

        for row in rows {
            let (direction, leg) = row.context("read chain swap leg")?;
            match direction.as_str() {
                "sending" => sending = Some(leg),
                _ => receiving = Some(leg),
            }
        }

        Ok(ChainSwap {
            id,
            pair: head.pair,
            order_side: head.order_side,
            version: head.version,
            status: head.status,
            fee: head.fee,
            preimage_hash: head.preimage_hash,
            preimage: head.preimage,
            accept_zero_conf: head.accept_zero_conf,
            claim_public_key: head.claim_public_key,
            refund_public_key: head.refund_public_key,
            sending: sending.context("chain swap without sending leg")?,
            receiving: receiving.context("chain swap without receiving leg")?,
        })
    }
}

const SUBMARINE_SELECT: &str = r#"
SELECT id, pair, order_side, version, status, fee,
       preimage_hash, preimage,
       invoice, invoice_amount, expected_amount, accept_zero_conf,
       lockup_address, redeem_script, key_index, refund_public_key,
       timeout_block_height, lockup_transaction_id
FROM submarine_swaps
"#;

const REVERSE_SELECT: &str = r#"
SELECT id, pair, order_side, version, status, fee,
       preimage_hash, preimage,
       invoice, invoice_amount, onchain_amount, miner_fee,
       claim_public_key, lockup_address, redeem_script, key_index,
       transaction_id, timeout_block_height
FROM reverse_swaps
"#;

const CHAIN_SELECT: &str = r#"
SELECT id, pair, order_side, version, status, fee,
       preimage_hash, preimage, accept_zero_conf,
       claim_public_key, refund_public_key
FROM chain_swaps
"#;

const TERMINAL_STATUSES: &str =
    "'TransactionClaimed', 'TransactionRefunded', 'TransactionFailed'";

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("read swap row")?);
    }
    Ok(out)
}

fn col_u64(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            format!("invalid unsigned value {value}").into(),
        )
    })
}

fn col_u32(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u32> {
    let value: i64 = row.get(idx)?;
    u32::try_from(value).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            format!("invalid unsigned value {value}").into(),
        )
    })
}

fn col_parse<T: std::str::FromStr>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let value: String = row.get(idx)?;
    value.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid enum value {value}").into(),
        )
    })
}

fn row_to_submarine(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubmarineSwap> {
    Ok(SubmarineSwap {
        id: row.get(0)?,
        pair: row.get(1)?,
        order_side: col_parse::<OrderSide>(row, 2)?,
        version: col_parse::<SwapVersion>(row, 3)?,
        status: col_parse::<SwapStatus>(row, 4)?,
        fee: col_u64(row, 5)?,
        preimage_hash: row.get(6)?,
        preimage: row.get(7)?,
        invoice: row.get(8)?,
        invoice_amount: col_u64(row, 9)?,
        expected_amount: col_u64(row, 10)?,
        accept_zero_conf: row.get(11)?,
        lockup_address: row.get(12)?,
        redeem_script: row.get(13)?,
        key_index: col_u32(row, 14)?,
        refund_public_key: row.get(15)?,
        timeout_block_height: col_u32(row, 16)?,
        lockup_transaction_id: row.get(17)?,
    })
}

fn row_to_reverse(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReverseSwap> {
    Ok(ReverseSwap {
        id: row.get(0)?,
        pair: row.get(1)?,
        order_side: col_parse::<OrderSide>(row, 2)?,
        version: col_parse::<SwapVersion>(row, 3)?,
        status: col_parse::<SwapStatus>(row, 4)?,
        fee: col_u64(row, 5)?,
        preimage_hash: row.get(6)?,
        preimage: row.get(7)?,
        invoice: row.get(8)?,
        invoice_amount: col_u64(row, 9)?,
        onchain_amount: col_u64(row, 10)?,
        miner_fee: col_u64(row, 11)?,
        claim_public_key: row.get(12)?,
        lockup_address: row.get(13)?,
        redeem_script: row.get(14)?,
        key_index: col_u32(row, 15)?,
        transaction_id: row.get(16)?,
        timeout_block_height: col_u32(row, 17)?,
    })
}

/// Chain swap columns minus the legs, which join from their own table.
struct ChainSwapHead {
    pair: String,
    order_side: OrderSide,
    version: SwapVersion,
    status: SwapStatus,
    fee: u64,
    preimage_hash: String,
    preimage: Option<String>,
    accept_zero_conf: bool,
    claim_public_key: String,
    refund_public_key: String,
}

fn row_to_chain_head(row: &rusqlite::Row<'_>) -> rusqlite::Result<(ChainSwapHead, String)> {
    let id: String = row.get(0)?;
    Ok((
        ChainSwapHead {
            pair: row.get(1)?,
            order_side: col_parse::<OrderSide>(row, 2)?,
            version: col_parse::<SwapVersion>(row, 3)?,
            status: col_parse::<SwapStatus>(row, 4)?,
            fee: col_u64(row, 5)?,
            preimage_hash: row.get(6)?,
            preimage: row.get(7)?,
            accept_zero_conf: row.get(8)?,
            claim_public_key: row.get(9)?,
            refund_public_key: row.get(10)?,
        },
        id,
    ))
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS submarine_swaps (
  id TEXT PRIMARY KEY,
  pair TEXT NOT NULL,
  order_side TEXT NOT NULL,
  version TEXT NOT NULL,
  status TEXT NOT NULL,
  fee INTEGER NOT NULL,
  preimage_hash TEXT NOT NULL,
  preimage TEXT,
  invoice TEXT NOT NULL,
  invoice_amount INTEGER NOT NULL,
  expected_amount INTEGER NOT NULL,
  accept_zero_conf INTEGER NOT NULL,
  lockup_address TEXT NOT NULL,
  redeem_script TEXT NOT NULL,
  key_index INTEGER NOT NULL,
  refund_public_key TEXT NOT NULL,
  timeout_block_height INTEGER NOT NULL,
  lockup_transaction_id TEXT
);
CREATE INDEX IF NOT EXISTS submarine_swaps_status_idx ON submarine_swaps(status);
CREATE INDEX IF NOT EXISTS submarine_swaps_lockup_idx ON submarine_swaps(lockup_address);
CREATE INDEX IF NOT EXISTS submarine_swaps_preimage_hash_idx ON submarine_swaps(preimage_hash);

CREATE TABLE IF NOT EXISTS reverse_swaps (
  id TEXT PRIMARY KEY,
  pair TEXT NOT NULL,
  order_side TEXT NOT NULL,
  version TEXT NOT NULL,
  status TEXT NOT NULL,
  fee INTEGER NOT NULL,
  preimage_hash TEXT NOT NULL,
  preimage TEXT,
  invoice TEXT NOT NULL,
  invoice_amount INTEGER NOT NULL,
  onchain_amount INTEGER NOT NULL,
  miner_fee INTEGER NOT NULL,
  claim_public_key TEXT NOT NULL,
  lockup_address TEXT NOT NULL,
  redeem_script TEXT NOT NULL,
  key_index INTEGER NOT NULL,
  transaction_id TEXT NOT NULL,
  timeout_block_height INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS reverse_swaps_status_idx ON reverse_swaps(status);
CREATE INDEX IF NOT EXISTS reverse_swaps_preimage_hash_idx ON reverse_swaps(preimage_hash);
CREATE INDEX IF NOT EXISTS reverse_swaps_transaction_idx ON reverse_swaps(transaction_id);

CREATE TABLE IF NOT EXISTS chain_swaps (
  id TEXT PRIMARY KEY,
  pair TEXT NOT NULL,
  order_side TEXT NOT NULL,
  version TEXT NOT NULL,
  status TEXT NOT NULL,
  fee INTEGER NOT NULL,
  preimage_hash TEXT NOT NULL,
  preimage TEXT,
  accept_zero_conf INTEGER NOT NULL,
  claim_public_key TEXT NOT NULL,
  refund_public_key TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS chain_swaps_status_idx ON chain_swaps(status);
CREATE INDEX IF NOT EXISTS chain_swaps_preimage_hash_idx ON chain_swaps(preimage_hash);

CREATE TABLE IF NOT EXISTS chain_swap_legs (
  swap_id TEXT NOT NULL REFERENCES chain_swaps(id),
  direction TEXT NOT NULL CHECK (direction IN ('sending', 'receiving')),
  symbol TEXT NOT NULL,
  lockup_address TEXT NOT NULL,
  expected_amount INTEGER NOT NULL,
  redeem_script TEXT NOT NULL,
  key_index INTEGER NOT NULL,
  timeout_block_height INTEGER NOT NULL,
  lockup_transaction_id TEXT,
  PRIMARY KEY (swap_id, direction)
);
CREATE INDEX IF NOT EXISTS chain_swap_legs_lockup_idx ON chain_swap_legs(lockup_address);
"#,
    )
    .context("create tables")?;
    Ok(())
}
