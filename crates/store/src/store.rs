//! Registry store trait and persistent implementation.
//!
//! The `RegistryStore` trait defines operations for projecting issuer
//! lifecycle events and querying the resulting state. `SqliteRegistryStore`
//! implements it using a SQLite database with a connection pool (r2d2) for
//! concurrent reads and a dedicated writer connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use alloy_primitives::{hex, Address, Bytes, B256, U256};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};
use crate::types::{
    ApplyOutcome, Approval, IssuerRecord, IssuerStatus, Rejection, StatusCounts, Submission,
};

/// Trait for registry projection and query operations.
///
/// All methods are synchronous to avoid Send bound issues with the storage
/// layer; writes are short transactions on a dedicated connection.
pub trait RegistryStore: Send + Sync {
    /// Project a submission. A submission from a transaction not seen
    /// before always starts a fresh pending application, including after a
    /// decision; replaying the recorded submission transaction is a no-op.
    fn record_submission(&self, sub: &Submission) -> StoreResult<ApplyOutcome>;

    /// Project an approval onto a pending application.
    fn record_approval(&self, approval: &Approval) -> StoreResult<ApplyOutcome>;

    /// Project a rejection onto a pending application.
    fn record_rejection(&self, rejection: &Rejection) -> StoreResult<ApplyOutcome>;

    /// Get the projected record for an issuer.
    fn get_issuer(&self, issuer: Address) -> StoreResult<Option<IssuerRecord>>;

    /// List issuers in a status, most recently touched first.
    fn list_by_status(
        &self,
        status: IssuerStatus,
        limit: u32,
        offset: u32,
    ) -> StoreResult<Vec<IssuerRecord>>;

    /// List all issuers, most recently touched first.
    fn list_all(&self, limit: u32, offset: u32) -> StoreResult<Vec<IssuerRecord>>;

    /// Count issuers per status.
    fn status_counts(&self) -> StoreResult<StatusCounts>;

    /// Highest fully processed block, if any block has been processed.
    fn cursor(&self) -> StoreResult<Option<u64>>;

    /// Advance the cursor. The cursor never moves backwards; a lower value
    /// is ignored.
    fn set_cursor(&self, height: u64) -> StoreResult<()>;

    /// Drop all projected state and the cursor.
    fn reset(&self) -> StoreResult<()>;

    /// Health probe: verify the underlying store answers a trivial read.
    fn ping(&self) -> StoreResult<()>;
}

/// Persistent registry store backed by SQLite.
///
/// Uses a connection pool for concurrent reads and a dedicated writer
/// connection for serialized writes. SQLite WAL mode allows readers to
/// proceed without blocking the writer and vice versa.
pub struct SqliteRegistryStore {
    /// Connection pool for read operations (concurrent).
    read_pool: Pool<SqliteConnectionManager>,
    /// Dedicated connection for write operations (serialized).
    writer: Mutex<Connection>,
}

/// Configure a connection with standard PRAGMAs for WAL mode.
fn configure_connection(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;",
    )
}

fn unique_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

impl SqliteRegistryStore {
    /// Create a new registry store backed by an on-disk SQLite database.
    pub fn new(db_path: impl AsRef<std::path::Path>) -> StoreResult<Self> {
        // Writer connection -- dedicated for projection writes
        let writer = Connection::open(&db_path)?;
        configure_connection(&writer)?;

        // Read pool -- concurrent read-only connections
        let manager = SqliteConnectionManager::file(&db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_init(|conn| configure_connection(conn));
        let read_pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| StoreError::Sqlite(e.to_string()))?;

        let store = Self {
            read_pool,
            writer: Mutex::new(writer),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory registry store for testing.
    ///
    /// In-memory SQLite DBs are per-connection, so tests use a shared cache
    /// URI so the read pool and the writer see the same data.
    pub fn in_memory() -> StoreResult<Self> {
        let uri = format!("file:registry_{}?mode=memory&cache=shared", unique_id());
        let writer = Connection::open(&uri)?;
        configure_connection(&writer)?;

        let manager =
            SqliteConnectionManager::file(&uri).with_init(|conn| configure_connection(conn));
        let read_pool = Pool::builder()
            .max_size(2)
            .build(manager)
            .map_err(|e| StoreError::Sqlite(e.to_string()))?;

        let store = Self {
            read_pool,
            writer: Mutex::new(writer),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Get a read connection from the pool.
    fn read_conn(&self) -> StoreResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .map_err(|e| StoreError::Sqlite(e.to_string()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS issuers (
                 address TEXT PRIMARY KEY,
                 name TEXT NOT NULL,
                 categories TEXT NOT NULL,
                 proposed_fee BLOB NOT NULL,
                 public_key BLOB NOT NULL,
                 stake BLOB NOT NULL,
                 status TEXT NOT NULL,
                 attestation_uid BLOB,
                 fee_approved INTEGER,
                 submitted_block INTEGER NOT NULL,
                 submitted_time INTEGER NOT NULL,
                 decided_block INTEGER,
                 decided_time INTEGER,
                 submit_tx BLOB NOT NULL,
                 decide_tx BLOB
             );

             CREATE TABLE IF NOT EXISTS status_index (
                 address TEXT PRIMARY KEY,
                 status TEXT NOT NULL,
                 seq INTEGER NOT NULL,
                 FOREIGN KEY (address) REFERENCES issuers(address)
             );
             CREATE INDEX IF NOT EXISTS idx_status_seq ON status_index(status, seq);

             CREATE TABLE IF NOT EXISTS metadata (
                 key TEXT PRIMARY KEY,
                 value BLOB NOT NULL
             );",
        )?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<IssuerRecord> {
        let address: String = row.get(0)?;
        let name: String = row.get(1)?;
        let categories_json: String = row.get(2)?;
        let proposed_fee: Vec<u8> = row.get(3)?;
        let public_key: Vec<u8> = row.get(4)?;
        let stake: Vec<u8> = row.get(5)?;
        let status: String = row.get(6)?;
        let attestation_uid: Option<Vec<u8>> = row.get(7)?;
        let fee_approved: Option<bool> = row.get(8)?;
        let submitted_block: i64 = row.get(9)?;
        let submitted_time: i64 = row.get(10)?;
        let decided_block: Option<i64> = row.get(11)?;
        let decided_time: Option<i64> = row.get(12)?;
        let submit_tx: Vec<u8> = row.get(13)?;
        let decide_tx: Option<Vec<u8>> = row.get(14)?;

        let attestation_uid = attestation_uid
            .as_deref()
            .map(|b| b256_from_row(b, 7))
            .transpose()?;
        let decide_tx = decide_tx
            .as_deref()
            .map(|b| b256_from_row(b, 14))
            .transpose()?;

        Ok(IssuerRecord {
            address: address_from_row(&address, 0)?,
            name,
            categories: serde_json::from_str(&categories_json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            proposed_fee: U256::from_be_slice(&proposed_fee),
            public_key: Bytes::from(public_key),
            stake: U256::from_be_slice(&stake),
            status: IssuerStatus::parse(&status).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    6,
                    rusqlite::types::Type::Text,
                    format!("unknown status {status:?}").into(),
                )
            })?,
            attestation_uid,
            fee_approved,
            submitted_block: submitted_block as u64,
            submitted_time: submitted_time as u64,
            decided_block: decided_block.map(|n| n as u64),
            decided_time: decided_time.map(|n| n as u64),
            submit_tx: b256_from_row(&submit_tx, 13)?,
            decide_tx,
        })
    }
}

// Qualified: the listing queries join status_index, which also carries
// address and status columns.
const RECORD_COLUMNS: &str = "issuers.address, issuers.name, issuers.categories,
     issuers.proposed_fee, issuers.public_key, issuers.stake, issuers.status,
     issuers.attestation_uid, issuers.fee_approved, issuers.submitted_block,
     issuers.submitted_time, issuers.decided_block, issuers.decided_time,
     issuers.submit_tx, issuers.decide_tx";

/// Lowercase hex key an issuer address is stored under.
fn address_key(address: Address) -> String {
    format!("0x{}", hex::encode(address))
}

fn address_from_row(key: &str, idx: usize) -> rusqlite::Result<Address> {
    key.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn b256_from_row(bytes: &[u8], idx: usize) -> rusqlite::Result<B256> {
    if bytes.len() != 32 {
        return Err(rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Blob,
            "expected 32 bytes".into(),
        ));
    }
    Ok(B256::from_slice(bytes))
}

fn u256_to_be_bytes(value: U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

/// Status and provenance of an existing row, enough to decide a transition.
struct Existing {
    status: IssuerStatus,
    submit_tx: B256,
    decide_tx: Option<B256>,
}

fn load_existing(conn: &Connection, key: &str) -> StoreResult<Option<Existing>> {
    let row = conn
        .query_row(
            "SELECT status, submit_tx, decide_tx FROM issuers WHERE address = ?",
            params![key],
            |row| {
                let status: String = row.get(0)?;
                let submit_tx: Vec<u8> = row.get(1)?;
                let decide_tx: Option<Vec<u8>> = row.get(2)?;
                Ok((status, submit_tx, decide_tx))
            },
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((status, submit_tx, decide_tx)) => Ok(Some(Existing {
            status: IssuerStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(key.to_string(), format!("status {status:?}")))?,
            submit_tx: b256_from_row(&submit_tx, 1)?,
            decide_tx: decide_tx.as_deref().map(|b| b256_from_row(b, 2)).transpose()?,
        })),
    }
}

/// Place the issuer in the status index, evicting any previous placement.
///
/// One row per address; `seq` is a store-wide counter so higher means more
/// recently touched.
fn index_status(
    tx: &rusqlite::Transaction<'_>,
    key: &str,
    status: IssuerStatus,
) -> StoreResult<()> {
    let seq: i64 = tx.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM status_index",
        [],
        |row| row.get(0),
    )?;
    tx.execute(
        "INSERT INTO status_index (address, status, seq) VALUES (?, ?, ?)
         ON CONFLICT(address) DO UPDATE SET status = excluded.status, seq = excluded.seq",
        params![key, status.as_str(), seq],
    )?;
    Ok(())
}

fn record_decision(
    store: &SqliteRegistryStore,
    issuer: Address,
    tx_hash: B256,
    status: IssuerStatus,
    apply: impl FnOnce(&rusqlite::Transaction<'_>, &str) -> StoreResult<()>,
) -> StoreResult<ApplyOutcome> {
    let key = address_key(issuer);
    let mut conn = store.writer.lock().unwrap();
    let tx = conn.transaction()?;

    let existing = match load_existing(&tx, &key)? {
        None => return Ok(ApplyOutcome::MissingSubmission),
        Some(existing) => existing,
    };
    if existing.status.is_decided() {
        if existing.decide_tx == Some(tx_hash) {
            return Ok(ApplyOutcome::Replayed);
        }
        return Ok(ApplyOutcome::AlreadyDecided);
    }

    apply(&tx, &key)?;
    index_status(&tx, &key, status)?;
    tx.commit()?;
    Ok(ApplyOutcome::Applied)
}

impl RegistryStore for SqliteRegistryStore {
    fn record_submission(&self, sub: &Submission) -> StoreResult<ApplyOutcome> {
        let key = address_key(sub.issuer);
        let mut conn = self.writer.lock().unwrap();
        let tx = conn.transaction()?;

        if let Some(existing) = load_existing(&tx, &key)? {
            if existing.submit_tx == sub.tx_hash {
                return Ok(ApplyOutcome::Replayed);
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO issuers
             (address, name, categories, proposed_fee, public_key, stake, status,
              attestation_uid, fee_approved, submitted_block, submitted_time,
              decided_block, decided_time, submit_tx, decide_tx)
             VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?, NULL, NULL, ?, NULL)",
            params![
                key,
                sub.name,
                serde_json::to_string(&sub.categories)?,
                &u256_to_be_bytes(sub.proposed_fee) as &[u8],
                sub.public_key.as_ref(),
                &u256_to_be_bytes(sub.stake) as &[u8],
                IssuerStatus::Pending.as_str(),
                sub.block_number as i64,
                sub.block_time as i64,
                sub.tx_hash.as_slice(),
            ],
        )?;
        index_status(&tx, &key, IssuerStatus::Pending)?;
        tx.commit()?;
        Ok(ApplyOutcome::Applied)
    }

    fn record_approval(&self, approval: &Approval) -> StoreResult<ApplyOutcome> {
        record_decision(
            self,
            approval.issuer,
            approval.tx_hash,
            IssuerStatus::Approved,
            |tx, key| {
                tx.execute(
                    "UPDATE issuers
                     SET status = ?, attestation_uid = ?, fee_approved = ?,
                         decided_block = ?, decided_time = ?, decide_tx = ?
                     WHERE address = ?",
                    params![
                        IssuerStatus::Approved.as_str(),
                        approval.attestation_uid.as_slice(),
                        approval.fee_approved,
                        approval.block_number as i64,
                        approval.block_time as i64,
                        approval.tx_hash.as_slice(),
                        key,
                    ],
                )?;
                Ok(())
            },
        )
    }

    fn record_rejection(&self, rejection: &Rejection) -> StoreResult<ApplyOutcome> {
        record_decision(
            self,
            rejection.issuer,
            rejection.tx_hash,
            IssuerStatus::Rejected,
            |tx, key| {
                tx.execute(
                    "UPDATE issuers
                     SET status = ?, decided_block = ?, decided_time = ?, decide_tx = ?
                     WHERE address = ?",
                    params![
                        IssuerStatus::Rejected.as_str(),
                        rejection.block_number as i64,
                        rejection.block_time as i64,
                        rejection.tx_hash.as_slice(),
                        key,
                    ],
                )?;
                Ok(())
            },
        )
    }

    fn get_issuer(&self, issuer: Address) -> StoreResult<Option<IssuerRecord>> {
        let conn = self.read_conn()?;
        let result = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM issuers WHERE address = ?"),
                params![address_key(issuer)],
                Self::row_to_record,
            )
            .optional()?;
        Ok(result)
    }

    fn list_by_status(
        &self,
        status: IssuerStatus,
        limit: u32,
        offset: u32,
    ) -> StoreResult<Vec<IssuerRecord>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM issuers
             JOIN status_index ON status_index.address = issuers.address
             WHERE status_index.status = ?
             ORDER BY status_index.seq DESC
             LIMIT ? OFFSET ?"
        ))?;
        let records: rusqlite::Result<Vec<IssuerRecord>> = stmt
            .query_map(
                params![status.as_str(), limit, offset],
                Self::row_to_record,
            )?
            .collect();
        Ok(records?)
    }

    fn list_all(&self, limit: u32, offset: u32) -> StoreResult<Vec<IssuerRecord>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM issuers
             JOIN status_index ON status_index.address = issuers.address
             ORDER BY status_index.seq DESC
             LIMIT ? OFFSET ?"
        ))?;
        let records: rusqlite::Result<Vec<IssuerRecord>> = stmt
            .query_map(params![limit, offset], Self::row_to_record)?
            .collect();
        Ok(records?)
    }

    fn status_counts(&self) -> StoreResult<StatusCounts> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM status_index GROUP BY status")?;
        let mut counts = StatusCounts::default();
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count))
        })?;
        for row in rows {
            let (status, count) = row?;
            match IssuerStatus::parse(&status) {
                Some(IssuerStatus::Pending) => counts.pending = count as u64,
                Some(IssuerStatus::Approved) => counts.approved = count as u64,
                Some(IssuerStatus::Rejected) => counts.rejected = count as u64,
                None => {
                    return Err(StoreError::Corrupt(
                        "status_index".to_string(),
                        format!("status {status:?}"),
                    ))
                }
            }
        }
        Ok(counts)
    }

    fn cursor(&self) -> StoreResult<Option<u64>> {
        let conn = self.read_conn()?;
        let result: Option<i64> = conn
            .query_row(
                "SELECT CAST(value AS INTEGER) FROM metadata WHERE key = 'cursor'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result.map(|n| n as u64))
    }

    fn set_cursor(&self, height: u64) -> StoreResult<()> {
        let conn = self.writer.lock().unwrap();
        let current: Option<i64> = conn
            .query_row(
                "SELECT CAST(value AS INTEGER) FROM metadata WHERE key = 'cursor'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(current) = current {
            if height <= current as u64 {
                return Ok(());
            }
        }
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('cursor', ?)",
            params![height as i64],
        )?;
        Ok(())
    }

    fn reset(&self) -> StoreResult<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute_batch(
            "DELETE FROM status_index;
             DELETE FROM issuers;
             DELETE FROM metadata;",
        )?;
        tracing::info!("registry store reset");
        Ok(())
    }

    fn ping(&self) -> StoreResult<()> {
        let conn = self.read_conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}
