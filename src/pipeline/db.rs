//! Holdings store backed by SQLite
//!
//! One table of Holding rows keyed by token-account address, with `owner` and
//! `mint` indexed for the diff and duplicate queries. The store is only ever
//! touched from the single refresh worker, so a plain mutex around the
//! connection is enough.

use super::types::{Holding, MintOwnerPair};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Database(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Durable mapping from (owner, address) to holding record.
///
/// Contract notes:
/// - `upsert_all` is atomic per call: all rows become visible together.
/// - `delete_addresses` is scoped by owner and must not issue a query with an
///   empty predicate; an empty set is a no-op.
/// - `commit_snapshot` applies the removed/upserted sides of one wallet's
///   reconciliation; backends that support transactions must make it atomic.
/// - `clear_all` is reserved for the cold-start sweep, never incremental use.
#[async_trait]
pub trait HoldingsStore: Send + Sync {
    /// Token-account addresses currently on file for a wallet, in stable
    /// store order. The "before" side of a diff.
    async fn list_addresses(&self, owner: &str) -> Result<Vec<String>, StoreError>;

    /// Insert new rows and overwrite all mutable fields of existing ones,
    /// keyed by address.
    async fn upsert_all(&self, holdings: &[Holding]) -> Result<(), StoreError>;

    /// Remove exactly the given addresses scoped to `owner`.
    async fn delete_addresses(&self, owner: &str, addresses: &[String]) -> Result<(), StoreError>;

    /// Apply one reconciliation: delete `removed` (scoped to `owner`), then
    /// upsert `holdings`. Default is best-effort sequential; the SQLite
    /// backend overrides this with a single transaction.
    async fn commit_snapshot(
        &self,
        owner: &str,
        removed: &[String],
        holdings: &[Holding],
    ) -> Result<(), StoreError> {
        self.delete_addresses(owner, removed).await?;
        self.upsert_all(holdings).await
    }

    /// Every (mint, owner) pair where the mint appears under at least two
    /// distinct owners anywhere in the store.
    async fn find_duplicate_mint_owner_pairs(&self) -> Result<Vec<MintOwnerPair>, StoreError>;

    /// Empty the holdings table. Only valid before a first full sweep.
    async fn clear_all(&self) -> Result<(), StoreError>;
}

/// SQLite implementation of [`HoldingsStore`].
pub struct SqliteHoldingsStore {
    conn: Arc<Mutex<Connection>>,
}

const UPSERT_HOLDING_SQL: &str = "INSERT INTO holdings \
     (address, mint, owner, amount, delegated_amount, frozen) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
     ON CONFLICT(address) DO UPDATE SET \
         mint = excluded.mint, \
         owner = excluded.owner, \
         amount = excluded.amount, \
         delegated_amount = excluded.delegated_amount, \
         frozen = excluded.frozen";

impl SqliteHoldingsStore {
    /// Open (or create) the holdings database and ensure the schema exists.
    ///
    /// Schema creation is idempotent; WAL mode is enabled at open.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::ensure_schema(&conn)?;

        log::info!("✅ Holdings database initialized with WAL mode");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS holdings (
                address TEXT NOT NULL PRIMARY KEY,
                mint TEXT NOT NULL,
                owner TEXT NOT NULL,
                amount INTEGER NOT NULL,
                delegated_amount INTEGER NOT NULL,
                frozen INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_holdings_owner ON holdings(owner)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_holdings_mint ON holdings(mint)",
            [],
        )?;
        Ok(())
    }

    fn upsert_in_tx(tx: &rusqlite::Transaction<'_>, holdings: &[Holding]) -> Result<(), StoreError> {
        for holding in holdings {
            tx.execute(
                UPSERT_HOLDING_SQL,
                params![
                    holding.address,
                    holding.mint,
                    holding.owner,
                    holding.amount,
                    holding.delegated_amount,
                    holding.frozen,
                ],
            )?;
        }
        Ok(())
    }

    fn delete_in_tx(
        tx: &rusqlite::Transaction<'_>,
        owner: &str,
        addresses: &[String],
    ) -> Result<(), StoreError> {
        // Never issue a DELETE with an empty IN () predicate.
        if addresses.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; addresses.len()].join(",");
        let sql = format!(
            "DELETE FROM holdings WHERE owner = ? AND address IN ({})",
            placeholders
        );

        let mut stmt = tx.prepare(&sql)?;
        let mut values: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(addresses.len() + 1);
        values.push(&owner);
        for address in addresses {
            values.push(address);
        }
        stmt.execute(values.as_slice())?;
        Ok(())
    }
}

#[async_trait]
impl HoldingsStore for SqliteHoldingsStore {
    async fn list_addresses(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT address FROM holdings WHERE owner = ?1 ORDER BY rowid ASC")?;
        let rows = stmt.query_map([owner], |row| row.get::<_, String>(0))?;

        let mut addresses = Vec::new();
        for row in rows {
            addresses.push(row?);
        }
        Ok(addresses)
    }

    async fn upsert_all(&self, holdings: &[Holding]) -> Result<(), StoreError> {
        if holdings.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::upsert_in_tx(&tx, holdings)?;
        tx.commit()?;
        Ok(())
    }

    async fn delete_addresses(&self, owner: &str, addresses: &[String]) -> Result<(), StoreError> {
        if addresses.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::delete_in_tx(&tx, owner, addresses)?;
        tx.commit()?;
        Ok(())
    }

    async fn commit_snapshot(
        &self,
        owner: &str,
        removed: &[String],
        holdings: &[Holding],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::delete_in_tx(&tx, owner, removed)?;
        Self::upsert_in_tx(&tx, holdings)?;
        tx.commit()?;
        Ok(())
    }

    async fn find_duplicate_mint_owner_pairs(&self) -> Result<Vec<MintOwnerPair>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT mint, owner
             FROM holdings
             WHERE mint IN (
                 SELECT mint
                 FROM holdings
                 GROUP BY mint
                 HAVING COUNT(DISTINCT owner) >= 2
             )
             ORDER BY rowid ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(MintOwnerPair {
                mint: row.get(0)?,
                owner: row.get(1)?,
            })
        })?;

        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row?);
        }
        Ok(pairs)
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM holdings", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_holding(address: &str, mint: &str, owner: &str, amount: u64) -> Holding {
        Holding {
            address: address.to_string(),
            mint: mint.to_string(),
            owner: owner.to_string(),
            amount,
            delegated_amount: 0,
            frozen: false,
        }
    }

    fn open_test_store() -> (tempfile::TempDir, SqliteHoldingsStore) {
        let dir = tempdir().unwrap();
        let store = SqliteHoldingsStore::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_upsert_and_list_scoped_by_owner() {
        let (_dir, store) = open_test_store();

        store
            .upsert_all(&[
                make_holding("acc1", "mintA", "walletX", 10),
                make_holding("acc2", "mintB", "walletX", 20),
                make_holding("acc3", "mintA", "walletY", 30),
            ])
            .await
            .unwrap();

        let x = store.list_addresses("walletX").await.unwrap();
        assert_eq!(x, vec!["acc1".to_string(), "acc2".to_string()]);

        let y = store.list_addresses("walletY").await.unwrap();
        assert_eq!(y, vec!["acc3".to_string()]);

        let none = store.list_addresses("walletZ").await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_mutable_fields() {
        let (_dir, store) = open_test_store();

        store
            .upsert_all(&[make_holding("acc1", "mintA", "walletX", 10)])
            .await
            .unwrap();

        let mut updated = make_holding("acc1", "mintA", "walletX", 99);
        updated.delegated_amount = 5;
        updated.frozen = true;
        store.upsert_all(&[updated]).await.unwrap();

        let conn = store.conn.lock().unwrap();
        let (amount, delegated, frozen): (u64, u64, bool) = conn
            .query_row(
                "SELECT amount, delegated_amount, frozen FROM holdings WHERE address = ?1",
                ["acc1"],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();

        assert_eq!(amount, 99);
        assert_eq!(delegated, 5);
        assert!(frozen);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM holdings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_delete_addresses_scoped_to_owner() {
        let (_dir, store) = open_test_store();

        store
            .upsert_all(&[
                make_holding("acc1", "mintA", "walletX", 10),
                make_holding("acc2", "mintA", "walletY", 20),
            ])
            .await
            .unwrap();

        // acc2 belongs to walletY, so deleting it under walletX must not touch it.
        store
            .delete_addresses("walletX", &["acc1".to_string(), "acc2".to_string()])
            .await
            .unwrap();

        assert!(store.list_addresses("walletX").await.unwrap().is_empty());
        assert_eq!(
            store.list_addresses("walletY").await.unwrap(),
            vec!["acc2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_empty_set_is_noop() {
        let (_dir, store) = open_test_store();

        store
            .upsert_all(&[make_holding("acc1", "mintA", "walletX", 10)])
            .await
            .unwrap();

        store.delete_addresses("walletX", &[]).await.unwrap();
        assert_eq!(store.list_addresses("walletX").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_snapshot_applies_both_sides() {
        let (_dir, store) = open_test_store();

        store
            .upsert_all(&[
                make_holding("acc1", "mintA", "walletX", 10),
                make_holding("acc2", "mintB", "walletX", 20),
            ])
            .await
            .unwrap();

        store
            .commit_snapshot(
                "walletX",
                &["acc1".to_string()],
                &[
                    make_holding("acc2", "mintB", "walletX", 25),
                    make_holding("acc3", "mintC", "walletX", 30),
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            store.list_addresses("walletX").await.unwrap(),
            vec!["acc2".to_string(), "acc3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_duplicate_pairs_require_distinct_owners() {
        let (_dir, store) = open_test_store();

        // mintA under two owners, mintB twice under the same owner.
        store
            .upsert_all(&[
                make_holding("acc1", "mintA", "walletX", 1),
                make_holding("acc2", "mintA", "walletY", 2),
                make_holding("acc3", "mintB", "walletX", 3),
                make_holding("acc4", "mintB", "walletX", 4),
            ])
            .await
            .unwrap();

        let pairs = store.find_duplicate_mint_owner_pairs().await.unwrap();

        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.mint == "mintA"));
        let owners: Vec<&str> = pairs.iter().map(|p| p.owner.as_str()).collect();
        assert_eq!(owners, vec!["walletX", "walletY"]);
    }

    #[tokio::test]
    async fn test_duplicate_pairs_empty_store() {
        let (_dir, store) = open_test_store();
        let pairs = store.find_duplicate_mint_owner_pairs().await.unwrap();
        assert!(pairs.is_empty());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (_dir, store) = open_test_store();

        store
            .upsert_all(&[
                make_holding("acc1", "mintA", "walletX", 1),
                make_holding("acc2", "mintB", "walletY", 2),
            ])
            .await
            .unwrap();

        store.clear_all().await.unwrap();

        assert!(store.list_addresses("walletX").await.unwrap().is_empty());
        assert!(store.list_addresses("walletY").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schema_is_idempotent_across_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let store = SqliteHoldingsStore::open(&path).unwrap();
            store
                .upsert_all(&[make_holding("acc1", "mintA", "walletX", 1)])
                .await
                .unwrap();
        }

        // Reopening must not wipe or re-create the table.
        let store = SqliteHoldingsStore::open(&path).unwrap();
        assert_eq!(store.list_addresses("walletX").await.unwrap().len(), 1);
    }
}
