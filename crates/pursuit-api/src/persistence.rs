use std::path::Path;

use contracts::{AccountRecord, ParticipantId, Role, TimestampMs, DEFAULT_LOCALE};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("malformed account row: {0}")]
    MalformedRow(String),
    #[error("account store is not attached")]
    NotAttached,
}

/// Result of a startup load. Rows that could not be decoded are counted and
/// left in the table untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountLoad {
    pub records: Vec<AccountRecord>,
    pub skipped: usize,
}

#[derive(Debug)]
struct RawAccountRow {
    id: String,
    display_name: String,
    balance: i64,
    role: String,
    locale: String,
}

#[derive(Debug)]
pub struct SqliteAccountStore {
    conn: Connection,
}

impl SqliteAccountStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn load_all(&self) -> Result<AccountLoad, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, display_name, balance, role, locale
             FROM accounts
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawAccountRow {
                id: row.get(0)?,
                display_name: row.get(1)?,
                balance: row.get(2)?,
                role: row.get(3)?,
                locale: row.get(4)?,
            })
        })?;

        let mut load = AccountLoad::default();
        for row in rows {
            match row.map_err(PersistenceError::from).and_then(decode_row) {
                Ok(record) => load.records.push(record),
                Err(err) => {
                    warn!(error = %err, "skipping malformed account row");
                    load.skipped += 1;
                }
            }
        }
        Ok(load)
    }

    pub fn load(&self, id: &ParticipantId) -> Result<Option<AccountRecord>, PersistenceError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, display_name, balance, role, locale
                 FROM accounts
                 WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(RawAccountRow {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        balance: row.get(2)?,
                        role: row.get(3)?,
                        locale: row.get(4)?,
                    })
                },
            )
            .optional()?;
        row.map(decode_row).transpose()
    }

    /// Upserts every record in one transaction.
    pub fn save_all<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a AccountRecord>,
        now: TimestampMs,
    ) -> Result<usize, PersistenceError> {
        let tx = self.conn.transaction()?;
        let mut saved = 0;
        for record in records {
            upsert_account(&tx, record, now)?;
            saved += 1;
        }
        tx.commit()?;
        Ok(saved)
    }

    pub fn save(&mut self, record: &AccountRecord, now: TimestampMs) -> Result<(), PersistenceError> {
        self.save_all([record], now).map(|_| ())
    }

    pub fn count(&self) -> Result<u64, PersistenceError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                balance INTEGER NOT NULL,
                role TEXT NOT NULL,
                locale TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name) VALUES(1, 'accounts_v1')",
            [],
        )?;
        Ok(())
    }
}

fn decode_row(row: RawAccountRow) -> Result<AccountRecord, PersistenceError> {
    if row.id.trim().is_empty() {
        return Err(PersistenceError::MalformedRow("empty id".to_string()));
    }
    let balance = u64::try_from(row.balance).map_err(|_| {
        PersistenceError::MalformedRow(format!("{} has a negative balance", row.id))
    })?;
    let role = Role::parse(&row.role).unwrap_or_else(|| {
        warn!(participant = %row.id, role = %row.role, "unknown stored role, using target");
        Role::Target
    });
    let locale = if row.locale.trim().is_empty() {
        DEFAULT_LOCALE.to_string()
    } else {
        row.locale
    };
    Ok(AccountRecord {
        id: ParticipantId::new(row.id),
        display_name: row.display_name,
        balance,
        role,
        locale,
    })
}

fn upsert_account(
    tx: &rusqlite::Transaction<'_>,
    record: &AccountRecord,
    now: TimestampMs,
) -> Result<(), PersistenceError> {
    tx.execute(
        "INSERT INTO accounts (id, display_name, balance, role, locale, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            display_name = excluded.display_name,
            balance = excluded.balance,
            role = excluded.role,
            locale = excluded.locale,
            updated_at = excluded.updated_at",
        params![
            record.id.as_str(),
            record.display_name.as_str(),
            i64::try_from(record.balance).unwrap_or(i64::MAX),
            record.role.as_str(),
            record.locale.as_str(),
            i64::try_from(now).unwrap_or(i64::MAX),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SqliteAccountStore {
        SqliteAccountStore::open(dir.path().join("accounts.sqlite")).expect("open store")
    }

    #[test]
    fn saved_accounts_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ana = AccountRecord::new(ParticipantId::from("ana"), "Ana", 120);
        ana.role = Role::Pursuer;
        ana.locale = "de".to_string();
        {
            let mut store = store_in(&dir);
            store.save(&ana, 1).expect("save");
            ana.balance = 150;
            store.save(&ana, 2).expect("save again");
        }

        let store = store_in(&dir);
        let load = store.load_all().expect("load");
        assert_eq!(load.skipped, 0);
        assert_eq!(load.records, vec![ana.clone()]);
        assert_eq!(store.load(&ana.id).expect("load one"), Some(ana));
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn malformed_rows_are_skipped_and_unknown_roles_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        store
            .conn
            .execute_batch(
                "
                INSERT INTO accounts VALUES ('ok', 'Ok', 10, 'police', 'en', 0);
                INSERT INTO accounts VALUES ('neg', 'Neg', -5, 'target', 'en', 0);
                INSERT INTO accounts VALUES ('text', 'Text', 'lots', 'target', 'en', 0);
                INSERT INTO accounts VALUES ('odd', 'Odd', 7, 'pilot', '', 0);
                INSERT INTO accounts VALUES ('  ', 'Blank', 7, 'target', 'en', 0);
                ",
            )
            .expect("seed rows");

        let load = store.load_all().expect("load");
        assert_eq!(load.skipped, 3);
        let ids = load
            .records
            .iter()
            .map(|record| record.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["odd", "ok"]);
        assert_eq!(load.records[0].role, Role::Target);
        assert_eq!(load.records[0].locale, DEFAULT_LOCALE);
        assert_eq!(load.records[1].role, Role::Pursuer);
    }
}
