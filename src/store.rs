//! SQLite destination store.
//!
//! Layout under [`StoreConfig::root`]:
//!
//! - `<namespace>.sqlite`: one database per namespace, holding the uploaded
//!   tables. Every column is `TEXT`. The file runs in WAL mode, so catalog
//!   reads never wait on a load in progress.
//! - `_locks/<lock id as 16 hex digits>.lock.sqlite`: one empty database per
//!   resolution lock key. Holding the lock means holding a `BEGIN IMMEDIATE`
//!   transaction on that file, which excludes every other connection in every
//!   process until the transaction commits or rolls back.
//!
//! Connections are opened per operation; nothing about the catalog is cached.
//! Catalog reads never create a namespace file: a namespace without one simply
//! has no tables.
//!
//! SQLite allows one writer per file. Reserving a table is a write, so it waits
//! for a load running into the same namespace, bounded by the busy timeout and
//! reported as [`UploadError::LockTimeout`].

use std::{
    fs, io,
    path::PathBuf,
    time::{Duration, Instant},
};

use chrono::Utc;
use log::debug;
use rusqlite::{Connection, ErrorCode, OpenFlags, TransactionBehavior, params};

use crate::{
    catalog::{SchemaCatalog, TableReservations},
    columns::ColumnSet,
    config::StoreConfig,
    error::UploadError,
    ingest::{LoadSummary, Loader, WriteMode},
    lock::{AdvisoryLock, lock_id, lock_key},
    naming::Identifier,
    rows::RowResult,
};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    config: StoreConfig,
}

impl SqliteStore {
    pub fn open(config: StoreConfig) -> io::Result<Self> {
        fs::create_dir_all(config.locks_dir())?;
        Ok(Self { config })
    }

    pub fn namespace_path(&self, namespace: &Identifier) -> PathBuf {
        self.config.root.join(format!("{namespace}.sqlite"))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.config
            .locks_dir()
            .join(format!("{:016x}.lock.sqlite", lock_id(key) as u64))
    }

    fn connect(&self, path: PathBuf, flags: OpenFlags) -> rusqlite::Result<Connection> {
        let connection = Connection::open_with_flags(path, flags | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;
        connection.busy_timeout(self.config.busy_timeout)?;
        Ok(connection)
    }

    fn connect_lock(&self, key: &str) -> rusqlite::Result<Connection> {
        self.connect(
            self.lock_path(key),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
    }

    /// Write access to a namespace, creating its file on first use.
    fn connect_namespace(&self, namespace: &Identifier) -> rusqlite::Result<Connection> {
        let connection = self.connect(
            self.namespace_path(namespace),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        connection.execute_batch("PRAGMA journal_mode = WAL;")?;
        Ok(connection)
    }

    /// Catalog access to a namespace. `None` when the namespace has no file
    /// yet. A store root that is not a directory is an error, not an empty
    /// namespace.
    fn read_namespace(&self, namespace: &Identifier) -> rusqlite::Result<Option<Connection>> {
        if !self.config.root.is_dir() {
            return Err(rusqlite::Error::InvalidPath(self.config.root.clone()));
        }
        let path = self.namespace_path(namespace);
        if !path.is_file() {
            return Ok(None);
        }
        self.connect(path, OpenFlags::SQLITE_OPEN_READ_WRITE).map(Some)
    }

    /// Tables currently present in `namespace`, sorted by name.
    pub fn list_tables(&self, namespace: &Identifier) -> Result<Vec<String>, UploadError> {
        let catalog_err = |err| UploadError::catalog(namespace.as_str(), "*", err);
        let Some(connection) = self.read_namespace(namespace).map_err(catalog_err)? else {
            return Ok(Vec::new());
        };
        let mut stmt = connection
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
                 ORDER BY name",
            )
            .map_err(catalog_err)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(catalog_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(catalog_err)?;
        Ok(names)
    }

    pub fn row_count(&self, namespace: &Identifier, table: &Identifier) -> Result<u64, UploadError> {
        let catalog_err = |err| UploadError::catalog(namespace.as_str(), table.as_str(), err);
        let Some(connection) = self.read_namespace(namespace).map_err(catalog_err)? else {
            return Ok(0);
        };
        let count: i64 = connection
            .query_row(&format!("SELECT COUNT(*) FROM {}", quote(table.as_str())), [], |row| {
                row.get(0)
            })
            .map_err(catalog_err)?;
        Ok(count as u64)
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Column names as declared, in declaration order. SQLite resolves `table`
/// case-insensitively.
fn table_columns(connection: &Connection, table: &Identifier) -> rusqlite::Result<Vec<String>> {
    let mut stmt = connection.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let names = stmt
        .query_map(params![table.as_str()], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

impl SchemaCatalog for SqliteStore {
    fn has_table(&self, namespace: &Identifier, name: &Identifier) -> Result<bool, UploadError> {
        let catalog_err = |err| UploadError::catalog(namespace.as_str(), name.as_str(), err);
        let Some(connection) = self.read_namespace(namespace).map_err(catalog_err)? else {
            debug!("Catalog lookup {namespace}.{name}: namespace has no tables");
            return Ok(false);
        };
        let exists: bool = connection
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master \
                 WHERE type = 'table' AND name = ?1 COLLATE NOCASE)",
                params![name.as_str()],
                |row| row.get(0),
            )
            .map_err(catalog_err)?;
        debug!("Catalog lookup {namespace}.{name}: exists={exists}");
        Ok(exists)
    }

    fn columns_of(
        &self,
        namespace: &Identifier,
        name: &Identifier,
    ) -> Result<Vec<String>, UploadError> {
        let catalog_err = |err| UploadError::catalog(namespace.as_str(), name.as_str(), err);
        match self.read_namespace(namespace).map_err(catalog_err)? {
            Some(connection) => table_columns(&connection, name).map_err(catalog_err),
            None => Ok(Vec::new()),
        }
    }
}

impl TableReservations for SqliteStore {
    fn reserve_table(
        &self,
        namespace: &Identifier,
        name: &Identifier,
        columns: &ColumnSet,
    ) -> Result<(), UploadError> {
        let reserve_err = |err: rusqlite::Error| {
            if is_busy(&err) {
                UploadError::LockTimeout {
                    key: lock_key(namespace.as_str(), name.as_str()),
                    waited: self.config.busy_timeout,
                }
            } else {
                UploadError::catalog(namespace.as_str(), name.as_str(), err)
            }
        };
        let definitions = columns
            .iter()
            .map(|column| format!("{} TEXT", quote(column.as_str())))
            .collect::<Vec<_>>()
            .join(", ");
        // No IF NOT EXISTS: a clash with an unexpected table must fail loudly.
        let sql = format!("CREATE TABLE {} ({definitions})", quote(name.as_str()));
        let connection = self.connect_namespace(namespace).map_err(reserve_err)?;
        connection.execute_batch(&sql).map_err(reserve_err)?;
        debug!("Reserved {namespace}.{name} with {} column(s)", columns.len());
        Ok(())
    }
}

impl AdvisoryLock for SqliteStore {
    fn with_exclusive_lock<T, F>(&self, key: &str, body: F) -> Result<T, UploadError>
    where
        F: FnOnce() -> Result<T, UploadError>,
    {
        let timeout = self.config.busy_timeout;
        let lock_err = |err: rusqlite::Error| lock_failure(key, timeout, err);
        let mut connection = self.connect_lock(key).map_err(lock_err)?;

        let started = Instant::now();
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(lock_err)?;
        debug!(
            "Acquired lock '{key}' (id {}) after {} ms",
            lock_id(key),
            started.elapsed().as_millis()
        );

        // Dropping `tx` on the error path rolls back and releases the lock.
        let value = body()?;
        tx.commit().map_err(lock_err)?;
        debug!("Released lock '{key}'");
        Ok(value)
    }
}

fn lock_failure(key: &str, timeout: Duration, err: rusqlite::Error) -> UploadError {
    if is_busy(&err) {
        UploadError::LockTimeout {
            key: key.to_string(),
            waited: timeout,
        }
    } else {
        UploadError::LockUnavailable {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}

impl Loader for SqliteStore {
    fn load<I>(
        &self,
        namespace: &Identifier,
        table: &Identifier,
        mode: WriteMode,
        columns: &ColumnSet,
        rows: I,
    ) -> Result<LoadSummary, UploadError>
    where
        I: Iterator<Item = RowResult>,
    {
        let started = Instant::now();
        let load_err = |err: rusqlite::Error| UploadError::load(namespace.as_str(), table.as_str(), err.to_string());

        let mut connection = self.connect_namespace(namespace).map_err(load_err)?;
        if table_columns(&connection, table).map_err(load_err)?.is_empty() {
            return Err(UploadError::load(
                namespace.as_str(),
                table.as_str(),
                "table does not exist",
            ));
        }

        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(load_err)?;
        let rows_cleared = match mode {
            WriteMode::Replace => tx
                .execute(&format!("DELETE FROM {}", quote(table.as_str())), [])
                .map_err(load_err)? as u64,
            WriteMode::Append => 0,
        };

        let column_list = columns
            .iter()
            .map(|column| quote(column.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|idx| format!("?{idx}"))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
            quote(table.as_str())
        );

        let mut rows_loaded = 0u64;
        {
            let mut stmt = tx.prepare(&insert).map_err(load_err)?;
            for (idx, row) in rows.enumerate() {
                let row = row.map_err(|err| {
                    UploadError::load(
                        namespace.as_str(),
                        table.as_str(),
                        format!("reading data row {}: {err}", idx + 1),
                    )
                })?;
                stmt.execute(rusqlite::params_from_iter(row.iter()))
                    .map_err(load_err)?;
                rows_loaded += 1;
            }
        }
        tx.commit().map_err(load_err)?;

        Ok(LoadSummary {
            namespace: namespace.clone(),
            table: table.clone(),
            mode,
            rows_loaded,
            rows_cleared,
            completed_at: Utc::now(),
            elapsed: started.elapsed(),
        })
    }
}
