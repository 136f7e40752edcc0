//! tally-store — Embedded storage for the attendance kiosk.
//!
//! One SQLite database holds the face embedding gallery, the
//! processed-path enrollment ledger, the shift table, the attendance
//! log, and the identity roster. Writers serialize through a single
//! connection lock; the event rate is a few punches per minute.

pub mod attendance;
pub mod identity;
pub mod roster;
pub mod schema;
pub mod shift;

pub use attendance::AttendanceRecord;
pub use identity::ScanSummary;
pub use roster::RosterEntry;
pub use shift::{PunchOutcome, PunchStatus, PunchType, Shift};

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("enrollment source not found: {0}")]
    SourceMissing(PathBuf),
    #[error("embedding provider: {0}")]
    Provider(#[from] tally_core::ProviderError),
}

/// Handle to the kiosk database. Cheap to share behind an `Arc`;
/// all access serializes on the inner connection lock.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and ensure the schema.
    ///
    /// An unreadable database file is treated as data loss: the file is
    /// moved aside, a fresh empty store is created, and the next
    /// enrollment scan rebuilds from source. Never propagates corruption
    /// past this point.
    pub fn open(path: &Path) -> Result<Store, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match Self::try_open(path) {
            Ok(store) => Ok(store),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "database unreadable, resetting to empty"
                );
                let backup = path.with_extension("corrupt");
                let _ = std::fs::rename(path, &backup);
                Self::try_open(path)
            }
        }
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Store, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    fn try_open(path: &Path) -> Result<Store, StoreError> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means a panic mid-write elsewhere; propagating
        // the panic is the only sound option.
        self.conn.lock().expect("store lock poisoned")
    }
}

/// Default database location: `$XDG_DATA_HOME/tally/kiosk.db`
/// (or `~/.local/share/tally/kiosk.db`).
pub fn default_db_path() -> PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("tally");
    data_dir.join("kiosk.db")
}
