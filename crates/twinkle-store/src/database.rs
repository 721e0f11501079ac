//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation. It also owns the sending
//! half of the change feed.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;
use tokio::sync::broadcast;
use twinkle_shared::constants::CHANGE_FEED_CAPACITY;

use crate::changes::ChangeEvent;
use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/twinkle/twinkle.db`
    /// - macOS:   `~/Library/Application Support/app.twinkle.twinkle/twinkle.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\twinkle\twinkle\data\twinkle.db`
    pub fn new() -> Result<Self> {
        let db_path = Self::default_path()?;

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Default database location, creating its directory if needed.
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("app", "twinkle", "twinkle").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Ok(data_dir.join("twinkle.db"))
    }

    /// Open (or create) a database at an explicit path.
    ///
    /// This is useful for tests and for sharing one file between the client
    /// core and the notification service.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database (tests, ephemeral sessions).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // Two processes may share the file; wait instead of failing on a lock.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        migrations::run_migrations(&conn)?;

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self { conn, changes })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    ///
    /// Callers should prefer the typed helpers, but direct access is
    /// occasionally needed for ad-hoc queries.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().filter(|p| !p.is_empty()).map(PathBuf::from)
    }

    /// Handle on the change feed; clone it once and subscribe without
    /// holding the database lock.
    pub fn change_feed(&self) -> broadcast::Sender<ChangeEvent> {
        self.changes.clone()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    /// Announce a committed write. Having no listeners is not an error.
    pub(crate) fn publish(&self, event: ChangeEvent) {
        tracing::trace!(?event, "publishing change");
        let _ = self.changes.send(event);
    }
}
