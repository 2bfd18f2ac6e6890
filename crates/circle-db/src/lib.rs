//! Embedded backend: the same table, auth, storage and realtime contract as
//! the hosted service, kept in a single SQLite file (or in memory).
//!
//! Rows are stored as JSON documents per table so the client's records need
//! no schema here; filters and ordering run through `json_extract`.

pub mod auth;
mod backend;
pub mod hub;
pub mod migrations;
pub mod queries;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::info;

use circle_types::api::Session;

use crate::hub::Hub;

pub struct Database {
    conn: Mutex<Connection>,
    hub: Hub,
    jwt_secret: String,
    session: RwLock<Option<Session>>,
}

impl Database {
    pub fn open(path: &Path, jwt_secret: &str) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self::with_connection(conn, jwt_secret))
    }

    pub fn open_in_memory(jwt_secret: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self::with_connection(conn, jwt_secret))
    }

    fn with_connection(conn: Connection, jwt_secret: &str) -> Self {
        Self {
            conn: Mutex::new(conn),
            hub: Hub::new(),
            jwt_secret: jwt_secret.to_string(),
            session: RwLock::new(None),
        }
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// The session most recently signed in or installed, if any.
    pub fn current_session(&self) -> Option<Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn store_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }
}
