/// Circle backend contract
///
/// The hosted backend-as-a-service is reached only through the `Backend`
/// trait: table CRUD, auth, object storage and realtime subscriptions.
/// `RestBackend` talks to the hosted provider; the embedded SQLite store in
/// `circle-db` implements the same trait for offline use and tests.

pub mod error;
pub mod push;
pub mod realtime;
pub mod records;
pub mod rest;
pub mod translate;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use circle_types::api::{Credentials, Session};
use circle_types::events::ChangeEvent;
use circle_types::{Filter, Query, Row, Table};

pub use error::{BackendError, Result};
pub use push::{HttpPushRelay, PushRelay};
pub use rest::RestBackend;
pub use translate::{HttpTranslator, Translator};

#[async_trait]
pub trait Backend: Send + Sync {
    // -- Tables --

    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>>;

    /// Insert one row and return it as stored, with server-assigned columns.
    async fn insert(&self, table: Table, row: Row) -> Result<Row>;

    /// Merge `patch` into every matching row. Returns the updated rows.
    async fn update(&self, table: Table, query: &Query, patch: Row) -> Result<Vec<Row>>;

    /// Delete every matching row. Returns the deleted rows.
    async fn delete(&self, table: Table, query: &Query) -> Result<Vec<Row>>;

    // -- Realtime --

    /// Subscribe to row changes on `table`, optionally narrowed by one filter.
    async fn subscribe(&self, table: Table, filter: Option<Filter>) -> Result<Subscription>;

    // -- Auth --

    async fn sign_up(&self, credentials: &Credentials) -> Result<Session>;

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session>;

    async fn sign_out(&self) -> Result<()>;

    /// Install a previously persisted session (or clear it with `None`).
    async fn set_session(&self, session: Option<&Session>);

    // -- Storage --

    /// Upload an object and return its public URL.
    async fn upload(&self, bucket: &str, path: &str, content_type: &str, data: Bytes)
    -> Result<String>;

    async fn download(&self, bucket: &str, path: &str) -> Result<Bytes>;
}

/// A live realtime subscription. Events arrive in delivery order; dropping
/// the subscription stops the background task feeding it.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<ChangeEvent>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Wait for the next change. `None` once the channel has closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Take a change that has already arrived, without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
