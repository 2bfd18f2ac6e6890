use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use circle_backend::{Backend, BackendError, Result, Subscription};
use circle_types::api::{Credentials, Session};
use circle_types::events::ChangeEvent;
use circle_types::{Filter, Query, Row, Table};

use crate::Database;

/// Scheme of public URLs handed out for embedded objects.
pub const LOCAL_URL_SCHEME: &str = "circle-local";

#[async_trait]
impl Backend for Database {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        Ok(self.select_rows(table, query)?)
    }

    async fn insert(&self, table: Table, row: Row) -> Result<Row> {
        let stored = self.insert_row(table, row)?;
        debug!("Inserted into {}", table);
        self.hub().publish(ChangeEvent::insert(table, stored.clone()));
        Ok(stored)
    }

    async fn update(&self, table: Table, query: &Query, patch: Row) -> Result<Vec<Row>> {
        let changed = self.update_rows(table, query, &patch)?;
        let mut out = Vec::with_capacity(changed.len());
        for (before, after) in changed {
            self.hub().publish(ChangeEvent::update(table, after.clone(), before));
            out.push(after);
        }
        Ok(out)
    }

    async fn delete(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        let removed = self.delete_rows(table, query)?;
        for row in &removed {
            self.hub().publish(ChangeEvent::delete(table, row.clone()));
        }
        Ok(removed)
    }

    async fn subscribe(&self, table: Table, filter: Option<Filter>) -> Result<Subscription> {
        Ok(self.hub().subscribe(table, filter))
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Session> {
        self.register(credentials)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        self.login(credentials)
    }

    async fn sign_out(&self) -> Result<()> {
        self.store_session(None);
        Ok(())
    }

    async fn set_session(&self, session: Option<&Session>) {
        self.store_session(session.cloned());
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<String> {
        self.put_object(bucket, path, content_type, &data)?;
        Ok(format!("{}://{}/{}", LOCAL_URL_SCHEME, bucket, path))
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Bytes> {
        self.get_object(bucket, path)?
            .map(Bytes::from)
            .ok_or(BackendError::NotFound)
    }
}
