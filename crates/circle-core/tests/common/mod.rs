#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};

use circle_backend::{Backend, BackendError, PushRelay, Result, Subscription, Translator};
use circle_core::matching::{self, JoinOutcome};
use circle_core::{AppContext, Settings, auth};
use circle_db::Database;
use circle_types::api::{Credentials, PushMessage, Session};
use circle_types::models::Group;
use circle_types::{Filter, Query, Row, Table};

pub fn database() -> Arc<Database> {
    Arc::new(Database::open_in_memory("test-secret").unwrap())
}

pub fn settings(group_size: usize) -> Settings {
    Settings {
        group_size,
        poll_interval: Duration::from_millis(5),
        poll_attempts: 3,
        ..Settings::default()
    }
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

pub async fn signed_up(backend: Arc<dyn Backend>, email: &str, settings: Settings) -> AppContext {
    let ctx = AppContext::builder(backend).settings(settings).build();
    auth::sign_up(
        &ctx,
        &Credentials {
            email: email.into(),
            password: "correct horse".into(),
        },
    )
    .await
    .unwrap();
    ctx
}

/// Give a user a personality without going through the quiz.
pub async fn set_personality(db: &Database, ctx: &AppContext, kind: &str) {
    let id = ctx.user_id().unwrap();
    db.update(
        Table::Users,
        &Query::new().eq("id", id.to_string()),
        row(json!({ "personality_type": kind })),
    )
    .await
    .unwrap();
}

/// Sign up `n` users on `backend` and match them into one group.
pub async fn group_of(db: &Arc<Database>, backend: Arc<dyn Backend>, n: usize) -> (Vec<AppContext>, Group) {
    let mut members = Vec::new();
    let mut formed = None;
    for i in 0..n {
        let ctx = signed_up(backend.clone(), &format!("member{}@example.com", i), settings(n)).await;
        set_personality(db, &ctx, "Explorer").await;
        if let JoinOutcome::Joined(group) = matching::join_group(&ctx).await.unwrap() {
            formed = Some(group);
        }
        members.push(ctx);
    }
    (members, formed.expect("last join forms the group"))
}

/// Move a group's deadline into the past.
pub async fn expire(db: &Database, group: &Group) {
    let past = chrono::Utc::now() - chrono::Duration::hours(1);
    db.update(
        Table::Groups,
        &Query::new().eq("id", group.id.to_string()),
        row(json!({ "next_prompt_due": past })),
    )
    .await
    .unwrap();
}

/// Wraps the embedded backend and fails writes to chosen tables.
pub struct Flaky {
    pub inner: Arc<Database>,
    failing: Mutex<HashSet<Table>>,
    racing: Mutex<Option<Table>>,
}

impl Flaky {
    pub fn new(inner: Arc<Database>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            racing: Mutex::new(None),
        }
    }

    pub fn fail_writes(&self, table: Table) {
        self.failing.lock().unwrap().insert(table);
    }

    /// Just before the next delete on `table`, remove its oldest row the way
    /// a competing client would.
    pub fn race_next_delete(&self, table: Table) {
        *self.racing.lock().unwrap() = Some(table);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn check(&self, table: Table) -> Result<()> {
        if self.failing.lock().unwrap().contains(&table) {
            return Err(BackendError::Status {
                status: 503,
                body: "service unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for Flaky {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        self.inner.select(table, query).await
    }

    async fn insert(&self, table: Table, row: Row) -> Result<Row> {
        self.check(table)?;
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: Table, query: &Query, patch: Row) -> Result<Vec<Row>> {
        self.check(table)?;
        self.inner.update(table, query, patch).await
    }

    async fn delete(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        self.check(table)?;
        let racing = self.racing.lock().unwrap().take_if(|t| *t == table);
        if racing.is_some() {
            let oldest = self
                .inner
                .select(table, &Query::new().order("created_at", true).limit(1))
                .await?;
            if let Some(id) = oldest.first().and_then(|row| row.get("id")).and_then(Value::as_str) {
                self.inner.delete(table, &Query::new().eq("id", id)).await?;
            }
        }
        self.inner.delete(table, query).await
    }

    async fn subscribe(&self, table: Table, filter: Option<Filter>) -> Result<Subscription> {
        self.inner.subscribe(table, filter).await
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Session> {
        self.inner.sign_up(credentials).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        self.inner.sign_in(credentials).await
    }

    async fn sign_out(&self) -> Result<()> {
        self.inner.sign_out().await
    }

    async fn set_session(&self, session: Option<&Session>) {
        self.inner.set_session(session).await
    }

    async fn upload(&self, bucket: &str, path: &str, content_type: &str, data: Bytes) -> Result<String> {
        self.inner.upload(bucket, path, content_type, data).await
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Bytes> {
        self.inner.download(bucket, path).await
    }
}

/// Translator that upper-cases text and counts calls.
#[derive(Default)]
pub struct Shouting {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Translator for Shouting {
    async fn translate(&self, text: &str, target: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("[{}] {}", target, text.to_uppercase()))
    }
}

/// Push relay that records what it was asked to deliver.
#[derive(Default)]
pub struct Outbox {
    pub sent: Mutex<Vec<PushMessage>>,
}

#[async_trait]
impl PushRelay for Outbox {
    async fn send(&self, message: &PushMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
