use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, info};
use url::Url;

use circle_types::api::{AuthResponse, Credentials, Session};
use circle_types::{Filter, Query, Row, Table};

use crate::realtime;
use crate::{Backend, BackendError, Result, Subscription};

/// Client for the hosted backend-as-a-service (REST tables, auth, storage,
/// realtime websocket).
pub struct RestBackend {
    client: Client,
    base_url: Url,
    anon_key: String,
    session: RwLock<Option<Session>>,
}

impl RestBackend {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        // `Url::join` drops the last path segment unless the base ends in '/'
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');

        Ok(Self {
            client: Client::new(),
            base_url: Url::parse(&base)?,
            anon_key: anon_key.to_string(),
            session: RwLock::new(None),
        })
    }

    fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    fn store_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token().unwrap_or_else(|| self.anon_key.clone());
        req.header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    /// `{base}/rest/v1/{table}?select=*&col=op.value&order=..&limit=..`
    pub fn table_url(&self, table: Table, query: &Query) -> Result<Url> {
        let mut url = self.base_url.join(&format!("rest/v1/{}", table))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            for filter in &query.filters {
                pairs.append_pair(&filter.column, &filter.rest_value());
            }
            if let Some(order) = &query.order {
                let dir = if order.ascending { "asc" } else { "desc" };
                pairs.append_pair("order", &format!("{}.{}", order.column, dir));
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> Result<Url> {
        Ok(self
            .base_url
            .join(&format!("storage/v1/object/public/{}/{}", bucket, path))?)
    }

    pub fn realtime_url(&self) -> Result<Url> {
        let mut url = self.base_url.join("realtime/v1/websocket")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| BackendError::Realtime(format!("cannot derive websocket URL from {}", self.base_url)))?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }

    async fn rows(&self, req: RequestBuilder) -> Result<Vec<Row>> {
        let resp = check(self.authorize(req).send().await?).await?;
        Ok(resp.json::<Vec<Row>>().await?)
    }

    async fn authenticate(&self, url: Url, credentials: &Credentials) -> Result<Session> {
        let resp = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(credentials)
            .send()
            .await?;
        let resp = check(resp).await.map_err(|e| match e {
            BackendError::Status { status, body } if status == 400 || status == 401 => {
                BackendError::Auth(body)
            }
            other => other,
        })?;

        let value: serde_json::Value = resp.json().await?;
        if value.get("access_token").is_none() {
            return Err(BackendError::Auth(
                "no session returned; the address may need confirming first".into(),
            ));
        }
        let auth: AuthResponse = serde_json::from_value(value)?;
        let session = Session {
            expires_at: auth
                .expires_in
                .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs)),
            access_token: auth.access_token,
            refresh_token: auth.refresh_token,
            user_id: auth.user.id,
            email: auth.user.email.unwrap_or_else(|| credentials.email.clone()),
        };

        self.store_session(Some(session.clone()));
        info!("Signed in as {}", session.email);
        Ok(session)
    }
}

async fn check(resp: Response) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(BackendError::Status { status, body })
}

#[async_trait]
impl Backend for RestBackend {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        let url = self.table_url(table, query)?;
        debug!("GET {}", url);
        self.rows(self.client.get(url)).await
    }

    async fn insert(&self, table: Table, row: Row) -> Result<Row> {
        let url = self.table_url(table, &Query::new())?;
        debug!("POST {}", url);
        let req = self
            .client
            .post(url)
            .header("Prefer", "return=representation")
            .json(&row);
        self.rows(req).await?.into_iter().next().ok_or(BackendError::NotFound)
    }

    async fn update(&self, table: Table, query: &Query, patch: Row) -> Result<Vec<Row>> {
        let url = self.table_url(table, query)?;
        debug!("PATCH {}", url);
        let req = self
            .client
            .patch(url)
            .header("Prefer", "return=representation")
            .json(&patch);
        self.rows(req).await
    }

    async fn delete(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        let url = self.table_url(table, query)?;
        debug!("DELETE {}", url);
        let req = self
            .client
            .delete(url)
            .header("Prefer", "return=representation");
        self.rows(req).await
    }

    async fn subscribe(&self, table: Table, filter: Option<Filter>) -> Result<Subscription> {
        let url = self.realtime_url()?;
        let join = realtime::join_message(table, filter.as_ref(), self.access_token().as_deref());
        realtime::open(url, join, table).await
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Session> {
        let url = self.base_url.join("auth/v1/signup")?;
        self.authenticate(url, credentials).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let mut url = self.base_url.join("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        self.authenticate(url, credentials).await
    }

    async fn sign_out(&self) -> Result<()> {
        if self.access_token().is_some() {
            let url = self.base_url.join("auth/v1/logout")?;
            let resp = self.authorize(self.client.post(url)).send().await?;
            check(resp).await?;
        }
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
        let url = self
            .base_url
            .join(&format!("storage/v1/object/{}/{}", bucket, path))?;
        debug!("POST {} ({} bytes)", url, data.len());
        let req = self
            .client
            .post(url)
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(data);
        check(self.authorize(req).send().await?).await?;
        Ok(self.public_url(bucket, path)?.to_string())
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Bytes> {
        let url = self.public_url(bucket, path)?;
        let resp = check(self.authorize(self.client.get(url)).send().await?).await?;
        Ok(resp.bytes().await?)
    }
}
