use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use circle_types::api::PushMessage;

use crate::{BackendError, Result};

/// Third-party relay that delivers push notifications to device tokens.
#[async_trait]
pub trait PushRelay: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<()>;
}

pub struct HttpPushRelay {
    client: Client,
    endpoint: Url,
}

impl HttpPushRelay {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            endpoint: Url::parse(endpoint)?,
        })
    }
}

#[async_trait]
impl PushRelay for HttpPushRelay {
    async fn send(&self, message: &PushMessage) -> Result<()> {
        debug!("Push to {}: {}", message.token, message.title);
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(message)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }
        Ok(())
    }
}
