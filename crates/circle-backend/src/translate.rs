use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use circle_types::api::{TranslateRequest, TranslateResponse};

use crate::{BackendError, Result};

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into the `target` language code (e.g. "es").
    async fn translate(&self, text: &str, target: &str) -> Result<String>;
}

/// Translation over a LibreTranslate-style `POST /translate` endpoint.
pub struct HttpTranslator {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpTranslator {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            endpoint: Url::parse(endpoint)?,
            api_key,
        })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<String> {
        let body = TranslateRequest {
            q: text,
            source: "auto",
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let out: TranslateResponse = resp.json().await?;
        Ok(out.translated_text)
    }
}
