//! Facebook Graph API adapter. A single publish request fans out to every
//! connected Page — spec.md §4.2/§4.4 require one result entry per target,
//! keyed by a stable `providerTargetId` (here, the page id).

use crate::{AdapterError, Credentials, ProviderAdapter, PublishRequest};
use async_trait::async_trait;
use crosspost_core::{Provider, TargetResult};
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const BASE_URL: &str = "https://graph.facebook.com/v21.0";

#[derive(Debug, serde::Deserialize)]
struct Page {
    id: String,
    access_token: String,
}

pub struct FacebookAdapter {
    client: reqwest::Client,
}

impl FacebookAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn pages(credentials: &Credentials) -> Result<Vec<Page>, AdapterError> {
        let pages = credentials
            .token
            .get("pages")
            .cloned()
            .ok_or_else(|| AdapterError::Permanent("missing facebook pages".into()))?;
        serde_json::from_value(pages)
            .map_err(|e| AdapterError::Permanent(format!("malformed facebook page credentials: {e}")))
    }

    async fn publish_to_page(&self, page: &Page, request: &PublishRequest) -> Result<TargetResult, AdapterError> {
        let started = Instant::now();
        let url = format!("{BASE_URL}/{}/feed", page.id);
        let mut body = serde_json::json!({ "message": request.caption });
        if let Some(media_url) = request.media.first() {
            body["link"] = serde_json::Value::String(media_url.clone());
        }
        let response: serde_json::Value = self
            .client
            .post(&url)
            .bearer_auth(&page.access_token)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::from)?
            .json()
            .await?;
        let post_id = response
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Transient("facebook response missing post id".into()))?
            .to_string();
        let permalink = format!("https://www.facebook.com/{post_id}");
        Ok(TargetResult::ok(post_id, Some(permalink), started.elapsed().as_millis() as u64))
    }
}

#[async_trait]
impl ProviderAdapter for FacebookAdapter {
    fn provider(&self) -> Provider {
        Provider::Facebook
    }

    async fn publish(
        &self,
        credentials: &Credentials,
        request: &PublishRequest,
        _cancel: &CancellationToken,
    ) -> Result<HashMap<String, TargetResult>, AdapterError> {
        let pages = Self::pages(credentials)?;
        if pages.is_empty() {
            return Err(AdapterError::Permanent("no facebook pages connected".into()));
        }

        let mut results = HashMap::with_capacity(pages.len());
        for page in &pages {
            let target_key = format!("facebook:{}", page.id);
            let outcome = match self.publish_to_page(page, request).await {
                Ok(result) => result,
                Err(AdapterError::Transient(m)) => TargetResult::err(
                    crosspost_core::ResultError::new(crosspost_core::ErrorKind::ProviderError, m),
                    None,
                ),
                Err(AdapterError::Permanent(m)) => TargetResult::err(
                    crosspost_core::ResultError::new(crosspost_core::ErrorKind::ProviderError, m),
                    None,
                ),
                Err(AdapterError::Unsupported) => unreachable!("publish_to_page never returns Unsupported"),
            };
            results.insert(target_key, outcome);
        }
        Ok(results)
    }
}
