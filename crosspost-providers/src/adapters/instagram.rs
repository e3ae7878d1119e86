//! Instagram Graph API adapter. Publishing is two-step: create a media
//! container, then publish it — Instagram itself fetches the media URL, so
//! `crosspost-media`'s stable public URLs exist largely for this adapter's
//! benefit (spec.md §4 overview).

use crate::{AdapterError, Credentials, ImportedItem, ProviderAdapter, PublishRequest};
use async_trait::async_trait;
use crosspost_core::{Provider, TargetResult};
use crosspost_governor::RateGovernor;
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const BASE_URL: &str = "https://graph.instagram.com/v21.0";
const TARGET_KEY: &str = "instagram";

pub struct InstagramAdapter {
    client: reqwest::Client,
}

impl InstagramAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn access_token(credentials: &Credentials) -> Result<&str, AdapterError> {
        credentials
            .token
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Permanent("missing instagram access_token".into()))
    }
}

#[async_trait]
impl ProviderAdapter for InstagramAdapter {
    fn provider(&self) -> Provider {
        Provider::Instagram
    }

    async fn publish(
        &self,
        credentials: &Credentials,
        request: &PublishRequest,
        _cancel: &CancellationToken,
    ) -> Result<HashMap<String, TargetResult>, AdapterError> {
        let token = Self::access_token(credentials)?;
        let started = Instant::now();
        let media_url = request
            .media
            .first()
            .ok_or_else(|| AdapterError::Permanent("instagram requires at least one media item".into()))?;

        let container_url = format!("{BASE_URL}/{}/media", credentials.provider_account_id);
        let container: serde_json::Value = self
            .client
            .post(&container_url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "image_url": media_url,
                "caption": request.caption,
            }))
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::from)?
            .json()
            .await?;
        let creation_id = container
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Transient("instagram container response missing id".into()))?;

        let publish_url = format!("{BASE_URL}/{}/media_publish", credentials.provider_account_id);
        let published: serde_json::Value = self
            .client
            .post(&publish_url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "creation_id": creation_id }))
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::from)?
            .json()
            .await?;
        let media_id = published
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or(creation_id)
            .to_string();

        let latency_ms = started.elapsed().as_millis() as u64;
        let permalink = format!("https://www.instagram.com/p/{media_id}/");
        let mut results = HashMap::new();
        results.insert(TARGET_KEY.to_string(), TargetResult::ok(media_id, Some(permalink), latency_ms));
        Ok(results)
    }

    async fn import_recent(
        &self,
        credentials: &Credentials,
        governor: &RateGovernor,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImportedItem>, AdapterError> {
        let token = Self::access_token(credentials)?;
        governor
            .acquire(Provider::Instagram, cancel)
            .await
            .map_err(|_| AdapterError::Transient("canceled while acquiring rate limit".into()))?;

        let url = format!(
            "{BASE_URL}/{}/media?fields=id,caption,media_type,media_url,thumbnail_url,permalink,timestamp,like_count",
            credentials.provider_account_id
        );
        let body: serde_json::Value = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::from)?
            .json()
            .await?;

        let items = body.get("data").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let external_id = item.get("id")?.as_str()?.to_string();
                Some(ImportedItem {
                    external_id,
                    content_type: item
                        .get("media_type")
                        .and_then(|v| v.as_str())
                        .unwrap_or("IMAGE")
                        .to_lowercase(),
                    title: item.get("caption").and_then(|v| v.as_str()).map(str::to_string),
                    permalink_url: item.get("permalink").and_then(|v| v.as_str()).map(str::to_string),
                    media_url: item.get("media_url").and_then(|v| v.as_str()).map(str::to_string),
                    thumbnail_url: item.get("thumbnail_url").and_then(|v| v.as_str()).map(str::to_string),
                    posted_at: item
                        .get("timestamp")
                        .and_then(|v| v.as_str())
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&chrono::Utc)),
                    views: None,
                    likes: item.get("like_count").and_then(|v| v.as_i64()),
                    raw_payload: item,
                })
            })
            .collect())
    }
}
