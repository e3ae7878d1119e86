//! Pinterest API v5 adapter — pins to the user's default board.

use crate::{AdapterError, Credentials, ImportedItem, ProviderAdapter, PublishRequest};
use async_trait::async_trait;
use crosspost_core::{Provider, TargetResult};
use crosspost_governor::RateGovernor;
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const BASE_URL: &str = "https://api.pinterest.com/v5";
const TARGET_KEY: &str = "pinterest";

pub struct PinterestAdapter {
    client: reqwest::Client,
}

impl PinterestAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn access_token(credentials: &Credentials) -> Result<&str, AdapterError> {
        credentials
            .token
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Permanent("missing pinterest access_token".into()))
    }

    fn board_id(credentials: &Credentials) -> Result<&str, AdapterError> {
        credentials
            .token
            .get("board_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Permanent("missing pinterest board_id".into()))
    }
}

#[async_trait]
impl ProviderAdapter for PinterestAdapter {
    fn provider(&self) -> Provider {
        Provider::Pinterest
    }

    async fn publish(
        &self,
        credentials: &Credentials,
        request: &PublishRequest,
        _cancel: &CancellationToken,
    ) -> Result<HashMap<String, TargetResult>, AdapterError> {
        let token = Self::access_token(credentials)?;
        let board_id = Self::board_id(credentials)?;
        let media_url = request
            .media
            .first()
            .ok_or_else(|| AdapterError::Permanent("pinterest requires an image".into()))?;
        let started = Instant::now();

        let response: serde_json::Value = self
            .client
            .post(format!("{BASE_URL}/pins"))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "board_id": board_id,
                "description": request.caption,
                "media_source": { "source_type": "image_url", "url": media_url },
            }))
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::from)?
            .json()
            .await?;

        let pin_id = response
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Transient("pinterest response missing pin id".into()))?
            .to_string();
        let permalink = format!("https://www.pinterest.com/pin/{pin_id}/");

        let mut results = HashMap::new();
        results.insert(
            TARGET_KEY.to_string(),
            TargetResult::ok(pin_id, Some(permalink), started.elapsed().as_millis() as u64),
        );
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
            .acquire(Provider::Pinterest, cancel)
            .await
            .map_err(|_| AdapterError::Transient("canceled while acquiring rate limit".into()))?;

        let body: serde_json::Value = self
            .client
            .get(format!("{BASE_URL}/pins"))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::from)?
            .json()
            .await?;

        let items = body.get("items").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let external_id = item.get("id")?.as_str()?.to_string();
                Some(ImportedItem {
                    external_id,
                    content_type: "image".to_string(),
                    title: item.get("title").and_then(|v| v.as_str()).map(str::to_string),
                    permalink_url: item.get("link").and_then(|v| v.as_str()).map(str::to_string),
                    media_url: item
                        .pointer("/media/images/originals/url")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    thumbnail_url: None,
                    posted_at: item
                        .get("created_at")
                        .and_then(|v| v.as_str())
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&chrono::Utc)),
                    views: None,
                    likes: None,
                    raw_payload: item,
                })
            })
            .collect())
    }
}
