//! TikTok Content Posting API adapter. Publishing a video is an async
//! "init then poll" flow on TikTok's side; we treat the init call's
//! `publish_id` as the canonical external id since the adapter's contract
//! is a best-effort single attempt, not a full poll loop (spec.md §4.2).

use crate::{AdapterError, Credentials, ImportedItem, ProviderAdapter, PublishRequest};
use async_trait::async_trait;
use crosspost_core::{Provider, TargetResult};
use crosspost_governor::RateGovernor;
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const BASE_URL: &str = "https://open.tiktokapis.com/v2";
const TARGET_KEY: &str = "tiktok";

pub struct TiktokAdapter {
    client: reqwest::Client,
}

impl TiktokAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn access_token(credentials: &Credentials) -> Result<&str, AdapterError> {
        credentials
            .token
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Permanent("missing tiktok access_token".into()))
    }
}

#[async_trait]
impl ProviderAdapter for TiktokAdapter {
    fn provider(&self) -> Provider {
        Provider::Tiktok
    }

    async fn publish(
        &self,
        credentials: &Credentials,
        request: &PublishRequest,
        _cancel: &CancellationToken,
    ) -> Result<HashMap<String, TargetResult>, AdapterError> {
        let token = Self::access_token(credentials)?;
        let video_url = request
            .media
            .first()
            .ok_or_else(|| AdapterError::Permanent("tiktok requires a video".into()))?;
        let started = Instant::now();

        let body: serde_json::Value = self
            .client
            .post(format!("{BASE_URL}/post/publish/video/init/"))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "post_info": { "title": request.caption },
                "source_info": { "source": "PULL_FROM_URL", "video_url": video_url },
            }))
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::from)?
            .json()
            .await?;

        let publish_id = body
            .get("data")
            .and_then(|d| d.get("publish_id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Transient("tiktok response missing publish_id".into()))?
            .to_string();

        let mut results = HashMap::new();
        results.insert(
            TARGET_KEY.to_string(),
            TargetResult::ok(publish_id, None, started.elapsed().as_millis() as u64),
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
            .acquire(Provider::Tiktok, cancel)
            .await
            .map_err(|_| AdapterError::Transient("canceled while acquiring rate limit".into()))?;

        let body: serde_json::Value = self
            .client
            .post(format!("{BASE_URL}/video/list/"))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "fields": ["id", "title", "cover_image_url", "share_url", "create_time", "like_count", "view_count"]
            }))
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::from)?
            .json()
            .await?;

        let items = body
            .get("data")
            .and_then(|d| d.get("videos"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let external_id = item.get("id")?.as_str()?.to_string();
                Some(ImportedItem {
                    external_id,
                    content_type: "video".to_string(),
                    title: item.get("title").and_then(|v| v.as_str()).map(str::to_string),
                    permalink_url: item.get("share_url").and_then(|v| v.as_str()).map(str::to_string),
                    media_url: None,
                    thumbnail_url: item.get("cover_image_url").and_then(|v| v.as_str()).map(str::to_string),
                    posted_at: item
                        .get("create_time")
                        .and_then(|v| v.as_i64())
                        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0)),
                    views: item.get("view_count").and_then(|v| v.as_i64()),
                    likes: item.get("like_count").and_then(|v| v.as_i64()),
                    raw_payload: item,
                })
            })
            .collect())
    }
}
