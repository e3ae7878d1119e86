//! Threads API adapter. Text-only posts are allowed (spec.md §4.4 media
//! rules exempt Threads), same two-step container/publish flow as
//! Instagram since Threads shares Meta's container model.

use crate::{AdapterError, Credentials, ProviderAdapter, PublishRequest};
use async_trait::async_trait;
use crosspost_core::{Provider, TargetResult};
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const BASE_URL: &str = "https://graph.threads.net/v1.0";
const TARGET_KEY: &str = "threads";

pub struct ThreadsAdapter {
    client: reqwest::Client,
}

impl ThreadsAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for ThreadsAdapter {
    fn provider(&self) -> Provider {
        Provider::Threads
    }

    async fn publish(
        &self,
        credentials: &Credentials,
        request: &PublishRequest,
        _cancel: &CancellationToken,
    ) -> Result<HashMap<String, TargetResult>, AdapterError> {
        let token = credentials
            .token
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Permanent("missing threads access_token".into()))?;
        let started = Instant::now();

        let mut container_body = serde_json::json!({
            "media_type": if request.media.is_empty() { "TEXT" } else { "IMAGE" },
            "text": request.caption,
        });
        if let Some(media_url) = request.media.first() {
            container_body["image_url"] = serde_json::Value::String(media_url.clone());
        }

        let container: serde_json::Value = self
            .client
            .post(format!("{BASE_URL}/{}/threads", credentials.provider_account_id))
            .bearer_auth(token)
            .json(&container_body)
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::from)?
            .json()
            .await?;
        let creation_id = container
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Transient("threads container response missing id".into()))?;

        let published: serde_json::Value = self
            .client
            .post(format!("{BASE_URL}/{}/threads_publish", credentials.provider_account_id))
            .bearer_auth(token)
            .json(&serde_json::json!({ "creation_id": creation_id }))
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::from)?
            .json()
            .await?;
        let post_id = published
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or(creation_id)
            .to_string();

        let mut results = HashMap::new();
        results.insert(
            TARGET_KEY.to_string(),
            TargetResult::ok(post_id, None, started.elapsed().as_millis() as u64),
        );
        Ok(results)
    }
}
