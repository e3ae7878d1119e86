//! X (Twitter) API v2 adapter. Text-only posts are allowed; a media url is
//! attached via a pre-uploaded media id the caller is expected to have
//! resolved into `options.media_id` (the v2 media upload endpoint is a
//! separate, non-JSON multipart flow out of scope for this adapter).

use crate::{AdapterError, Credentials, ProviderAdapter, PublishRequest};
use async_trait::async_trait;
use crosspost_core::{Provider, TargetResult};
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const BASE_URL: &str = "https://api.twitter.com/2";
const TARGET_KEY: &str = "x";

pub struct XAdapter {
    client: reqwest::Client,
}

impl XAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for XAdapter {
    fn provider(&self) -> Provider {
        Provider::X
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
            .ok_or_else(|| AdapterError::Permanent("missing x access_token".into()))?;
        let started = Instant::now();

        let mut body = serde_json::json!({ "text": request.caption.clone().unwrap_or_default() });
        if let Some(media_id) = request.options.as_ref().and_then(|o| o.get("media_id")).and_then(|v| v.as_str()) {
            body["media"] = serde_json::json!({ "media_ids": [media_id] });
        }

        let response: serde_json::Value = self
            .client
            .post(format!("{BASE_URL}/tweets"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::from)?
            .json()
            .await?;

        let tweet_id = response
            .pointer("/data/id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Transient("x response missing tweet id".into()))?
            .to_string();
        let permalink = format!("https://x.com/i/status/{tweet_id}");

        let mut results = HashMap::new();
        results.insert(
            TARGET_KEY.to_string(),
            TargetResult::ok(tweet_id, Some(permalink), started.elapsed().as_millis() as u64),
        );
        Ok(results)
    }
}
