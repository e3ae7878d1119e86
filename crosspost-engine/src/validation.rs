//! Publish-request validation (spec.md §4.4 `enqueue`). Runs before a job
//! is ever persisted — nothing here touches the Store except to check a
//! `SocialConnection` exists.

use crosspost_core::{AppError, Clock, ErrorKind, Provider};
use crosspost_providers::ProviderRegistry;
use crosspost_store::model::PublishRequest;
use crosspost_store::Store;
use uuid::Uuid;

pub async fn validate(
    registry: &ProviderRegistry,
    store: &dyn Store,
    clock: &dyn Clock,
    user_id: Uuid,
    request: &PublishRequest,
) -> Result<(), AppError> {
    if request.providers.is_empty() {
        return Err(AppError::validation("providers must not be empty"));
    }

    for provider in &request.providers {
        if registry.get(*provider).is_none() {
            return Err(
                AppError::new(ErrorKind::UnsupportedProvider, format!("{provider} is not supported"))
                    .with_details(serde_json::json!({ "provider": provider.as_str() })),
            );
        }
    }

    let captionless_ok = request.providers.iter().all(|p| p.allows_captionless());
    if request.caption.as_deref().map(str::trim).unwrap_or("").is_empty() && !captionless_ok {
        return Err(AppError::validation("caption is required for the selected providers"));
    }

    for provider in &request.providers {
        if provider.requires_media() && request.media.is_empty() {
            return Err(
                AppError::new(ErrorKind::MediaRequired, format!("{provider} requires at least one media item"))
                    .with_details(serde_json::json!({ "provider": provider.as_str() })),
            );
        }
        if provider.requires_video() && !has_video(&request.media) {
            return Err(
                AppError::new(ErrorKind::MediaRequired, format!("{provider} requires a video"))
                    .with_details(serde_json::json!({ "provider": provider.as_str() })),
            );
        }
    }

    for provider in &request.providers {
        check_connected(store, clock, user_id, *provider).await?;
    }

    Ok(())
}

/// Heuristic: a video URL by file extension. Real content-type sniffing
/// would need to fetch the asset; the media pipeline that accepts the
/// upload is responsible for only ever producing urls this recognizes.
fn has_video(media: &[String]) -> bool {
    const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".webm", ".m4v"];
    media.iter().any(|url| VIDEO_EXTENSIONS.iter().any(|ext| url.to_lowercase().ends_with(ext)))
}

async fn check_connected(store: &dyn Store, clock: &dyn Clock, user_id: Uuid, provider: Provider) -> Result<(), AppError> {
    let connection = store.get_connection(user_id, provider).await?;
    match connection {
        Some(conn) if !conn.is_expired(clock.now()) => Ok(()),
        Some(_) => Err(
            AppError::new(ErrorKind::NotConnected, format!("{provider} connection has expired"))
                .with_details(serde_json::json!({ "provider": provider.as_str() })),
        ),
        None => Err(
            AppError::new(ErrorKind::NotConnected, format!("{provider} is not connected"))
                .with_details(serde_json::json!({ "provider": provider.as_str() })),
        ),
    }
}
