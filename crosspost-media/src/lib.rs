//! Serves uploaded media under a stable public URL (spec.md §2
//! PublicMediaServer, §6 `GET /media/{path}`). Some providers fetch the
//! media URL themselves, so the path has to resolve to a real HTTPS
//! endpoint rather than a signed, expiring one.
//!
//! Upload and object-storage integration are out of scope (spec.md §2
//! Non-goals): this crate only serves whatever `root` already contains.

use axum::Router;
use std::path::PathBuf;
use tower_http::services::ServeDir;

/// Build the `/media` sub-router, backed by `root` on disk. Generic over
/// the application's state type so it nests directly into any Axum
/// `Router<S>` without forcing `S = ()`.
pub fn media_router<S>(root: impl Into<PathBuf>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().nest_service("/media", ServeDir::new(root.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn serves_a_file_under_the_configured_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"bytes").unwrap();

        let app: Router = media_router(dir.path());
        let response = app
            .oneshot(Request::builder().uri("/media/a.jpg").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = http_body_util::BodyExt::collect(response.into_body()).await.unwrap().to_bytes();
        assert_eq!(&body[..], b"bytes");
    }

    #[tokio::test]
    async fn returns_404_for_a_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let app: Router = media_router(dir.path());
        let response = app
            .oneshot(Request::builder().uri("/media/missing.jpg").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
