//! HTTP surface and component wiring for the crosspost publishing core
//! (spec.md §6). `build_router` assembles the plain Axum `Router` +
//! `async fn` handlers the redesign flag calls for (no declarative
//! controller macro); `main.rs` does the actual component construction and
//! process wiring.

pub mod handlers;
pub mod models;
pub mod state;

use axum::routing::{delete, get, post};
use axum::Router;
use state::AppState;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let media_root = state.media_root.clone();

    let api: Router<AppState> = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/social-posts/publish-async/user/{user_id}",
            post(handlers::posts::publish_async),
        )
        .route(
            "/api/social-posts/publish-jobs/{job_id}",
            get(handlers::jobs::get_job),
        )
        .route(
            "/api/social-posts/publish/user/{user_id}",
            post(handlers::posts::publish_inline),
        )
        .route(
            "/api/posts/{post_id}/publish-now/user/{user_id}",
            post(handlers::posts::publish_post_now),
        )
        .route(
            "/api/posts/user/{user_id}",
            get(handlers::posts::list_posts).post(handlers::posts::create_post),
        )
        .route(
            "/api/posts/user/{user_id}/{post_id}",
            get(handlers::posts::get_post).delete(handlers::posts::delete_post),
        )
        .route(
            "/api/social-libraries/user/{user_id}",
            get(handlers::libraries::list_library_items),
        )
        .route(
            "/api/social-libraries/user/{user_id}/{item_id}",
            delete(handlers::libraries::delete_library_item),
        )
        .route("/api/events/ws", get(handlers::ws::ws_events));

    api.merge(crosspost_media::media_router::<AppState>(media_root))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
