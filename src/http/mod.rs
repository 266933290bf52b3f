pub mod admin;
pub mod media;
pub mod public;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::http::state::AppState;

/// Header carrying a previously issued session token on access requests.
pub const SESSION_HEADER: &str = "x-session-token";

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/public/view/{link}", get(public::request_access))
        .route("/public/heartbeat", post(public::renew_session))
        .route("/public/leave", post(public::release_session))
        .route("/public/event", post(public::record_event))
        .route(
            "/public/media/{link}/{media_id}",
            get(media::serve_media_get).head(media::serve_media_head),
        );

    if state.admin_token.is_some() {
        router = router
            .route("/admin/links", get(admin::list_links).post(admin::create_link))
            .route("/admin/links/{link}", axum::routing::delete(admin::delete_link))
            .route("/admin/links/{link}/invalidate", post(admin::invalidate_link))
            .route("/admin/links/{link}/stats", get(admin::link_stats));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
