//! Link administration. Mounted only when an admin token is configured.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{CatalogError, ShareLink};
use crate::http::state::AppState;
use crate::lease::LinkToken;

#[derive(Debug, Serialize)]
pub struct LinkView {
    pub token: LinkToken,
    pub recipient: String,
    pub collection: String,
    pub created_at: DateTime<Utc>,
    /// Whether a viewer currently holds the link.
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub recipient: String,
    pub collection: String,
}

#[derive(Debug, Serialize)]
struct InvalidateResponse {
    invalidated: bool,
}

#[derive(Debug, Serialize)]
struct LinkStatsView {
    link: LinkToken,
    total_views: u64,
    total_plays: u64,
    last_active: Option<DateTime<Utc>>,
    media_stats: Vec<MediaPlays>,
}

#[derive(Debug, Serialize)]
struct MediaPlays {
    media_id: Uuid,
    /// `None` once the item is no longer in the link's collection.
    title: Option<String>,
    plays: u64,
}

fn is_authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.admin_token.as_deref() else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|presented| constant_time_eq(presented.trim().as_bytes(), expected.as_bytes()))
}

/// Byte comparison whose running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn link_view(state: &AppState, link: &ShareLink) -> LinkView {
    LinkView {
        token: link.token.clone(),
        recipient: link.recipient.clone(),
        collection: link.collection.clone(),
        created_at: link.created_at,
        active: state.negotiator.monitor().store().is_held(&link.token),
    }
}

/// GET /admin/links
pub async fn list_links(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !is_authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let catalog = state.negotiator.catalog().read().expect("catalog lock poisoned");
    let links: Vec<LinkView> = catalog.links().into_iter().map(|l| link_view(&state, l)).collect();
    Json(links).into_response()
}

/// POST /admin/links
pub async fn create_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateLinkRequest>,
) -> Response {
    if !is_authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let created = {
        let mut catalog = state.negotiator.catalog().write().expect("catalog lock poisoned");
        catalog.create_link(req.recipient, req.collection)
    };
    match created {
        Ok(link) => {
            tracing::info!("link {} created for {}", link.token, link.recipient);
            (StatusCode::CREATED, Json(link_view(&state, &link))).into_response()
        }
        Err(CatalogError::UnknownCollection(id)) => {
            tracing::debug!("refusing link for unknown collection '{}'", id);
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            tracing::warn!("failed to create link: {}", e);
            StatusCode::CONFLICT.into_response()
        }
    }
}

/// DELETE /admin/links/{link}
pub async fn delete_link(
    State(state): State<AppState>,
    Path(link): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !is_authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let link = LinkToken::new(link);
    match state.negotiator.revoke_link(&link) {
        Some(_) => {
            state.stats.forget(&link);
            StatusCode::NO_CONTENT.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// POST /admin/links/{link}/invalidate
pub async fn invalidate_link(
    State(state): State<AppState>,
    Path(link): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !is_authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let link = LinkToken::new(link);
    let known = state
        .negotiator
        .catalog()
        .read()
        .expect("catalog lock poisoned")
        .link(&link)
        .is_some();
    if !known {
        return StatusCode::NOT_FOUND.into_response();
    }
    let invalidated = state.negotiator.invalidate_link(&link);
    Json(InvalidateResponse { invalidated }).into_response()
}

/// GET /admin/links/{link}/stats
pub async fn link_stats(
    State(state): State<AppState>,
    Path(link): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !is_authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let link = LinkToken::new(link);
    let stats = state.stats.snapshot(&link);
    let media_stats = {
        let catalog = state.negotiator.catalog().read().expect("catalog lock poisoned");
        if catalog.link(&link).is_none() {
            return StatusCode::NOT_FOUND.into_response();
        }
        let mut media: Vec<MediaPlays> = stats
            .media_plays
            .iter()
            .map(|(&media_id, &plays)| MediaPlays {
                media_id,
                title: catalog.media_item(&link, media_id).map(|item| item.title.clone()),
                plays,
            })
            .collect();
        media.sort_by(|a, b| b.plays.cmp(&a.plays).then_with(|| a.media_id.cmp(&b.media_id)));
        media
    };
    let last_active = state.negotiator.last_active(&link).max(stats.last_event_at);
    Json(LinkStatsView {
        link,
        total_views: stats.total_views,
        total_plays: stats.total_plays,
        last_active,
        media_stats,
    })
    .into_response()
}
