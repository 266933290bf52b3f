use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use http_range_header::parse_range_header;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::catalog::MediaItem;
use crate::http::SESSION_HEADER;
use crate::http::state::AppState;
use crate::lease::{LinkToken, SessionToken};
use crate::negotiator::MediaAccessError;

/// `<audio>`/`<video>` elements cannot set headers, so the session token may
/// also travel as `?session=`.
#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub session: Option<String>,
}

fn session_from(query: &MediaQuery, headers: &HeaderMap) -> Option<SessionToken> {
    query
        .session
        .as_deref()
        .or_else(|| headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()))
        .filter(|s| !s.is_empty())
        .map(SessionToken::new)
}

/// Resolve the requested item for the caller's session, or the response to send instead.
fn authorize(
    state: &AppState,
    link: String,
    media_id: &str,
    query: &MediaQuery,
    headers: &HeaderMap,
) -> Result<MediaItem, Response> {
    let Some(session) = session_from(query, headers) else {
        return Err(StatusCode::FORBIDDEN.into_response());
    };
    let Ok(media_id) = Uuid::parse_str(media_id) else {
        return Err(StatusCode::NOT_FOUND.into_response());
    };
    let link = LinkToken::new(link);
    state
        .negotiator
        .authorize_media(&link, &session, media_id)
        .map_err(|e| match e {
            MediaAccessError::InactiveSession => StatusCode::FORBIDDEN.into_response(),
            MediaAccessError::NotFound => StatusCode::NOT_FOUND.into_response(),
        })
}

/// Headers present on every media response (GET + HEAD).
fn media_headers(item: &MediaItem) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(item.mime));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(item.file_size));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, no-store"));
    headers
}

fn unsatisfiable(file_size: u64) -> Response {
    (
        StatusCode::RANGE_NOT_SATISFIABLE,
        [(header::CONTENT_RANGE, format!("bytes */{}", file_size))],
    )
        .into_response()
}

/// HEAD /public/media/{link}/{id} — headers only; the file is not opened.
pub async fn serve_media_head(
    State(state): State<AppState>,
    Path((link, media_id)): Path<(String, String)>,
    Query(query): Query<MediaQuery>,
    req_headers: HeaderMap,
) -> Response {
    match authorize(&state, link, &media_id, &query, &req_headers) {
        Ok(item) => (StatusCode::OK, media_headers(&item)).into_response(),
        Err(response) => response,
    }
}

/// GET /public/media/{link}/{id} — stream the full file or one byte range.
pub async fn serve_media_get(
    State(state): State<AppState>,
    Path((link, media_id)): Path<(String, String)>,
    Query(query): Query<MediaQuery>,
    req_headers: HeaderMap,
) -> Response {
    let item = match authorize(&state, link, &media_id, &query, &req_headers) {
        Ok(item) => item,
        Err(response) => return response,
    };

    let headers = media_headers(&item);

    if let Some(range_val) = req_headers.get(header::RANGE) {
        let Ok(range_str) = range_val.to_str() else {
            return unsatisfiable(item.file_size);
        };
        return range_response(&item, range_str, headers).await;
    }

    let file = match tokio::fs::File::open(&item.path).await {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("Failed to open file {}: {}", item.path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let body = Body::from_stream(ReaderStream::new(file));
    (StatusCode::OK, headers, body).into_response()
}

/// 206 for the first satisfiable range, 416 otherwise. Multi-range requests
/// are answered with their first range only.
async fn range_response(item: &MediaItem, range_str: &str, mut headers: HeaderMap) -> Response {
    let Ok(parsed) = parse_range_header(range_str) else {
        return unsatisfiable(item.file_size);
    };
    let Ok(ranges) = parsed.validate(item.file_size) else {
        return unsatisfiable(item.file_size);
    };
    let Some(first) = ranges.into_iter().next() else {
        return unsatisfiable(item.file_size);
    };

    let start = *first.start();
    let end = *first.end(); // inclusive
    let length = end - start + 1;

    let mut file = match tokio::fs::File::open(&item.path).await {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("Range response: failed to open file {}: {}", item.path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(e) = file.seek(std::io::SeekFrom::Start(start)).await {
        tracing::error!("Range response: failed to seek in file {}: {}", item.path.display(), e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let content_range = format!("bytes {}-{}/{}", start, end, item.file_size);
    if let Ok(value) = HeaderValue::from_str(&content_range) {
        headers.insert(header::CONTENT_RANGE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    let body = Body::from_stream(ReaderStream::new(file.take(length)));
    (StatusCode::PARTIAL_CONTENT, headers, body).into_response()
}
