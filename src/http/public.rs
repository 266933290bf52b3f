//! Viewer-facing endpoints. The share link in the URL or body is the only credential.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::mime::MediaKind;
use crate::events::EventKind;
use crate::http::SESSION_HEADER;
use crate::http::state::AppState;
use crate::lease::{LeaseError, LinkToken, SessionToken};
use crate::negotiator::{AccessError, AccessGrant, AccessOutcome, EventAck, EventError};

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub granted: bool,
    pub conflict: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<SessionToken>,
    #[serde(flatten)]
    pub session: Option<SessionBody>,
}

/// Everything a granted viewer needs to render the collection and pace heartbeats.
#[derive(Debug, Serialize)]
pub struct SessionBody {
    pub resumed: bool,
    pub renew_interval_secs: u64,
    pub timeout_secs: u64,
    pub recipient: String,
    pub collection: String,
    pub media: Vec<MediaView>,
}

#[derive(Debug, Serialize)]
pub struct MediaView {
    pub id: Uuid,
    pub title: String,
    pub kind: MediaKind,
    pub mime: &'static str,
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub link_token: LinkToken,
    pub session_token: SessionToken,
}

#[derive(Debug, Serialize)]
pub struct RenewResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub link_token: LinkToken,
    pub session_token: SessionToken,
    pub event_type: EventKind,
    pub media_id: Option<Uuid>,
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(ErrorBody { error: message.to_string() })).into_response()
}

fn presented_session(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SessionToken::new)
}

/// Wire reason for a rejected heartbeat.
pub fn rejection_reason(error: LeaseError) -> &'static str {
    match error {
        LeaseError::Superseded => "superseded",
        LeaseError::Expired | LeaseError::Conflict => "expired",
    }
}

/// GET /public/view/{link} — grant, resume, or refuse a viewing session.
pub async fn request_access(
    State(state): State<AppState>,
    Path(link): Path<String>,
    headers: HeaderMap,
) -> Response {
    let link = LinkToken::new(link);
    let presented = presented_session(&headers);

    match state.negotiator.request_access(&link, presented.as_ref()) {
        Ok(grant) => {
            let body = access_body(&state, &link, grant);
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(AccessError::Conflict) => (
            StatusCode::CONFLICT,
            Json(AccessResponse {
                granted: false,
                conflict: true,
                session_token: None,
                session: None,
            }),
        )
            .into_response(),
        Err(AccessError::UnknownLink) => error_response(StatusCode::NOT_FOUND, AccessError::UnknownLink),
    }
}

fn access_body(state: &AppState, link: &LinkToken, grant: AccessGrant) -> AccessResponse {
    let policy = *state.negotiator.monitor().policy();
    let media = grant
        .listing
        .media
        .into_iter()
        .map(|entry| MediaView {
            url: format!("/public/media/{}/{}", link, entry.id),
            id: entry.id,
            title: entry.title,
            kind: entry.kind,
            mime: entry.mime,
            size: entry.size,
        })
        .collect();

    AccessResponse {
        granted: true,
        conflict: false,
        session_token: Some(grant.session_token),
        session: Some(SessionBody {
            resumed: grant.outcome == AccessOutcome::Renewed,
            renew_interval_secs: policy.renew_interval.as_secs(),
            timeout_secs: policy.timeout.as_secs(),
            recipient: grant.listing.recipient,
            collection: grant.listing.collection,
            media,
        }),
    }
}

/// POST /public/heartbeat — renew the caller's lease.
pub async fn renew_session(State(state): State<AppState>, Json(req): Json<SessionRequest>) -> Response {
    match state.negotiator.renew_session(&req.link_token, &req.session_token) {
        Ok(()) => (StatusCode::OK, Json(RenewResponse { ok: true, reason: None })).into_response(),
        Err(e) => (
            StatusCode::GONE,
            Json(RenewResponse {
                ok: false,
                reason: Some(rejection_reason(e)),
            }),
        )
            .into_response(),
    }
}

/// POST /public/leave — best-effort release.
///
/// Browsers send this from `navigator.sendBeacon` as `text/plain`, so the body
/// is parsed as JSON regardless of content type. Always 204.
pub async fn release_session(State(state): State<AppState>, body: String) -> StatusCode {
    match serde_json::from_str::<SessionRequest>(&body) {
        Ok(req) => state.negotiator.release_session(&req.link_token, &req.session_token),
        Err(e) => tracing::debug!("ignoring malformed leave request: {}", e),
    }
    StatusCode::NO_CONTENT
}

/// POST /public/event — playback telemetry from the active viewer.
pub async fn record_event(State(state): State<AppState>, Json(req): Json<EventRequest>) -> Response {
    let result = state.negotiator.record_event(
        &req.link_token,
        &req.session_token,
        req.event_type,
        req.media_id,
        req.details,
    );
    match result {
        Ok(EventAck::Accepted) => (StatusCode::ACCEPTED, Json(StatusBody { status: "ok" })).into_response(),
        Ok(EventAck::Ignored) => (StatusCode::OK, Json(StatusBody { status: "ignored" })).into_response(),
        Err(e @ EventError::NotReportable) => error_response(StatusCode::BAD_REQUEST, e),
        Err(e @ EventError::InactiveSession) => error_response(StatusCode::FORBIDDEN, e),
    }
}
