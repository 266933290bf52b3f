//! Request-facing policy: decides Grant / Renew / Deny for each access attempt.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::catalog::{Catalog, ContentListing, MediaItem, ShareLink};
use crate::events::{EventDispatcher, EventKind, ViewingEvent};
use crate::heartbeat::HeartbeatMonitor;
use crate::lease::store::LeaseStore;
use crate::lease::{LeaseError, LinkToken, SessionToken};

/// Repeated `view` reports from the same session inside this window are ignored.
pub const VIEW_DEDUP_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    /// New lease; the client must persist the token for this link.
    Granted,
    /// The presented token was still live (a reload); same token returned.
    Renewed,
}

#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub outcome: AccessOutcome,
    pub session_token: SessionToken,
    pub listing: ContentListing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("unknown share link")]
    UnknownLink,
    #[error("link is in use by another session")]
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("event type cannot be reported by a viewer")]
    NotReportable,
    #[error("session is not active")]
    InactiveSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAck {
    Accepted,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MediaAccessError {
    #[error("session is not active")]
    InactiveSession,
    #[error("media item not found")]
    NotFound,
}

pub struct SessionNegotiator {
    catalog: Arc<RwLock<Catalog>>,
    monitor: Arc<HeartbeatMonitor>,
    events: EventDispatcher,
    last_view: DashMap<LinkToken, (SessionToken, Instant)>,
}

impl SessionNegotiator {
    pub fn new(
        catalog: Arc<RwLock<Catalog>>,
        monitor: Arc<HeartbeatMonitor>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            catalog,
            monitor,
            events,
            last_view: DashMap::new(),
        }
    }

    pub fn monitor(&self) -> &Arc<HeartbeatMonitor> {
        &self.monitor
    }

    pub fn catalog(&self) -> &Arc<RwLock<Catalog>> {
        &self.catalog
    }

    fn store(&self) -> &LeaseStore {
        self.monitor.store()
    }

    /// Decide one access attempt.
    ///
    /// The catalog read lock is held across the lease decision so a concurrent
    /// link deletion cannot slip between the lookup and the grant.
    pub fn request_access(
        &self,
        link: &LinkToken,
        presented: Option<&SessionToken>,
    ) -> Result<AccessGrant, AccessError> {
        let catalog = self.catalog.read().expect("catalog lock poisoned");
        let Some(listing) = catalog.listing(link) else {
            return Err(AccessError::UnknownLink);
        };

        if let Some(session) = presented {
            match self.monitor.renew(link, session) {
                Ok(()) => {
                    tracing::debug!("link {}: session resumed", link);
                    self.emit(link, Some(session.clone()), EventKind::Renewed);
                    return Ok(AccessGrant {
                        outcome: AccessOutcome::Renewed,
                        session_token: session.clone(),
                        listing,
                    });
                }
                Err(e) => {
                    tracing::debug!("link {}: presented session not resumable ({})", link, e);
                }
            }
        }

        match self.store().try_grant(link) {
            Ok(session) => {
                tracing::info!("link {}: access granted to {}", link, listing.recipient);
                self.emit(link, Some(session.clone()), EventKind::Granted);
                Ok(AccessGrant {
                    outcome: AccessOutcome::Granted,
                    session_token: session,
                    listing,
                })
            }
            Err(_) => {
                tracing::info!("link {}: access denied, in use elsewhere", link);
                self.emit(link, None, EventKind::Denied);
                Err(AccessError::Conflict)
            }
        }
    }

    /// Heartbeat from the current holder.
    pub fn renew_session(&self, link: &LinkToken, session: &SessionToken) -> Result<(), LeaseError> {
        self.monitor.renew(link, session)
    }

    /// Best-effort departure signal. Unknown or stale tokens are ignored.
    pub fn release_session(&self, link: &LinkToken, session: &SessionToken) {
        if self.store().release(link, session) {
            self.last_view.remove_if(link, |_, (viewer, _)| viewer == session);
            self.emit(link, Some(session.clone()), EventKind::Released);
        }
    }

    /// Playback telemetry from the active viewer.
    pub fn record_event(
        &self,
        link: &LinkToken,
        session: &SessionToken,
        kind: EventKind,
        media_id: Option<Uuid>,
        details: Option<String>,
    ) -> Result<EventAck, EventError> {
        if !kind.is_client_reportable() {
            return Err(EventError::NotReportable);
        }
        if !self.store().is_active(link, session) {
            return Err(EventError::InactiveSession);
        }
        if kind == EventKind::View && self.is_repeat_view(link, session) {
            return Ok(EventAck::Ignored);
        }
        self.events.emit(
            ViewingEvent::new(link.clone(), Some(session.clone()), kind)
                .with_media(media_id)
                .with_details(details),
        );
        Ok(EventAck::Accepted)
    }

    fn is_repeat_view(&self, link: &LinkToken, session: &SessionToken) -> bool {
        let now = self.store().now();
        match self.last_view.entry(link.clone()) {
            Entry::Occupied(mut entry) => {
                let (viewer, at) = entry.get();
                if viewer == session && now.saturating_duration_since(*at) <= VIEW_DEDUP_WINDOW {
                    return true;
                }
                entry.insert((session.clone(), now));
                false
            }
            Entry::Vacant(entry) => {
                entry.insert((session.clone(), now));
                false
            }
        }
    }

    /// Resolve a media item for streaming without renewing the lease.
    pub fn authorize_media(
        &self,
        link: &LinkToken,
        session: &SessionToken,
        media_id: Uuid,
    ) -> Result<MediaItem, MediaAccessError> {
        if !self.store().is_active(link, session) {
            return Err(MediaAccessError::InactiveSession);
        }
        let catalog = self.catalog.read().expect("catalog lock poisoned");
        catalog
            .media_item(link, media_id)
            .cloned()
            .ok_or(MediaAccessError::NotFound)
    }

    /// Administrative deletion: the link disappears and any viewer is evicted.
    pub fn revoke_link(&self, link: &LinkToken) -> Option<ShareLink> {
        let mut catalog = self.catalog.write().expect("catalog lock poisoned");
        let removed = catalog.remove_link(link)?;
        self.store().force_invalidate(link);
        self.last_view.remove(link);
        tracing::info!("link {} for {} deleted", link, removed.recipient);
        Some(removed)
    }

    /// Administrative disable: evict the current viewer, keep the link.
    pub fn invalidate_link(&self, link: &LinkToken) -> bool {
        let _catalog = self.catalog.write().expect("catalog lock poisoned");
        self.store().force_invalidate(link)
    }

    /// Wall-clock time of the link's last grant or heartbeat, while the
    /// lease record is still held by the store.
    pub fn last_active(&self, link: &LinkToken) -> Option<DateTime<Utc>> {
        let store = self.store();
        let last = store.last_renewed(link)?;
        let ago = chrono::Duration::from_std(store.now().saturating_duration_since(last)).ok()?;
        Some(Utc::now() - ago)
    }

    fn emit(&self, link: &LinkToken, session: Option<SessionToken>, kind: EventKind) {
        self.events.emit(ViewingEvent::new(link.clone(), session, kind));
    }
}
