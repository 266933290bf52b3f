//! Per-link viewing totals, accumulated from the telemetry stream.
//!
//! The table is an [`EventSink`], so it is fed by the dispatcher like any
//! other sink and is never consulted by lease decisions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::events::{EventKind, EventSink, SinkError, ViewingEvent};
use crate::lease::LinkToken;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkStats {
    pub total_views: u64,
    pub total_plays: u64,
    /// Play counts keyed by media item. Plays reported without a media id
    /// count toward the total only.
    pub media_plays: HashMap<Uuid, u64>,
    /// Timestamp of the newest event seen for the link.
    pub last_event_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct ViewStats {
    links: DashMap<LinkToken, LinkStats>,
}

impl ViewStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals for `link`; all zero if nothing was recorded.
    pub fn snapshot(&self, link: &LinkToken) -> LinkStats {
        self.links
            .get(link)
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    /// Drop everything recorded for `link`.
    pub fn forget(&self, link: &LinkToken) {
        self.links.remove(link);
    }

    fn count(&self, event: &ViewingEvent) {
        let mut stats = self.links.entry(event.link_token.clone()).or_default();
        match event.event_type {
            EventKind::View => stats.total_views += 1,
            EventKind::Play => {
                stats.total_plays += 1;
                if let Some(media_id) = event.media_id {
                    *stats.media_plays.entry(media_id).or_default() += 1;
                }
            }
            _ => {}
        }
        if stats.last_event_at.is_none_or(|last| last < event.at) {
            stats.last_event_at = Some(event.at);
        }
    }
}

impl EventSink for ViewStats {
    fn record(&self, event: &ViewingEvent) -> Result<(), SinkError> {
        // Denied requests come from someone who is not the viewer.
        if event.event_type != EventKind::Denied {
            self.count(event);
        }
        Ok(())
    }
}
