#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, RwLock};

use tempfile::TempDir;
use tokio::sync::mpsc;

use reelpass::catalog::Catalog;
use reelpass::catalog::file::{build_catalog, parse_catalog};
use reelpass::events::{EventDispatcher, EventSink, ViewingEvent};
use reelpass::heartbeat::{HeartbeatMonitor, HeartbeatPolicy};
use reelpass::lease::LinkToken;
use reelpass::lease::clock::ManualClock;
use reelpass::negotiator::SessionNegotiator;
use reelpass::stats::ViewStats;

pub const LINK: &str = "11111111-2222-3333-4444-555555555555";
pub const OTHER_LINK: &str = "99999999-8888-7777-6666-555555555555";
pub const SONG_BYTES: &[u8] = b"0123456789abcdefghij";

pub struct Fixture {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub negotiator: Arc<SessionNegotiator>,
    pub events: mpsc::Receiver<ViewingEvent>,
    pub stats: Arc<ViewStats>,
}

impl Fixture {
    pub fn link(&self) -> LinkToken {
        LinkToken::new(LINK)
    }

    /// Events emitted so far, without waiting.
    pub fn drain_events(&mut self) -> Vec<ViewingEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Hand queued events to the stats table, as the dispatcher would.
    pub fn flush_stats(&mut self) {
        for event in self.drain_events() {
            self.stats.record(&event).unwrap();
        }
    }
}

pub fn write_media(root: &Path) {
    let album = root.join("summer");
    std::fs::create_dir_all(album.join("extras")).unwrap();
    std::fs::write(album.join("song.mp3"), SONG_BYTES).unwrap();
    std::fs::write(album.join("extras").join("clip.mp4"), b"not really a video").unwrap();
    std::fs::write(album.join("notes.txt"), b"skip me").unwrap();
}

pub fn catalog_toml() -> String {
    format!(
        r#"
[[collections]]
id = "summer"
title = "Summer 2024"
path = "summer"

[[links]]
token = "{LINK}"
recipient = "Alice"
collection = "summer"

[[links]]
token = "{OTHER_LINK}"
recipient = "Bob"
collection = "summer"
"#
    )
}

pub fn build_fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    write_media(dir.path());
    let catalog: Catalog = build_catalog(parse_catalog(&catalog_toml()).unwrap(), dir.path()).unwrap();

    let clock = Arc::new(ManualClock::new());
    let policy = HeartbeatPolicy::default();
    let store = Arc::new(policy.lease_store(clock.clone()));
    let monitor = Arc::new(HeartbeatMonitor::new(store, policy));
    let (dispatcher, events) = EventDispatcher::channel(64);
    let negotiator = Arc::new(SessionNegotiator::new(
        Arc::new(RwLock::new(catalog)),
        monitor,
        dispatcher,
    ));

    Fixture {
        dir,
        clock,
        negotiator,
        events,
        stats: Arc::new(ViewStats::new()),
    }
}
