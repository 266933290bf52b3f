use chrono::{Duration, Utc};
use uuid::Uuid;

use reelpass::events::{EventKind, EventSink, ViewingEvent};
use reelpass::lease::{LinkToken, SessionToken};
use reelpass::stats::ViewStats;

fn link() -> LinkToken {
    LinkToken::new("link")
}

fn event(kind: EventKind) -> ViewingEvent {
    ViewingEvent::new(link(), Some(SessionToken::new("s1")), kind)
}

#[test]
fn counts_views_and_plays_per_media() {
    let stats = ViewStats::new();
    let song = Uuid::new_v4();
    stats.record(&event(EventKind::View)).unwrap();
    stats.record(&event(EventKind::Play).with_media(Some(song))).unwrap();
    stats.record(&event(EventKind::Play).with_media(Some(song))).unwrap();
    stats.record(&event(EventKind::Play)).unwrap();
    stats.record(&event(EventKind::Pause).with_media(Some(song))).unwrap();

    let snapshot = stats.snapshot(&link());
    assert_eq!(snapshot.total_views, 1);
    assert_eq!(snapshot.total_plays, 3);
    assert_eq!(snapshot.media_plays.len(), 1);
    assert_eq!(snapshot.media_plays[&song], 2);
}

#[test]
fn denied_requests_do_not_touch_the_link() {
    let stats = ViewStats::new();
    stats
        .record(&ViewingEvent::new(link(), None, EventKind::Denied))
        .unwrap();
    assert_eq!(stats.snapshot(&link()).last_event_at, None);
}

#[test]
fn last_event_time_never_moves_backwards() {
    let stats = ViewStats::new();
    let late = event(EventKind::Renewed);
    let mut early = event(EventKind::Granted);
    early.at = late.at - Duration::seconds(30);
    stats.record(&late).unwrap();
    stats.record(&early).unwrap();
    assert_eq!(stats.snapshot(&link()).last_event_at, Some(late.at));
    assert!(late.at <= Utc::now());
}

#[test]
fn forget_resets_to_zero() {
    let stats = ViewStats::new();
    stats.record(&event(EventKind::View)).unwrap();
    stats.forget(&link());
    assert_eq!(stats.snapshot(&link()).total_views, 0);
}
