use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tokio::sync::broadcast;

use reelpass::events::{
    EventDispatcher, EventKind, EventSink, FanOutSink, JsonLinesSink, SinkError, ViewingEvent, run_dispatcher,
};
use reelpass::lease::{LinkToken, SessionToken};

fn event(kind: EventKind) -> ViewingEvent {
    ViewingEvent::new(LinkToken::new("link"), Some(SessionToken::new("s1")), kind)
}

#[derive(Default)]
struct Recording(Mutex<Vec<EventKind>>);

impl EventSink for Recording {
    fn record(&self, event: &ViewingEvent) -> Result<(), SinkError> {
        self.0.lock().unwrap().push(event.event_type);
        Ok(())
    }
}

struct Broken;

impl EventSink for Broken {
    fn record(&self, _event: &ViewingEvent) -> Result<(), SinkError> {
        Err(SinkError::Io(std::io::Error::other("disk full")))
    }
}

#[derive(Default)]
struct ThreadSpy(Mutex<Vec<ThreadId>>);

impl EventSink for ThreadSpy {
    fn record(&self, _event: &ViewingEvent) -> Result<(), SinkError> {
        self.0.lock().unwrap().push(thread::current().id());
        Ok(())
    }
}

#[test]
fn viewer_reportable_kinds() {
    assert!(EventKind::Play.is_client_reportable());
    assert!(EventKind::View.is_client_reportable());
    assert!(!EventKind::Granted.is_client_reportable());
    assert!(!EventKind::Denied.is_client_reportable());
}

#[test]
fn event_kinds_use_snake_case_on_the_wire() {
    let kind: EventKind = serde_json::from_str("\"pause\"").unwrap();
    assert_eq!(kind, EventKind::Pause);
    assert_eq!(serde_json::to_string(&EventKind::Released).unwrap(), "\"released\"");
}

#[test]
fn full_queue_drops_instead_of_blocking() {
    let (dispatcher, mut rx) = EventDispatcher::channel(1);
    dispatcher.emit(event(EventKind::Play));
    dispatcher.emit(event(EventKind::Pause));
    assert_eq!(rx.try_recv().unwrap().event_type, EventKind::Play);
    assert!(rx.try_recv().is_err());
}

#[test]
fn emit_after_receiver_dropped_is_harmless() {
    let (dispatcher, rx) = EventDispatcher::channel(4);
    drop(rx);
    dispatcher.emit(event(EventKind::Play));
}

#[test]
fn json_lines_sink_appends_one_object_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let sink = JsonLinesSink::open(&path).unwrap();
    sink.record(&event(EventKind::Play).with_details(Some("t=12".into())))
        .unwrap();
    sink.record(&event(EventKind::Pause)).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["event_type"], "play");
    assert_eq!(lines[0]["session_token"], "s1");
    assert_eq!(lines[0]["details"], "t=12");
    assert_eq!(lines[1]["event_type"], "pause");
}

#[tokio::test]
async fn dispatcher_delivers_and_flushes_on_shutdown() {
    let sink = Arc::new(Recording::default());
    let (dispatcher, rx) = EventDispatcher::channel(16);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    dispatcher.emit(event(EventKind::Granted));
    dispatcher.emit(event(EventKind::Play));
    shutdown_tx.send(()).unwrap();

    let task = tokio::spawn(run_dispatcher(rx, sink.clone(), shutdown_rx));
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        *sink.0.lock().unwrap(),
        vec![EventKind::Granted, EventKind::Play]
    );
}

#[tokio::test]
async fn sink_failures_are_dropped_not_fatal() {
    let (dispatcher, rx) = EventDispatcher::channel(16);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let task = tokio::spawn(run_dispatcher(rx, Arc::new(Broken), shutdown_rx));

    dispatcher.emit(event(EventKind::Play));
    dispatcher.emit(event(EventKind::Pause));
    drop(dispatcher);

    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
}

#[test]
fn fan_out_reaches_every_sink_past_a_failure() {
    let recording = Arc::new(Recording::default());
    let sink = FanOutSink::new(vec![Arc::new(Broken), recording.clone()]);
    assert!(sink.record(&event(EventKind::View)).is_err());
    assert_eq!(*recording.0.lock().unwrap(), vec![EventKind::View]);
}

#[tokio::test]
async fn dispatcher_records_off_the_runtime_thread() {
    let spy = Arc::new(ThreadSpy::default());
    let (dispatcher, rx) = EventDispatcher::channel(16);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let task = tokio::spawn(run_dispatcher(rx, spy.clone(), shutdown_rx));

    dispatcher.emit(event(EventKind::Play));
    drop(dispatcher);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();

    let seen = spy.0.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_ne!(seen[0], thread::current().id());
}

#[tokio::test]
async fn dispatcher_writes_json_lines_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let sink = Arc::new(JsonLinesSink::open(&path).unwrap());
    let (dispatcher, rx) = EventDispatcher::channel(16);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let task = tokio::spawn(run_dispatcher(rx, sink, shutdown_rx));

    for kind in [EventKind::Granted, EventKind::View, EventKind::Play, EventKind::Ended] {
        dispatcher.emit(event(kind));
    }
    drop(dispatcher);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();

    let kinds: Vec<String> = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["event_type"].to_string())
        .collect();
    assert_eq!(kinds, ["\"granted\"", "\"view\"", "\"play\"", "\"ended\""]);
}
