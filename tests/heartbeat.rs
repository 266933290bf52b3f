use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use reelpass::heartbeat::{self, HeartbeatMonitor, HeartbeatPolicy, PolicyError};
use reelpass::lease::clock::ManualClock;
use reelpass::lease::{LeaseError, LinkToken};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[test]
fn default_policy_allows_two_missed_beats() {
    let policy = HeartbeatPolicy::default();
    assert_eq!(policy.renew_interval, secs(10));
    assert_eq!(policy.timeout, secs(30));
    assert_eq!(policy.timeout, policy.renew_interval * 3);
}

#[test]
fn timeout_must_exceed_renew_interval() {
    assert_eq!(
        HeartbeatPolicy::new(secs(10), secs(10), secs(30)),
        Err(PolicyError::TimeoutTooShort {
            timeout: secs(10),
            renew_interval: secs(10),
        })
    );
}

#[test]
fn zero_durations_are_rejected() {
    assert!(matches!(
        HeartbeatPolicy::new(Duration::ZERO, secs(30), secs(30)),
        Err(PolicyError::ZeroDuration(_))
    ));
    assert!(matches!(
        HeartbeatPolicy::new(secs(10), secs(30), Duration::ZERO),
        Err(PolicyError::ZeroDuration(_))
    ));
}

#[test]
fn huge_intervals_are_validated_without_overflow() {
    let policy = HeartbeatPolicy::new(secs(u64::MAX / 2 + 1), secs(u64::MAX), secs(30)).unwrap();
    assert_eq!(policy.timeout, secs(u64::MAX));
    assert_eq!(
        HeartbeatPolicy::new(secs(u64::MAX), secs(u64::MAX), secs(30)),
        Err(PolicyError::TimeoutTooShort {
            timeout: secs(u64::MAX),
            renew_interval: secs(u64::MAX),
        })
    );
}

#[test]
fn sweep_interval_may_exceed_timeout() {
    assert!(HeartbeatPolicy::new(secs(10), secs(30), secs(120)).is_ok());
}

#[test]
fn monitor_renew_keeps_a_slow_viewer_alive() {
    let clock = Arc::new(ManualClock::new());
    let policy = HeartbeatPolicy::default();
    let store = Arc::new(policy.lease_store(clock.clone()));
    let monitor = HeartbeatMonitor::new(Arc::clone(&store), policy);
    let link = LinkToken::new("slow");

    let session = store.try_grant(&link).unwrap();
    // One missed beat, then a late one inside the safety margin.
    clock.advance(secs(29));
    monitor.renew(&link, &session).unwrap();
    clock.advance(secs(29));
    monitor.renew(&link, &session).unwrap();
    assert_eq!(monitor.sweep(), 0);

    clock.advance(secs(31));
    assert_eq!(monitor.renew(&link, &session), Err(LeaseError::Expired));
    assert_eq!(monitor.sweep(), 1);
}

#[tokio::test]
async fn background_sweep_reclaims_and_stops_on_shutdown() {
    let clock = Arc::new(ManualClock::new());
    let policy = HeartbeatPolicy::new(secs(10), secs(30), Duration::from_millis(10)).unwrap();
    let store = Arc::new(policy.lease_store(clock.clone()));
    let monitor = Arc::new(HeartbeatMonitor::new(Arc::clone(&store), policy));

    store.try_grant(&LinkToken::new("abandoned")).unwrap();
    clock.advance(secs(31));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(heartbeat::run(monitor, shutdown_rx));

    for _ in 0..100 {
        if store.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(store.is_empty(), "sweeper did not reclaim the abandoned lease");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("sweeper did not stop")
        .unwrap();
}
