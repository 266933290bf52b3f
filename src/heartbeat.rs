//! Renewal contract and background reclamation of abandoned leases.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::lease::clock::Clock;
use crate::lease::store::LeaseStore;
use crate::lease::{LeaseError, LinkToken, SessionToken};

pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error(
        "heartbeat timeout ({timeout:?}) must be longer than the renew interval ({renew_interval:?})"
    )]
    TimeoutTooShort {
        timeout: Duration,
        renew_interval: Duration,
    },
}

/// How often clients renew, how long a silent lease survives, and how often
/// the server sweeps dead records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPolicy {
    pub renew_interval: Duration,
    pub timeout: Duration,
    pub sweep_interval: Duration,
}

impl HeartbeatPolicy {
    pub fn new(
        renew_interval: Duration,
        timeout: Duration,
        sweep_interval: Duration,
    ) -> Result<Self, PolicyError> {
        if renew_interval.is_zero() {
            return Err(PolicyError::ZeroDuration("renew interval"));
        }
        if timeout.is_zero() {
            return Err(PolicyError::ZeroDuration("heartbeat timeout"));
        }
        if sweep_interval.is_zero() {
            return Err(PolicyError::ZeroDuration("sweep interval"));
        }
        if timeout <= renew_interval {
            return Err(PolicyError::TimeoutTooShort {
                timeout,
                renew_interval,
            });
        }
        if timeout / 2 < renew_interval {
            tracing::warn!(
                "heartbeat timeout {:?} tolerates less than one missed beat at {:?}",
                timeout,
                renew_interval
            );
        }
        Ok(Self {
            renew_interval,
            timeout,
            sweep_interval,
        })
    }

    /// Empty lease table that expires leases according to this policy.
    pub fn lease_store(&self, clock: Arc<dyn Clock>) -> LeaseStore {
        LeaseStore::new(self.timeout, clock)
    }
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self {
            renew_interval: DEFAULT_RENEW_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Enforces the renewal contract on top of a shared [`LeaseStore`].
pub struct HeartbeatMonitor {
    store: Arc<LeaseStore>,
    policy: HeartbeatPolicy,
}

impl HeartbeatMonitor {
    pub fn new(store: Arc<LeaseStore>, policy: HeartbeatPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &HeartbeatPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<LeaseStore> {
        &self.store
    }

    /// Heartbeat from a lease holder.
    pub fn renew(&self, link: &LinkToken, session: &SessionToken) -> Result<(), LeaseError> {
        let result = self.store.renew(link, session);
        if let Err(e) = &result {
            tracing::debug!("heartbeat rejected on link {}: {}", link, e);
        }
        result
    }

    /// One sweep pass. Returns the number of reclaimed records.
    pub fn sweep(&self) -> usize {
        let removed = self.store.sweep();
        if removed > 0 {
            tracing::debug!("reclaimed {} stale lease record(s)", removed);
        }
        removed
    }
}

/// Background sweep task.
///
/// Runs until the shutdown broadcast fires. Correctness never depends on it:
/// every store read applies the same expiry predicate on its own.
pub async fn run(monitor: Arc<HeartbeatMonitor>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(monitor.policy().sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // first tick fires immediately; nothing to sweep yet

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                monitor.sweep();
            }
            _ = shutdown_rx.recv() => {
                tracing::debug!("lease sweeper stopping");
                return;
            }
        }
    }
}
