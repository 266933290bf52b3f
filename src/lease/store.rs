use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::lease::clock::Clock;
use crate::lease::{Lease, LeaseError, LeaseState, LinkToken, SessionToken};

/// Concurrency-safe table of at most one lease per share link.
///
/// Every mutation for a given link runs under that key's shard lock, so the
/// check-and-set in [`try_grant`](Self::try_grant) is atomic with respect to
/// other callers presenting the same link. Expiry is evaluated lazily on every
/// access; [`sweep`](Self::sweep) only reclaims memory.
pub struct LeaseStore {
    leases: DashMap<LinkToken, Lease>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl LeaseStore {
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: DashMap::new(),
            timeout,
            clock,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Grant a fresh lease if the link has no live one.
    pub fn try_grant(&self, link: &LinkToken) -> Result<SessionToken, LeaseError> {
        let now = self.clock.now();
        match self.leases.entry(link.clone()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                if current.is_live(now, self.timeout) {
                    tracing::debug!("grant refused for link {}: held by another session", link);
                    return Err(LeaseError::Conflict);
                }
                let predecessor = Some(current.session_token.clone());
                let lease = Lease::grant(link.clone(), now, predecessor);
                let token = lease.session_token.clone();
                entry.insert(lease);
                tracing::debug!("lease on link {} taken over by a new session", link);
                Ok(token)
            }
            Entry::Vacant(entry) => {
                let lease = Lease::grant(link.clone(), now, None);
                let token = lease.session_token.clone();
                entry.insert(lease);
                tracing::debug!("lease on link {} granted", link);
                Ok(token)
            }
        }
    }

    /// Advance `last_renewed_at` for the current holder.
    ///
    /// A token that lost the link because its own lease lapsed reports
    /// `Expired`, even if a newer session has since been granted. Any other
    /// mismatched token reports `Superseded`.
    pub fn renew(&self, link: &LinkToken, session: &SessionToken) -> Result<(), LeaseError> {
        let now = self.clock.now();
        let Some(mut lease) = self.leases.get_mut(link) else {
            return Err(LeaseError::Expired);
        };
        if lease.session_token != *session {
            if lease.predecessor.as_ref() == Some(session) {
                return Err(LeaseError::Expired);
            }
            return Err(LeaseError::Superseded);
        }
        if !lease.is_live(now, self.timeout) {
            return Err(LeaseError::Expired);
        }
        lease.last_renewed_at = now;
        Ok(())
    }

    /// Mark the holder's lease Released. Returns whether a live lease ended.
    ///
    /// A lease that already lapsed is left as it is.
    pub fn release(&self, link: &LinkToken, session: &SessionToken) -> bool {
        let now = self.clock.now();
        let Some(mut lease) = self.leases.get_mut(link) else {
            return false;
        };
        if lease.session_token != *session || !lease.is_live(now, self.timeout) {
            return false;
        }
        lease.state = LeaseState::Released;
        tracing::debug!("lease on link {} released", link);
        true
    }

    /// End any lease on the link regardless of its remaining time.
    ///
    /// The record is kept as Expired so the evicted holder's next renewal
    /// reports `Expired` rather than `Superseded`. Returns whether a live
    /// lease was cut short.
    pub fn force_invalidate(&self, link: &LinkToken) -> bool {
        let now = self.clock.now();
        let Some(mut lease) = self.leases.get_mut(link) else {
            return false;
        };
        let was_live = lease.is_live(now, self.timeout);
        if lease.state == LeaseState::Active {
            lease.state = LeaseState::Expired;
        }
        if was_live {
            tracing::info!("lease on link {} invalidated", link);
        }
        was_live
    }

    /// When the link's lease was last granted or renewed, if a record exists.
    pub fn last_renewed(&self, link: &LinkToken) -> Option<Instant> {
        self.leases.get(link).map(|lease| lease.last_renewed_at)
    }

    /// Read-only check that `session` currently holds a live lease on `link`.
    pub fn is_active(&self, link: &LinkToken, session: &SessionToken) -> bool {
        let now = self.clock.now();
        self.leases
            .get(link)
            .is_some_and(|lease| lease.session_token == *session && lease.is_live(now, self.timeout))
    }

    /// Whether any session holds a live lease on `link`.
    pub fn is_held(&self, link: &LinkToken) -> bool {
        let now = self.clock.now();
        self.leases
            .get(link)
            .is_some_and(|lease| lease.is_live(now, self.timeout))
    }

    /// Effective state of the link's lease record, if any.
    pub fn state(&self, link: &LinkToken) -> Option<LeaseState> {
        let now = self.clock.now();
        self.leases
            .get(link)
            .map(|lease| lease.effective_state(now, self.timeout))
    }

    /// Drop every record that is no longer live. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0usize;
        self.leases.retain(|_, lease| {
            let live = lease.is_live(now, self.timeout);
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}
