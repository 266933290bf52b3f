//! Exclusivity records for share links.
//!
//! A [`Lease`] proves that one viewing session currently owns a share link. The
//! [`store::LeaseStore`] keeps at most one lease per link and is the only place
//! lease records live; callers only ever see the opaque [`SessionToken`].

pub mod clock;
pub mod store;

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque share link credential, as printed in the QR code / URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkToken(String);

impl LinkToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Fresh unguessable token for a newly created link.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token handed to the viewer that currently holds a link's lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Active,
    Expired,
    Released,
}

/// Why a lease operation was refused. Store state is unchanged on every error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LeaseError {
    /// Another session holds a live lease on the link.
    #[error("link is in use by another session")]
    Conflict,
    /// The caller's own lease lapsed, was released, or was invalidated.
    #[error("session has ended")]
    Expired,
    /// Another session holds the link now.
    #[error("session was taken over by another viewer")]
    Superseded,
}

#[derive(Debug, Clone)]
pub struct Lease {
    pub session_token: SessionToken,
    pub link_token: LinkToken,
    pub granted_at: Instant,
    pub last_renewed_at: Instant,
    pub state: LeaseState,
    /// Holder of the lease this one replaced. That lease had already lapsed or
    /// been released when it was replaced.
    pub(crate) predecessor: Option<SessionToken>,
}

impl Lease {
    pub(crate) fn grant(link_token: LinkToken, now: Instant, predecessor: Option<SessionToken>) -> Self {
        Self {
            session_token: SessionToken::generate(),
            link_token,
            granted_at: now,
            last_renewed_at: now,
            state: LeaseState::Active,
            predecessor,
        }
    }

    /// State as observed at `now`: an Active lease whose last renewal is more
    /// than `timeout` ago reads as Expired even before anything rewrites it.
    pub fn effective_state(&self, now: Instant, timeout: Duration) -> LeaseState {
        match self.state {
            LeaseState::Active if is_lapsed(self.last_renewed_at, now, timeout) => LeaseState::Expired,
            state => state,
        }
    }

    pub fn is_live(&self, now: Instant, timeout: Duration) -> bool {
        self.effective_state(now, timeout) == LeaseState::Active
    }
}

/// The single expiry predicate shared by lazy checks and the background sweep.
pub fn is_lapsed(last_renewed_at: Instant, now: Instant, timeout: Duration) -> bool {
    now.saturating_duration_since(last_renewed_at) > timeout
}
