use std::sync::Arc;

use crate::negotiator::SessionNegotiator;
use crate::stats::ViewStats;

/// Shared application state injected into all route handlers via axum::extract::State.
#[derive(Clone)]
pub struct AppState {
    pub negotiator: Arc<SessionNegotiator>,
    /// Per-link totals, fed by the event dispatcher.
    pub stats: Arc<ViewStats>,
    /// Bearer token for the admin routes; `None` leaves them unmounted.
    pub admin_token: Option<Arc<str>>,
}
