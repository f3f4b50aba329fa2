//! "Take latest" gating for overlapping fetches.

use std::sync::atomic::{AtomicU64, Ordering};

/// Ticket handed to one in-flight fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Issues increasing tickets; only the most recent one is admitted.
///
/// A caller takes a ticket before fetching and drops the response if
/// [`is_latest`](Self::is_latest) is false by the time it arrives.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_ticket(&self) -> RequestTicket {
        RequestTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_latest(&self, ticket: RequestTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}
