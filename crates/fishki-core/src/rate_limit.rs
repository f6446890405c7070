//! Sliding-window rate limiter.
//!
//! Each client identity owns a window: the timestamps of its admitted
//! requests within the trailing `window`. A request is admitted while fewer
//! than `max_requests` timestamps remain after pruning.
//!
//! A single mutex guards the whole map, both for the read-modify-write in
//! [`RateLimiter::allow`] and for [`RateLimiter::sweep`]. The sweep drops
//! identities whose window has emptied; the HTTP layer runs it periodically
//! so transient clients do not accumulate.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Admit or deny one request from `client` at the current instant.
    pub fn allow(&self, client: &str) -> bool {
        self.allow_at(client, Instant::now())
    }

    /// Admit or deny one request from `client` observed at `now`.
    pub fn allow_at(&self, client: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock();
        let stamps = clients.entry(client.to_string()).or_default();
        prune(stamps, now, self.window);

        if stamps.len() >= self.max_requests {
            return false;
        }
        stamps.push_back(now);
        true
    }

    /// Drop expired timestamps everywhere and forget empty windows.
    ///
    /// Returns how many identities were forgotten.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, stamps| {
            prune(stamps, now, self.window);
            !stamps.is_empty()
        });
        before - clients.len()
    }

    /// Number of identities currently holding a window.
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().len()
    }
}

/// Keep only timestamps inside `[now - window, now]`.
fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = stamps.front() {
        if now.saturating_duration_since(oldest) > window {
            stamps.pop_front();
        } else {
            break;
        }
    }
}
