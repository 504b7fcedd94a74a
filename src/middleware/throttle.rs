//! In-flight request throttling.
//!
//! Puts a ceiling on the number of requests processed concurrently below
//! the point where the middleware is installed, with an optional bounded
//! backlog of pending requests. This is not a per-user rate limiter.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use http::StatusCode;

use crate::error::Error;
use crate::handler::{ArcHandler, Request};
use crate::response::ResponseWriter;

const DEFAULT_BACKLOG_TIMEOUT: Duration = Duration::from_secs(60);

/// Limit the number of in-flight requests to `limit`; excess requests are
/// rejected immediately with 429.
pub fn throttle(limit: usize) -> impl Fn(ArcHandler) -> ArcHandler + Send + Sync {
    throttle_backlog(limit, 0, DEFAULT_BACKLOG_TIMEOUT)
}

/// Limit in-flight requests to `limit` and hold up to `backlog_limit`
/// pending requests for at most `backlog_timeout` before rejecting them
/// with 429.
pub fn throttle_backlog(
    limit: usize,
    backlog_limit: usize,
    backlog_timeout: Duration,
) -> impl Fn(ArcHandler) -> ArcHandler + Send + Sync {
    assert!(limit > 0, "switchyard: throttle expects limit > 0");

    let throttler = Arc::new(Throttler {
        limit,
        capacity: limit + backlog_limit,
        backlog_timeout,
        state: Mutex::new(State { active: 0, queued: 0 }),
        cond: Condvar::new(),
    });

    move |next: ArcHandler| {
        let throttler = Arc::clone(&throttler);
        Arc::new(move |w: &mut ResponseWriter, req: &mut Request| {
            let permit = throttler.acquire()?;
            let outcome = next.call(w, req);
            drop(permit);
            outcome
        }) as ArcHandler
    }
}

struct State {
    active: usize,
    queued: usize,
}

struct Throttler {
    limit: usize,
    capacity: usize,
    backlog_timeout: Duration,
    state: Mutex<State>,
    cond: Condvar,
}

impl Throttler {
    fn acquire(self: &Arc<Self>) -> Result<Permit, Error> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.active + state.queued >= self.capacity {
            return Err(Error::with_message(
                StatusCode::TOO_MANY_REQUESTS,
                "server capacity exceeded",
            ));
        }

        state.queued += 1;
        let deadline = Instant::now() + self.backlog_timeout;

        while state.active >= self.limit {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                state.queued -= 1;
                return Err(Error::with_message(
                    StatusCode::TOO_MANY_REQUESTS,
                    "timed out while waiting for a pending request to complete",
                ));
            }
            let (guard, _) = self
                .cond
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }

        state.queued -= 1;
        state.active += 1;
        Ok(Permit {
            throttler: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.active -= 1;
        drop(state);
        self.cond.notify_one();
    }
}

/// A running-request slot; releasing happens on drop so a panicking handler
/// still frees its slot on the way out.
struct Permit {
    throttler: Arc<Throttler>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.throttler.release();
    }
}
