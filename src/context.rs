//! Routing context
//!
//! Per-request mutable scratch threaded through middleware and mounted
//! sub-multiplexers: captured URL parameters, the residual routing path set
//! by a parent mount, the (possibly rewritten) routing method, and the
//! accumulated route patterns crossed during dispatch. Contexts are pooled
//! and reused across requests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::handler::Request;
use crate::mux::Mux;

/// Ordered URL parameter capture. Keys and values are kept as parallel
/// lists in descent order; duplicate keys are allowed and the last entry
/// wins on lookup, which is what makes nested mounts with overlapping
/// wildcards behave.
#[derive(Debug, Default, Clone)]
pub struct RouteParams {
    pub keys: Vec<String>,
    pub values: Vec<String>,
}

impl RouteParams {
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.keys.push(key.into());
        self.values.push(value.into());
    }

    /// Last captured value for `key`, scanning newest-first.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .rposition(|k| k == key)
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
    }
}

/// Per-request routing state.
#[derive(Default)]
pub struct RouteContext {
    /// Back reference to the multiplexer that started the dispatch. Used by
    /// middleware that needs to probe routing again (e.g. the HEAD→GET
    /// rewrite).
    pub routes: Option<Arc<Mux>>,

    /// Residual path a parent mount wants the child to route, instead of
    /// the request URI's path.
    pub route_path: Option<String>,

    /// Method to route as, when it differs from the request method.
    pub route_method: Option<http::Method>,

    /// Patterns crossed from root to leaf: every mount appends its mount
    /// pattern, the leaf appends its own.
    pub route_patterns: Vec<String>,

    /// Parameters captured during dispatch, visible to handlers.
    pub url_params: RouteParams,

    // Positional capture scratch used by the trie walk; values are pushed
    // during descent and the matched endpoint's keys are zipped in at the
    // terminal.
    pub(crate) route_params: RouteParams,

    // Pattern of the most recently matched endpoint.
    pub(crate) route_pattern: String,

    // Sticky flag: some node matched the path but had no endpoint for the
    // requested method.
    pub(crate) method_not_allowed: bool,
}

impl RouteContext {
    pub fn new() -> Self {
        RouteContext::default()
    }

    /// Last captured value for a named parameter. The catch-all segment is
    /// reachable under the name `*`.
    pub fn url_param(&self, key: &str) -> Option<&str> {
        self.url_params.get(key)
    }

    /// The matched route pattern with mount wildcards collapsed, e.g.
    /// `/accounts/{account_id}/hi` for a leaf reached through two mounts.
    pub fn route_pattern(&self) -> String {
        let mut pattern: String = self.route_patterns.concat();
        while pattern.contains("/*/") {
            pattern = pattern.replace("/*/", "/");
        }
        pattern
    }

    /// Clear all state while keeping allocation capacity, so pooled
    /// contexts do not reallocate their parameter lists on every request.
    pub fn reset(&mut self) {
        self.routes = None;
        self.route_path = None;
        self.route_method = None;
        self.route_patterns.clear();
        self.url_params.clear();
        self.route_params.clear();
        self.route_pattern.clear();
        self.method_not_allowed = false;
    }
}

/// Shared handle to the routing context, stored in the request's extension
/// map. Cloning is cheap; all clones refer to the same per-request state.
#[derive(Clone)]
pub struct RouteCtx(Arc<Mutex<RouteContext>>);

impl RouteCtx {
    pub fn new(ctx: RouteContext) -> Self {
        RouteCtx(Arc::new(Mutex::new(ctx)))
    }

    /// Lock the context. A poisoned lock (a handler panicked while holding
    /// it) is recovered rather than propagated so the recoverer middleware
    /// can keep serving.
    pub fn lock(&self) -> MutexGuard<'_, RouteContext> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn into_inner(self) -> Option<RouteContext> {
        Arc::into_inner(self.0).map(|m| m.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Routing context attached to a request, if any.
pub fn route_context(req: &Request) -> Option<RouteCtx> {
    req.extensions().get::<RouteCtx>().cloned()
}

/// Last captured value for a named URL parameter of the current request.
pub fn url_param(req: &Request, key: &str) -> Option<String> {
    route_context(req).and_then(|ctx| ctx.lock().url_param(key).map(str::to_owned))
}

/// Ordered route patterns crossed while dispatching the current request.
pub fn route_patterns(req: &Request) -> Vec<String> {
    route_context(req)
        .map(|ctx| ctx.lock().route_patterns.clone())
        .unwrap_or_default()
}

/// Pool of reusable routing contexts. Acquire/release are safe to call
/// concurrently; released contexts come back reset.
#[derive(Default)]
pub(crate) struct ContextPool {
    free: Mutex<Vec<RouteContext>>,
}

impl ContextPool {
    pub(crate) fn acquire(&self) -> RouteContext {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default()
    }

    pub(crate) fn release(&self, mut ctx: RouteContext) {
        ctx.reset();
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ctx);
    }
}
