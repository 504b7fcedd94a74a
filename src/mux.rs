//! Request multiplexer
//!
//! The public routing surface: handler registration, middleware stack
//! management, inline groups, mounting of sub-routers, per-request dispatch
//! and the not-found / method-not-allowed fallbacks.
//!
//! A `Mux` is built during startup with `&mut self` registration calls and
//! then served immutably. The middleware stack freezes when the first route
//! is registered: the stack is composed once into a cached dispatch chain
//! and later `use_middleware` calls panic.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use http::StatusCode;
use tracing::debug;

use crate::context::{route_context, ContextPool, RouteContext, RouteCtx};
use crate::error::Error;
use crate::handler::{chain, ArcHandler, Handler, Middleware, Request};
use crate::response::ResponseWriter;
use crate::tree::{MethodMask, Node, RouteInfo};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Routing core shared between the mux, its frozen dispatch chain and any
/// inline groups. The trie is only written during the construction phase;
/// dispatch takes uncontended read locks.
struct Shared {
    tree: RwLock<Node>,
    pool: ContextPool,
    not_found: RwLock<Option<ArcHandler>>,
    method_not_allowed: RwLock<Option<ArcHandler>>,
}

impl Shared {
    fn not_found_handler(&self) -> ArcHandler {
        read(&self.not_found)
            .clone()
            .unwrap_or_else(|| Arc::new(default_not_found))
    }

    fn method_not_allowed_handler(&self) -> ArcHandler {
        read(&self.method_not_allowed)
            .clone()
            .unwrap_or_else(|| Arc::new(default_method_not_allowed))
    }
}

fn default_not_found(_: &mut ResponseWriter, _: &mut Request) -> Result<(), Error> {
    Err(Error::from_status(StatusCode::NOT_FOUND))
}

fn default_method_not_allowed(_: &mut ResponseWriter, _: &mut Request) -> Result<(), Error> {
    Err(Error::from_status(StatusCode::METHOD_NOT_ALLOWED))
}

macro_rules! verb_shims {
    ($(($name:ident, $mask:ident, $verb:literal)),+ $(,)?) => {
        $(
            #[doc = concat!("Register a closure for ", $verb, " requests at `pattern`.")]
            fn $name<F>(&mut self, pattern: &str, f: F)
            where
                F: Fn(&mut ResponseWriter, &mut Request) -> Result<(), Error>
                    + Send
                    + Sync
                    + 'static,
            {
                self.register(MethodMask::$mask, pattern, Arc::new(f));
            }
        )+
    };
}

/// Registration surface shared by [`Mux`] and [`InlineMux`]: the core
/// `register` operation plus the per-verb convenience shims.
///
/// `handle` and `method` accept any [`Handler`] value (another mux, an
/// adapter-lifted host handler); the verb shims and `handle_fn` accept bare
/// closures.
pub trait Router {
    /// Register `handler` for every method in `method` at `pattern`.
    fn register(&mut self, method: MethodMask, pattern: &str, handler: ArcHandler);

    /// Register a handler value matching any HTTP method.
    fn handle(&mut self, pattern: &str, handler: impl Handler + 'static) {
        self.register(MethodMask::ALL, pattern, Arc::new(handler));
    }

    /// Register a closure matching any HTTP method.
    fn handle_fn<F>(&mut self, pattern: &str, f: F)
    where
        F: Fn(&mut ResponseWriter, &mut Request) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.register(MethodMask::ALL, pattern, Arc::new(f));
    }

    /// Register a handler value for a method given by name,
    /// case-insensitively. Unknown method names are a programming error and
    /// panic.
    fn method(&mut self, method: &str, pattern: &str, handler: impl Handler + 'static) {
        let mask = MethodMask::from_name(method).unwrap_or_else(|| {
            panic!("switchyard: '{method}' http method is not supported")
        });
        self.register(mask, pattern, Arc::new(handler));
    }

    verb_shims!(
        (connect, CONNECT, "CONNECT"),
        (delete, DELETE, "DELETE"),
        (get, GET, "GET"),
        (head, HEAD, "HEAD"),
        (options, OPTIONS, "OPTIONS"),
        (patch, PATCH, "PATCH"),
        (post, POST, "POST"),
        (put, PUT, "PUT"),
        (trace, TRACE, "TRACE"),
    );
}

/// HTTP request multiplexer.
///
/// Parses the request path, records URL parameters and executes an end
/// handler through the frozen middleware chain. Registration is
/// construction-phase only; a built mux serves concurrent requests through
/// shared references.
pub struct Mux {
    shared: Arc<Shared>,
    middlewares: Vec<Middleware>,
    // Frozen dispatch chain: middleware stack composed once around the
    // trie-routing terminal. Present after the first route registration.
    chain: Option<ArcHandler>,
}

enum MountTarget {
    Router(Mux),
    Handler(ArcHandler),
}

impl Mux {
    pub fn new() -> Mux {
        Mux {
            shared: Arc::new(Shared {
                tree: RwLock::new(Node::new()),
                pool: ContextPool::default(),
                not_found: RwLock::new(None),
                method_not_allowed: RwLock::new(None),
            }),
            middlewares: Vec::new(),
            chain: None,
        }
    }

    /// Append a middleware to the stack. Middleware runs before route
    /// lookup, outermost first in registration order.
    ///
    /// Panics when called after the first route has been registered: by
    /// then the stack has been composed into the cached dispatch chain.
    pub fn use_middleware<M>(&mut self, mw: M)
    where
        M: Fn(ArcHandler) -> ArcHandler + Send + Sync + 'static,
    {
        if self.chain.is_some() {
            panic!("switchyard: all middlewares must be registered before routes on a mux");
        }
        self.middlewares.push(Arc::new(mw));
    }

    /// The registered middleware stack.
    pub fn middlewares(&self) -> &[Middleware] {
        &self.middlewares
    }

    /// Inline group owning its own middleware stack on top of this mux.
    /// Routes registered through the returned handle share this mux's trie;
    /// the extra middleware is composed into each endpoint at registration
    /// time.
    pub fn with<M>(&mut self, mw: M) -> InlineMux<'_>
    where
        M: Fn(ArcHandler) -> ArcHandler + Send + Sync + 'static,
    {
        self.freeze();
        InlineMux {
            parent: self,
            middlewares: vec![Arc::new(mw)],
            routed: false,
        }
    }

    /// Inline group with a fresh middleware stack, configured by `f`.
    pub fn group(&mut self, f: impl FnOnce(&mut InlineMux<'_>)) {
        self.freeze();
        let mut inline = InlineMux {
            parent: self,
            middlewares: Vec::new(),
            routed: false,
        };
        f(&mut inline);
    }

    /// Create a brand-new mux with its own trie and middleware stack,
    /// configure it with `f`, and mount it at `pattern`.
    pub fn route(&mut self, pattern: &str, f: impl FnOnce(&mut Mux)) {
        let mut sub = Mux::new();
        f(&mut sub);
        self.mount(pattern, sub);
    }

    /// Mount another mux as a sub-router under `pattern`. The mount matches
    /// `pattern` exactly and everything beneath `pattern/`; the residual
    /// path is handed to the child through the routing context. The
    /// parent's fallback handlers propagate into the child unless it
    /// defines its own.
    pub fn mount(&mut self, pattern: &str, child: Mux) {
        self.mount_inner(&[], pattern, MountTarget::Router(child));
    }

    /// Mount a plain handler under `pattern`; it receives every request for
    /// the mount point and anything beneath it.
    pub fn mount_handler(&mut self, pattern: &str, handler: impl Handler + 'static) {
        self.mount_inner(&[], pattern, MountTarget::Handler(Arc::new(handler)));
    }

    /// Set the handler invoked when no route matches. Applies to this mux
    /// and to already-mounted children without an explicit override.
    pub fn not_found<F>(&mut self, f: F)
    where
        F: Fn(&mut ResponseWriter, &mut Request) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.install_not_found(Arc::new(f));
    }

    /// Set the handler invoked when a route matches the path but not the
    /// method. Propagates like [`Mux::not_found`].
    pub fn method_not_allowed<F>(&mut self, f: F)
    where
        F: Fn(&mut ResponseWriter, &mut Request) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.install_method_not_allowed(Arc::new(f));
    }

    /// Routing information for every registered route, in trie order.
    /// Mount pass-through stubs are not reported.
    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut out = Vec::new();
        read(&self.shared.tree).collect_routes(&mut out);
        out
    }

    /// Search the routing tree for a `(method, path)` match without
    /// executing the handler, descending through mounted sub-routers.
    /// The context accumulates parameters and patterns exactly as a real
    /// dispatch would.
    pub fn match_route(&self, ctx: &mut RouteContext, method: &str, path: &str) -> bool {
        let Some(mask) = MethodMask::from_name(method) else {
            return false;
        };

        let found = read(&self.shared.tree).find_route(ctx, mask, path);
        match found {
            Some((_, Some(subroutes))) => {
                let next = next_route_path(ctx);
                ctx.route_path = Some(next.clone());
                subroutes.match_route(ctx, method, &next)
            }
            Some((_, None)) => true,
            None => false,
        }
    }

    /// Serve a request from the top level, recording this mux as the
    /// context's `routes` back reference so middleware can re-enter
    /// routing.
    pub fn serve(
        self: &Arc<Self>,
        w: &mut ResponseWriter,
        req: &mut Request,
    ) -> Result<(), Error> {
        self.dispatch(Some(Arc::clone(self)), w, req)
    }

    fn dispatch(
        &self,
        routes: Option<Arc<Mux>>,
        w: &mut ResponseWriter,
        req: &mut Request,
    ) -> Result<(), Error> {
        let dispatcher = self
            .chain
            .as_ref()
            .unwrap_or_else(|| panic!("switchyard: attempting to route on a mux with no handlers"));

        // A routing context attached by a parent mux means this is a nested
        // dispatch; route directly through the cached chain.
        if req.extensions().get::<RouteCtx>().is_some() {
            return dispatcher.call(w, req);
        }

        let mut ctx = self.shared.pool.acquire();
        ctx.routes = routes;
        let cell = RouteCtx::new(ctx);
        req.extensions_mut().insert(cell.clone());

        let result = dispatcher.call(w, req);

        // Release the context. If a handler panicked instead, the context
        // unwinds out still attached to the request and is freed with it.
        req.extensions_mut().remove::<RouteCtx>();
        if let Some(ctx) = cell.into_inner() {
            self.shared.pool.release(ctx);
        }
        result
    }

    // Compose the middleware stack once around the routing terminal. After
    // this the stack is immutable.
    fn freeze(&mut self) {
        if self.chain.is_none() {
            let terminal: ArcHandler = Arc::new(RouteHttp {
                shared: Arc::clone(&self.shared),
            });
            self.chain = Some(chain(&self.middlewares, terminal));
        }
    }

    fn insert(&mut self, method: MethodMask, pattern: &str, handler: ArcHandler) {
        self.freeze();
        debug!(pattern, method = ?method, "route registered");
        write(&self.shared.tree).insert_route(method, pattern, handler);
    }

    fn mount_inner(&mut self, group_mws: &[Middleware], pattern: &str, target: MountTarget) {
        {
            let tree = read(&self.shared.tree);
            if tree.find_pattern(&format!("{pattern}*")) || tree.find_pattern(&format!("{pattern}/*"))
            {
                panic!("switchyard: attempting to mount a handler on an existing path '{pattern}'");
            }
        }

        let (target_handler, subroutes): (ArcHandler, Option<Arc<Mux>>) = match target {
            MountTarget::Router(child) => {
                // hand the parent's fallbacks down unless the child set its own
                if read(&child.shared.not_found).is_none() {
                    if let Some(h) = read(&self.shared.not_found).clone() {
                        child.install_not_found(h);
                    }
                }
                if read(&child.shared.method_not_allowed).is_none() {
                    if let Some(h) = read(&self.shared.method_not_allowed).clone() {
                        child.install_method_not_allowed(h);
                    }
                }
                let child = Arc::new(child);
                let handler: ArcHandler = child.clone();
                (handler, Some(child))
            }
            MountTarget::Handler(h) => (h, None),
        };

        // scope the routing path before re-entering the mounted handler:
        // the remainder captured by the mount wildcard becomes the child's
        // residual routing path
        let inner = target_handler;
        let mount_handler: ArcHandler = Arc::new(move |w: &mut ResponseWriter, req: &mut Request| {
            if let Some(cell) = route_context(req) {
                let mut ctx = cell.lock();
                let next = next_route_path(&ctx);
                ctx.route_path = Some(next);
            }
            inner.call(w, req)
        });
        let mount_handler = chain(group_mws, mount_handler);

        debug!(pattern, "mounting sub-router");

        let mut pattern = pattern.to_string();
        if !pattern.ends_with('/') {
            // the mount point itself and its bare trailing slash both
            // forward into the child
            self.insert(
                MethodMask::ALL | MethodMask::STUB,
                &pattern,
                mount_handler.clone(),
            );
            self.insert(
                MethodMask::ALL | MethodMask::STUB,
                &format!("{pattern}/"),
                mount_handler.clone(),
            );
            pattern.push('/');
        }
        pattern.push('*');

        let mut method = MethodMask::ALL;
        if subroutes.is_some() {
            method = method | MethodMask::STUB;
        }

        self.freeze();
        let mut tree = write(&self.shared.tree);
        let node = tree.insert_route(method, &pattern, mount_handler);
        node.subroutes = subroutes;
    }

    fn install_not_found(&self, handler: ArcHandler) {
        *write(&self.shared.not_found) = Some(handler.clone());

        let subs = {
            let mut out = Vec::new();
            read(&self.shared.tree).collect_subrouters(&mut out);
            out
        };
        for sub in subs {
            if read(&sub.shared.not_found).is_none() {
                sub.install_not_found(handler.clone());
            }
        }
    }

    fn install_method_not_allowed(&self, handler: ArcHandler) {
        *write(&self.shared.method_not_allowed) = Some(handler.clone());

        let subs = {
            let mut out = Vec::new();
            read(&self.shared.tree).collect_subrouters(&mut out);
            out
        };
        for sub in subs {
            if read(&sub.shared.method_not_allowed).is_none() {
                sub.install_method_not_allowed(handler.clone());
            }
        }
    }
}

impl Default for Mux {
    fn default() -> Self {
        Mux::new()
    }
}

impl Router for Mux {
    fn register(&mut self, method: MethodMask, pattern: &str, handler: ArcHandler) {
        self.insert(method, pattern, handler);
    }
}

impl Handler for Mux {
    fn call(&self, w: &mut ResponseWriter, req: &mut Request) -> Result<(), Error> {
        self.dispatch(None, w, req)
    }
}

/// The routing terminal at the bottom of the frozen middleware chain:
/// resolves path and method from the routing context, walks the trie and
/// invokes the endpoint or the appropriate fallback.
struct RouteHttp {
    shared: Arc<Shared>,
}

impl Handler for RouteHttp {
    fn call(&self, w: &mut ResponseWriter, req: &mut Request) -> Result<(), Error> {
        let cell = route_context(req)
            .expect("switchyard: routing context missing from request during dispatch");

        let (path, mask) = {
            let mut ctx = cell.lock();
            // prefer the residual path a parent mount handed down
            let path = match &ctx.route_path {
                Some(p) => p.clone(),
                None => req.uri().path().to_string(),
            };
            if ctx.route_method.is_none() {
                ctx.route_method = Some(req.method().clone());
            }
            let mask = ctx
                .route_method
                .as_ref()
                .and_then(MethodMask::from_method);
            (path, mask)
        };

        // unrecognised request methods resolve to the 405 fallback
        let Some(mask) = mask else {
            debug!(method = %req.method(), "unsupported http method");
            return self.shared.method_not_allowed_handler().call(w, req);
        };

        let found = {
            let mut ctx = cell.lock();
            read(&self.shared.tree).find_route(&mut ctx, mask, &path)
        };

        match found {
            Some((handler, _)) => handler.call(w, req),
            None => {
                if cell.lock().method_not_allowed {
                    self.shared.method_not_allowed_handler().call(w, req)
                } else {
                    debug!(path = %path, "no route matched");
                    self.shared.not_found_handler().call(w, req)
                }
            }
        }
    }
}

/// Residual routing path for a mounted handler: `/` plus whatever the mount
/// wildcard captured, when the last capture was a wildcard.
fn next_route_path(ctx: &RouteContext) -> String {
    let mut path = String::from("/");
    let params = &ctx.route_params;
    if let (Some(key), Some(value)) = (params.keys.last(), params.values.last()) {
        if key == "*" {
            path.push_str(value);
        }
    }
    path
}

/// Inline sub-multiplexer sharing its parent's trie and context pool while
/// owning a private middleware stack. Created by [`Mux::with`] and
/// [`Mux::group`]; the extra middleware wraps each endpoint registered
/// through it, after the parent's own stack.
pub struct InlineMux<'a> {
    parent: &'a mut Mux,
    middlewares: Vec<Middleware>,
    routed: bool,
}

impl InlineMux<'_> {
    /// Append a middleware to this group's private stack. Panics once a
    /// route has been registered through the group.
    pub fn use_middleware<M>(&mut self, mw: M)
    where
        M: Fn(ArcHandler) -> ArcHandler + Send + Sync + 'static,
    {
        if self.routed {
            panic!("switchyard: all middlewares must be registered before routes on a mux");
        }
        self.middlewares.push(Arc::new(mw));
    }

    /// A further inline group extending this group's middleware stack.
    pub fn with<M>(&mut self, mw: M) -> InlineMux<'_>
    where
        M: Fn(ArcHandler) -> ArcHandler + Send + Sync + 'static,
    {
        let mut middlewares = self.middlewares.clone();
        middlewares.push(Arc::new(mw));
        InlineMux {
            parent: &mut *self.parent,
            middlewares,
            routed: false,
        }
    }

    /// A nested group inheriting a copy of this group's middleware stack.
    pub fn group(&mut self, f: impl FnOnce(&mut InlineMux<'_>)) {
        let mut inline = InlineMux {
            parent: &mut *self.parent,
            middlewares: self.middlewares.clone(),
            routed: false,
        };
        f(&mut inline);
    }

    /// Like [`Mux::route`], with this group's middleware wrapped around the
    /// mount.
    pub fn route(&mut self, pattern: &str, f: impl FnOnce(&mut Mux)) {
        let mut sub = Mux::new();
        f(&mut sub);
        self.mount(pattern, sub);
    }

    /// Like [`Mux::mount`], with this group's middleware wrapped around the
    /// mount.
    pub fn mount(&mut self, pattern: &str, child: Mux) {
        self.routed = true;
        let middlewares = self.middlewares.clone();
        self.parent
            .mount_inner(&middlewares, pattern, MountTarget::Router(child));
    }

    /// Like [`Mux::mount_handler`], with this group's middleware wrapped
    /// around the mount.
    pub fn mount_handler(&mut self, pattern: &str, handler: impl Handler + 'static) {
        self.routed = true;
        let middlewares = self.middlewares.clone();
        self.parent
            .mount_inner(&middlewares, pattern, MountTarget::Handler(Arc::new(handler)));
    }

    /// Install a not-found fallback on the parent mux, wrapped in this
    /// group's middleware stack.
    pub fn not_found<F>(&mut self, f: F)
    where
        F: Fn(&mut ResponseWriter, &mut Request) -> Result<(), Error> + Send + Sync + 'static,
    {
        let wrapped = chain(&self.middlewares, Arc::new(f));
        self.parent.install_not_found(wrapped);
    }

    /// Install a method-not-allowed fallback on the parent mux, wrapped in
    /// this group's middleware stack.
    pub fn method_not_allowed<F>(&mut self, f: F)
    where
        F: Fn(&mut ResponseWriter, &mut Request) -> Result<(), Error> + Send + Sync + 'static,
    {
        let wrapped = chain(&self.middlewares, Arc::new(f));
        self.parent.install_method_not_allowed(wrapped);
    }
}

impl Router for InlineMux<'_> {
    fn register(&mut self, method: MethodMask, pattern: &str, handler: ArcHandler) {
        self.routed = true;
        let handler = chain(&self.middlewares, handler);
        self.parent.insert(method, pattern, handler);
    }
}
