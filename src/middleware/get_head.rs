//! HEAD to GET route fallback.

use std::sync::Arc;

use crate::context::{route_context, RouteContext};
use crate::handler::{ArcHandler, Request};
use crate::response::ResponseWriter;

/// Route HEAD requests through the matching GET handler when no explicit
/// HEAD route exists.
///
/// A look-ahead match runs against a temporary routing context so the real
/// context stays untouched; only when no HEAD route matches is the routing
/// method rewritten to GET for the rest of the dispatch.
pub fn get_head(next: ArcHandler) -> ArcHandler {
    Arc::new(move |w: &mut ResponseWriter, req: &mut Request| {
        if req.method() == http::Method::HEAD {
            if let Some(cell) = route_context(req) {
                let (route_path, routes) = {
                    let ctx = cell.lock();
                    let path = ctx
                        .route_path
                        .clone()
                        .unwrap_or_else(|| req.uri().path().to_string());
                    (path, ctx.routes.clone())
                };

                if let Some(routes) = routes {
                    // temporary context for the look-ahead before routing
                    let mut probe = RouteContext::new();
                    if !routes.match_route(&mut probe, "HEAD", &route_path) {
                        let mut ctx = cell.lock();
                        ctx.route_method = Some(http::Method::GET);
                        ctx.route_path = Some(route_path);
                    }
                }
            }
        }
        next.call(w, req)
    })
}
