//! Trailing-slash normalisation.

use std::sync::Arc;

use http::StatusCode;

use crate::context::route_context;
use crate::handler::{ArcHandler, Request};
use crate::response::ResponseWriter;

/// Route `/path/` as `/path` by rewriting the routing path before lookup.
/// The request URI itself is left untouched.
pub fn strip_slashes(next: ArcHandler) -> ArcHandler {
    Arc::new(move |w: &mut ResponseWriter, req: &mut Request| {
        if let Some(cell) = route_context(req) {
            let mut ctx = cell.lock();
            let path = match &ctx.route_path {
                Some(p) => p.as_str(),
                None => req.uri().path(),
            };
            if path.len() > 1 && path.ends_with('/') {
                let stripped = path[..path.len() - 1].to_string();
                ctx.route_path = Some(stripped);
            }
        }
        next.call(w, req)
    })
}

/// Answer requests for `/path/` with a 301 redirect to `/path`, keeping the
/// query string.
pub fn redirect_slashes(next: ArcHandler) -> ArcHandler {
    Arc::new(move |w: &mut ResponseWriter, req: &mut Request| {
        let path = req.uri().path();
        if path.len() > 1 && path.ends_with('/') {
            let mut location = path[..path.len() - 1].to_string();
            if let Some(query) = req.uri().query() {
                location.push('?');
                location.push_str(query);
            }
            w.set_header("location", &location);
            w.write_status(StatusCode::MOVED_PERMANENTLY);
            return Ok(());
        }
        next.call(w, req)
    })
}
