//! Heartbeat endpoint middleware useful for setting up a path like `/ping`
//! that load balancers or uptime probes can hit before any routing or ACL
//! middleware runs.

use std::sync::Arc;

use crate::handler::{ArcHandler, Request};
use crate::response::ResponseWriter;

/// Answer `GET <endpoint>` with a plain-text `.` and stop the chain; every
/// other request passes through.
pub fn heartbeat(endpoint: &'static str) -> impl Fn(ArcHandler) -> ArcHandler + Send + Sync {
    move |next: ArcHandler| {
        Arc::new(move |w: &mut ResponseWriter, req: &mut Request| {
            if req.method() == http::Method::GET && req.uri().path().eq_ignore_ascii_case(endpoint)
            {
                w.set_header("content-type", "text/plain");
                w.write_status(http::StatusCode::OK);
                w.write_str(".");
                return Ok(());
            }
            next.call(w, req)
        }) as ArcHandler
    }
}
