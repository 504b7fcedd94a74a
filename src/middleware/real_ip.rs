//! Client address recovery from reverse-proxy headers.

use std::sync::Arc;

use crate::handler::{ArcHandler, Request};
use crate::response::ResponseWriter;

/// The client address as reported by a trusted reverse proxy, attached to
/// the request's extension map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealIp(pub String);

/// Record the client address from `True-Client-IP`, `X-Real-IP` or the
/// first entry of `X-Forwarded-For`, in that order.
///
/// Only use this behind a reverse proxy that sanitises these headers;
/// otherwise any client can spoof its address.
pub fn real_ip(next: ArcHandler) -> ArcHandler {
    Arc::new(move |w: &mut ResponseWriter, req: &mut Request| {
        if let Some(ip) = header_real_ip(req) {
            req.extensions_mut().insert(RealIp(ip));
        }
        next.call(w, req)
    })
}

fn header_real_ip(req: &Request) -> Option<String> {
    let headers = req.headers();

    let direct = headers
        .get("true-client-ip")
        .or_else(|| headers.get("x-real-ip"));
    if let Some(value) = direct {
        return value.to_str().ok().map(|s| s.trim().to_string());
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
}
