//! Panic recovery.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use http::StatusCode;
use tracing::error;

use crate::error::Error;
use crate::handler::{ArcHandler, Request};
use crate::response::ResponseWriter;

/// Catch a panic unwinding out of the downstream chain, log it, and turn it
/// into a 500 handler error. The core deliberately does not catch panics
/// itself; installing this middleware is the supported way to keep a worker
/// alive across a panicking handler.
pub fn recoverer(next: ArcHandler) -> ArcHandler {
    Arc::new(move |w: &mut ResponseWriter, req: &mut Request| {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match catch_unwind(AssertUnwindSafe(|| next.call(w, req))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let reason = panic_message(&payload);
                error!(method = %method, path = %path, panic = %reason, "handler panicked");
                Err(Error::from_status(StatusCode::INTERNAL_SERVER_ERROR))
            }
        }
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
