//! Handler and middleware contract
//!
//! A handler is anything that can serve a request: it receives the response
//! sink and the request, and returns either success or a structured
//! [`Error`](crate::Error) that unwinds back to the boundary adapter. A
//! middleware wraps an existing handler and returns a new one; stacks
//! compose right-to-left so the first middleware registered sees the
//! request first.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Error;
use crate::response::ResponseWriter;

/// The request type routed by this crate. Bodies are fully buffered; body
/// parsing and streaming stay with the host server.
pub type Request = http::Request<Bytes>;

/// Capability contract for request handlers.
///
/// Plain closures with the same signature implement `Handler` automatically,
/// so `mux.get("/hi", |w, r| { ... })` works without any wrapper type.
pub trait Handler: Send + Sync {
    fn call(&self, w: &mut ResponseWriter, req: &mut Request) -> Result<(), Error>;
}

/// Shared, type-erased handler. Endpoints, composed chains and middleware
/// all traffic in this form.
pub type ArcHandler = Arc<dyn Handler>;

impl<F> Handler for F
where
    F: Fn(&mut ResponseWriter, &mut Request) -> Result<(), Error> + Send + Sync,
{
    fn call(&self, w: &mut ResponseWriter, req: &mut Request) -> Result<(), Error> {
        self(w, req)
    }
}

/// A middleware: a function from the next handler to a wrapping handler.
pub type Middleware = Arc<dyn Fn(ArcHandler) -> ArcHandler + Send + Sync>;

/// Compose a middleware stack around an endpoint handler.
///
/// Composition folds right-to-left: `chain(&[m1, m2], h)` yields
/// `m1(m2(h))`, so `m1` is entered first and exited last.
pub(crate) fn chain(middlewares: &[Middleware], endpoint: ArcHandler) -> ArcHandler {
    middlewares
        .iter()
        .rev()
        .fold(endpoint, |next, mw| mw(next))
}
