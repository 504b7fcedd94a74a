//! Boundary adapter
//!
//! The thin bridge between the multiplexer and the host HTTP server. The
//! adapter is the one place where handler errors become bytes on the wire:
//! everywhere else they propagate as values.
//!
//! Two directions are covered: [`MuxService`] exposes a mux as a
//! `hyper::service::Service`, and [`from_response_fn`] / [`infallible`]
//! lift host-style handlers into the core [`Handler`] contract.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body::Body;
use http_body_util::{BodyExt, Full};
use hyper::service::Service;
use tracing::debug;

use crate::error::Error;
use crate::handler::{Handler, Request};
use crate::mux::Mux;
use crate::response::ResponseWriter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// `hyper` service wrapper around a built multiplexer.
///
/// Request bodies are buffered before dispatch; handlers are synchronous,
/// so the service resolves as soon as the handler chain returns. Handler
/// errors are converted into plain-text responses carrying the error's
/// status and message.
#[derive(Clone)]
pub struct MuxService {
    mux: Arc<Mux>,
}

impl MuxService {
    pub fn new(mux: Arc<Mux>) -> MuxService {
        MuxService { mux }
    }
}

impl Mux {
    /// Expose this mux as a host-ecosystem HTTP service.
    pub fn into_service(self: Arc<Self>) -> MuxService {
        MuxService::new(self)
    }
}

impl<B> Service<http::Request<B>> for MuxService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let mux = Arc::clone(&self.mux);
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let bytes = body.collect().await.map_err(Into::into)?.to_bytes();
            let mut request = http::Request::from_parts(parts, bytes);

            let mut writer = ResponseWriter::new();
            match mux.serve(&mut writer, &mut request) {
                Ok(()) => {
                    // HEAD responses carry headers only; stripping the
                    // payload here is the host server's job and we are
                    // standing in for it
                    if request.method() == http::Method::HEAD {
                        writer.clear_body();
                    }
                    Ok(writer.into_response().map(Full::new))
                }
                Err(err) => {
                    debug!(status = %err.status_code(), "handler error converted to response");
                    Ok(error_response(&err))
                }
            }
        })
    }
}

/// Render a handler error as a plain-text HTTP response.
pub fn error_response(err: &Error) -> http::Response<Full<Bytes>> {
    let body = format!("{}\n", err.message());
    http::Response::builder()
        .status(err.status_code())
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .expect("static response parts are valid")
}

/// Lift a host-style handler that builds a complete `http::Response` into
/// the core handler contract. The produced handler writes the response
/// into the sink and always reports success.
pub fn from_response_fn<F>(f: F) -> impl Handler
where
    F: Fn(&Request) -> http::Response<Bytes> + Send + Sync + 'static,
{
    move |w: &mut ResponseWriter, req: &mut Request| -> Result<(), Error> {
        let (parts, body) = f(req).into_parts();
        w.write_status(parts.status);
        w.headers_mut().extend(parts.headers);
        w.write(&body);
        Ok(())
    }
}

/// Lift a sink-writing closure with no outcome into the core handler
/// contract: it always reports success.
pub fn infallible<F>(f: F) -> impl Handler
where
    F: Fn(&mut ResponseWriter, &mut Request) + Send + Sync + 'static,
{
    move |w: &mut ResponseWriter, req: &mut Request| -> Result<(), Error> {
        f(w, req);
        Ok(())
    }
}
