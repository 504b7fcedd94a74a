//! switchyard
//!
//! A composable HTTP request multiplexer: a radix-trie router with named
//! path parameters, middleware stacks, inline route groups and mountable
//! sub-routers. Built on the `http` type family and bridged to hyper-based
//! servers through a thin boundary adapter.
//!
//! ```
//! use std::sync::Arc;
//! use switchyard::{Mux, Router, Request, ResponseWriter, url_param};
//!
//! let mut mux = Mux::new();
//! mux.get("/ping/{id}", |w: &mut ResponseWriter, r: &mut Request| {
//!     let id = url_param(r, "id").unwrap_or_default();
//!     w.write_str(&format!("pong {id}"));
//!     Ok(())
//! });
//! let mux = Arc::new(mux);
//!
//! let mut w = ResponseWriter::new();
//! let mut req = http::Request::builder()
//!     .uri("/ping/7")
//!     .body(bytes::Bytes::new())
//!     .unwrap();
//! mux.serve(&mut w, &mut req).unwrap();
//! assert_eq!(w.body(), b"pong 7");
//! ```

pub mod adapter;
pub mod context;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod mux;
pub mod response;
mod tree;

pub use adapter::{error_response, from_response_fn, infallible, MuxService};
pub use context::{route_context, route_patterns, url_param, RouteContext, RouteCtx, RouteParams};
pub use error::Error;
pub use handler::{ArcHandler, Handler, Middleware, Request};
pub use mux::{InlineMux, Mux, Router};
pub use response::ResponseWriter;
pub use tree::{MethodMask, RouteInfo};
