//! Shared helpers for the integration tests: build requests and dispatch
//! them against a mux the way the boundary adapter would, folding handler
//! errors into a status and plain-text body.

#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use switchyard::{Mux, Request, ResponseWriter};

pub fn request(method: &str, path: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(path)
        .body(Bytes::new())
        .expect("test request is valid")
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Serve a single request and render the outcome like the boundary adapter
/// does: successful handlers keep their written response, handler errors
/// become `status` plus `message\n`.
pub fn send(mux: &Arc<Mux>, method: &str, path: &str) -> Reply {
    let mut w = ResponseWriter::new();
    let mut req = request(method, path);
    match mux.serve(&mut w, &mut req) {
        Ok(()) => {
            let response = w.into_response();
            let body = String::from_utf8(response.body().to_vec()).expect("utf-8 body");
            Reply {
                status: response.status(),
                headers: response.headers().clone(),
                body,
            }
        }
        Err(err) => Reply {
            status: err.status_code(),
            headers: w.headers().clone(),
            body: format!("{}\n", err.message()),
        },
    }
}

pub fn body(mux: &Arc<Mux>, method: &str, path: &str) -> String {
    send(mux, method, path).body
}
