//! Response sink
//!
//! The buffered response writer handlers receive. It accumulates status,
//! headers and body in memory; the boundary adapter turns it into an
//! `http::Response` once the handler chain has finished.

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

/// In-memory response sink passed to every handler.
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    wrote_status: bool,
}

impl ResponseWriter {
    pub fn new() -> Self {
        ResponseWriter {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            wrote_status: false,
        }
    }

    /// Set the response status. Only the first call takes effect; later
    /// calls are ignored, matching the usual response-writer contract.
    pub fn write_status(&mut self, status: StatusCode) {
        if !self.wrote_status {
            self.status = status;
            self.wrote_status = true;
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether a status has been explicitly written yet.
    pub fn status_written(&self) -> bool {
        self.wrote_status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Convenience header setter for string pairs. Invalid names or values
    /// are dropped silently, like a late header write on a live connection.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
    }

    /// Append bytes to the response body. Implies a 200 status if none has
    /// been written yet.
    pub fn write(&mut self, chunk: &[u8]) {
        if !self.wrote_status {
            self.write_status(StatusCode::OK);
        }
        self.body.extend_from_slice(chunk);
    }

    /// Append a string to the response body.
    pub fn write_str(&mut self, chunk: &str) {
        self.write(chunk.as_bytes());
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Discard any buffered body while keeping status and headers. Used by
    /// middleware such as the HEAD rewrite that must suppress the payload.
    pub fn clear_body(&mut self) {
        self.body.clear();
    }

    /// Consume the writer into an `http::Response`.
    pub fn into_response(self) -> http::Response<Bytes> {
        let mut response = http::Response::new(self.body.freeze());
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        ResponseWriter::new()
    }
}

impl std::io::Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        ResponseWriter::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
