//! Per-request context
//!
//! A [`Context`] is created for one dispatch, handed by `&mut` through the
//! before chain, the controller, the after chain and the global filters,
//! then committed into a [`Response`]. Nothing reaches the transport before
//! commit, so any stage can inspect or rewrite what earlier stages wrote.

use crate::handlers::static_files::mime_type;
use crate::handlers::websocket::Upgrade;
use crate::{Error, Method, Request, Response, Result, StatusCode};
use bytes::Bytes;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::path::Path;

/// Outbound response accumulator
#[derive(Debug, Clone, Default)]
pub struct Reply {
    status: Option<StatusCode>,
    headers: SmallVec<[(String, String); 8]>,
    body: Bytes,
    upgrade: Option<Upgrade>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status code
    pub fn status(&mut self, status: impl Into<StatusCode>) -> &mut Self {
        self.status = Some(status.into());
        self
    }

    /// Status set so far, if any
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status
    }

    /// Append a header
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace every value of a header
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self
    }

    /// Get a header value (case-insensitive)
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Replace the body
    pub fn body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = body.into();
        self
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Status and body, no content type
    pub fn raw(&mut self, status: impl Into<StatusCode>, body: impl Into<Bytes>) -> Result<()> {
        self.status(status).body(body);
        Ok(())
    }

    /// Plain text
    pub fn text(&mut self, status: impl Into<StatusCode>, body: impl Into<Bytes>) -> Result<()> {
        self.content_type("text/plain; charset=utf-8");
        self.raw(status, body)
    }

    /// HTML document
    pub fn html(&mut self, status: impl Into<StatusCode>, body: impl Into<Bytes>) -> Result<()> {
        self.content_type("text/html; charset=utf-8");
        self.raw(status, body)
    }

    /// Pre-encoded JSON
    pub fn json(&mut self, status: impl Into<StatusCode>, body: impl Into<Bytes>) -> Result<()> {
        self.content_type("application/json; charset=utf-8");
        self.raw(status, body)
    }

    /// Redirect with a 3xx status
    pub fn redirect(&mut self, status: impl Into<StatusCode>, location: &str) -> Result<()> {
        let status = status.into();
        if !(300..=308).contains(&status.0) {
            return Err(Error::InvalidRedirect(status.0));
        }
        self.status(status).set_header("location", location);
        Ok(())
    }

    /// Serve a file inline; a missing file or a directory yields 404
    pub fn file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => {
                let content = std::fs::read(path)?;
                self.content_type(mime_type(path));
                self.raw(StatusCode::OK, content)
            }
            _ => {
                self.status(StatusCode::NOT_FOUND).body(Bytes::new());
                Ok(())
            }
        }
    }

    /// Serve a file as an attachment
    pub fn download(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.file(path)?;
        if self.status == Some(StatusCode::OK) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.set_header("content-disposition", format!("attachment; filename=\"{}\"", name));
        }
        Ok(())
    }

    /// Hand the connection to a WebSocket session after commit
    pub fn upgrade(&mut self, upgrade: Upgrade) -> &mut Self {
        self.upgrade = Some(upgrade);
        self
    }

    /// Drop a pending upgrade and its handshake headers
    pub(crate) fn cancel_upgrade(&mut self) -> &mut Self {
        if self.upgrade.take().is_some() {
            for name in ["upgrade", "connection", "sec-websocket-accept"] {
                self.remove_header(name);
            }
        }
        self
    }

    // Only when a previous stage has not chosen one
    fn content_type(&mut self, value: &str) {
        if self.get_header("content-type").is_none() {
            self.headers.push(("content-type".to_string(), value.to_string()));
        }
    }

    /// Finalize into a response
    ///
    /// An unset status becomes 200 with a body and 204 without. HEAD replies
    /// keep their headers and drop the body, and never upgrade.
    pub fn commit(self, head: bool) -> Response {
        let status = self.status.unwrap_or(if self.body.is_empty() {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::OK
        });

        let mut res = Response::new(status);
        res.headers = self.headers;
        if head {
            if res.header("content-length").is_none() && !self.body.is_empty() {
                res.headers.push(("content-length".to_string(), self.body.len().to_string()));
            }
        } else {
            res.body = self.body;
            res.upgrade = self.upgrade;
        }
        res
    }
}

/// Request context
#[derive(Debug)]
pub struct Context {
    /// Inbound request
    pub request: Request,
    /// Outbound response, committed after the last stage
    pub response: Reply,
    params: HashMap<String, String>,
}

impl Context {
    /// Context without path parameters
    pub fn new(request: Request) -> Self {
        Self::with_params(request, HashMap::new())
    }

    pub(crate) fn with_params(request: Request, params: HashMap<String, String>) -> Self {
        Self {
            request,
            response: Reply::new(),
            params,
        }
    }

    /// Path parameter captured by the route pattern
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn method(&self) -> Method {
        self.request.method
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// Request header (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// Query string parameter
    pub fn query(&self, name: &str) -> Option<String> {
        self.request.query_param(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.request.body
    }
}
