//! HTTP proxying: URI routes the helper serves through the host, and
//! splitting response bodies into `HTTPRESPONSE` frames.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::handle::Handle;
use crate::messages::{HttpRequest, HttpResponse};

/// Maximum body bytes carried by one `HTTPRESPONSE` frame.
pub const HTTP_CHUNK_SIZE: usize = 1024;

/// Serves requests for one registered (method, URI) pair.
///
/// Runs on the I/O thread. A handler replies through
/// [`Handle::send_http_response`], possibly later from another thread for
/// streamed responses.
pub trait UriHandler: Send + Sync {
    fn handle(&self, ctx: &Handle, request: &HttpRequest) -> Result<()>;
}

impl<F> UriHandler for F
where
    F: Fn(&Handle, &HttpRequest) -> Result<()> + Send + Sync,
{
    fn handle(&self, ctx: &Handle, request: &HttpRequest) -> Result<()> {
        self(ctx, request)
    }
}

/// A registered route.
#[derive(Clone)]
pub struct UriRoute {
    pub auth_required: bool,
    handler: Arc<dyn UriHandler>,
}

impl UriRoute {
    pub fn handler(&self) -> Arc<dyn UriHandler> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for UriRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UriRoute")
            .field("auth_required", &self.auth_required)
            .finish_non_exhaustive()
    }
}

/// Routes keyed by (method, URI). Re-registering a pair replaces the route.
#[derive(Default, Debug)]
pub struct UriRegistry {
    routes: HashMap<(String, String), UriRoute>,
}

impl UriRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route, returning the one it replaced.
    pub fn insert(
        &mut self,
        method: impl Into<String>,
        uri: impl Into<String>,
        auth_required: bool,
        handler: Arc<dyn UriHandler>,
    ) -> Option<UriRoute> {
        self.routes.insert(
            (method.into(), uri.into()),
            UriRoute {
                auth_required,
                handler,
            },
        )
    }

    pub fn get(&self, method: &str, uri: &str) -> Option<&UriRoute> {
        self.routes.get(&(method.to_owned(), uri.to_owned()))
    }

    pub fn contains(&self, method: &str, uri: &str) -> bool {
        self.get(method, uri).is_some()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered (method, URI) pairs, sorted.
    pub fn routes(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.routes.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Split `body` into `HTTPRESPONSE` frames for request `req_id`.
///
/// Each non-empty [`HTTP_CHUNK_SIZE`] slice becomes one frame carrying only
/// content. Unless the caller is mid-stream (`stream` set and `finished`
/// clear) a closing frame follows with empty content, `result_code` and
/// `close_response` set. An empty body that is not closed yields no frames.
pub fn response_frames(
    req_id: u32,
    body: &Bytes,
    result_code: u32,
    stream: bool,
    finished: bool,
) -> Vec<HttpResponse> {
    let mut frames: Vec<HttpResponse> = (0..body.len())
        .step_by(HTTP_CHUNK_SIZE)
        .map(|start| {
            let end = (start + HTTP_CHUNK_SIZE).min(body.len());
            HttpResponse {
                req_id,
                content: Some(body.slice(start..end)),
                ..Default::default()
            }
        })
        .collect();

    if !stream || finished {
        frames.push(HttpResponse {
            req_id,
            content: Some(Bytes::new()),
            resultcode: Some(result_code),
            close_response: Some(true),
            ..Default::default()
        });
    }
    frames
}
