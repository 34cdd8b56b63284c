//! Response stream interceptor.
//!
//! Wraps the downstream response body so the first data chunk gets one
//! chance to be rewritten. Later chunks, and a first chunk that does not
//! open an HTML document, are forwarded untouched.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::CONTENT_LENGTH;
use axum::response::Response;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::cache::{CacheKey, RenderCache};

use super::document::{is_document_start, patch_document};
use super::options::{ClientOptions, ServerOptions};
use super::sidecar::Sidecars;

/// What to put into the document when the first chunk arrives.
pub enum Splice {
    /// Patch the document with freshly rendered markup, optionally storing the result.
    Render {
        markup: String,
        sidecars: Sidecars,
        client: Arc<ClientOptions>,
        server: Arc<ServerOptions>,
        store: Option<(Arc<RenderCache>, CacheKey)>,
    },
    /// Replace the document with a previously patched copy.
    Replay(Bytes),
}

pub struct ResponseInterceptor {
    splice: Splice,
    first_seen: bool,
}

impl ResponseInterceptor {
    pub fn new(splice: Splice) -> Self {
        Self {
            splice,
            first_seen: false,
        }
    }

    /// Whether the one rewrite opportunity has been used.
    pub fn first_seen(&self) -> bool {
        self.first_seen
    }

    /// Transform one outgoing chunk.
    pub fn intercept(&mut self, chunk: Bytes) -> Bytes {
        if self.first_seen || chunk.is_empty() {
            return chunk;
        }
        self.first_seen = true;

        if !is_document_start(&chunk) {
            debug!(len = chunk.len(), "first chunk is not a document, passing through");
            return chunk;
        }

        match &self.splice {
            Splice::Replay(document) => document.clone(),
            Splice::Render {
                markup,
                sidecars,
                client,
                server,
                store,
            } => {
                let Ok(document) = std::str::from_utf8(&chunk) else {
                    warn!("document chunk is not valid UTF-8, passing through");
                    return chunk;
                };

                match patch_document(document, markup, sidecars, client, server) {
                    Ok(patched) => {
                        let patched = Bytes::from(patched);
                        if let Some((cache, key)) = store {
                            cache.set(key.clone(), patched.clone());
                            debug!(cache = "render", key = %key, "stored patched document");
                        }
                        patched
                    }
                    Err(err) => {
                        warn!(error = %err, "document patch failed, passing through");
                        chunk
                    }
                }
            }
        }
    }

    /// Install the interceptor on `response`'s body.
    pub fn install(self, response: Response) -> Response {
        let (mut parts, body) = response.into_parts();
        // The patched body no longer matches the original length.
        parts.headers.remove(CONTENT_LENGTH);

        let mut interceptor = self;
        let stream = body
            .into_data_stream()
            .map(move |frame| frame.map(|chunk| interceptor.intercept(chunk)));

        Response::from_parts(parts, Body::from_stream(stream))
    }
}
