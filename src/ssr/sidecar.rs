//! Sidecar payloads: out-of-band data shipped with the document for the
//! client bootstrap to pick up on load.

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use axum::response::Response;
use serde_json::Value;

/// Key of the hydration payload collected by the render context.
pub const FAST_RENDER_DATA: &str = "fast-render-data";
/// Key of the payload produced by the dehydrate hook.
pub const DEHYDRATED_INITIAL_DATA: &str = "dehydrated-initial-data";

/// Named JSON payloads attached to one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sidecars(BTreeMap<String, Value>);

impl Sidecars {
    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Render every payload as an inert `<script>` element.
    pub fn to_html(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| {
                format!(
                    r#"<script type="text/inject-data" data-key="{}">{}</script>"#,
                    escape_attribute(key),
                    embed_json(value)
                )
            })
            .collect()
    }
}

/// Response-side handle given to the pre/post render hooks.
///
/// Everything recorded here is applied to the downstream response once it
/// has been produced.
#[derive(Debug, Default)]
pub struct PendingResponse {
    pub headers: HeaderMap,
    pub sidecars: Sidecars,
}

impl PendingResponse {
    pub fn apply(self, response: &mut Response) {
        response.headers_mut().extend(self.headers);
        if !self.sidecars.is_empty() {
            response.extensions_mut().insert(self.sidecars);
        }
    }
}

/// Serialize `value` so it cannot terminate the surrounding script element.
fn embed_json(value: &Value) -> String {
    value
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

pub(crate) fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
