//! Which requests the SSR pipeline takes part in.

use super::options::ServerOptions;

/// Paths that always bypass server rendering.
pub const EXCLUDED_PATHS: &[&str] = &[
    "/favicon.ico",
    "/robots.txt",
    "/app.manifest",
    "/service-worker.js",
    "/graphql",
    "/graphiql",
];

/// Prefix of the real-time transport endpoint.
pub const DEFAULT_RESERVED_PREFIXES: &[&str] = &["/sockjs/"];

/// Why a request is handed straight to the downstream handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bypass {
    Infrastructure,
    Reserved,
    Disabled,
}

impl Bypass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure",
            Self::Reserved => "reserved",
            Self::Disabled => "disabled",
        }
    }
}

/// Non-document route prefixes claimed by other handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    reserved_prefixes: Vec<String>,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVED_PREFIXES.iter().map(|p| (*p).to_string()))
    }
}

impl RoutePolicy {
    pub fn new(reserved_prefixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            reserved_prefixes: reserved_prefixes.into_iter().collect(),
        }
    }

    pub fn reserved_prefixes(&self) -> &[String] {
        &self.reserved_prefixes
    }

    /// Classify `path`; `None` means the pipeline handles the request.
    pub fn classify(&self, path: &str, server: &ServerOptions) -> Option<Bypass> {
        if EXCLUDED_PATHS.contains(&path) {
            return Some(Bypass::Infrastructure);
        }
        if self
            .reserved_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return Some(Bypass::Reserved);
        }
        if server.is_ssr_disabled_for(path) {
            return Some(Bypass::Disabled);
        }
        None
    }
}
