use thiserror::Error;

/// Boxed error returned by external collaborators and user hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The route matcher failed. Terminal for the request: answered with 500.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RouteResolutionError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl RouteResolutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A failure while producing markup. Logged and degraded to empty markup.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("rendering engine failed: {0}")]
    Engine(#[source] BoxError),
    #[error("`{hook}` hook failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("data fetch failed: {0}")]
    DataFetch(#[source] BoxError),
    #[error("failed to serialize `{key}` payload: {source}")]
    Serialize {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("render panicked: {0}")]
    Panicked(String),
}

impl RenderError {
    pub fn hook(hook: &'static str, source: BoxError) -> Self {
        Self::Hook { hook, source }
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }
}

/// A capability the render needs is not configured. Logged; the step is skipped.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error(
        "components {components:?} declare data fetching but no fetch-data hook is configured"
    )]
    MissingFetchDataHook { components: Vec<String> },
}
