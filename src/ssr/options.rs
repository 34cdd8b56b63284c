//! Startup configuration for the pipeline, read-only while serving.
//!
//! Data-valued fields come from the `[ssr]` config section; hooks are
//! attached in code with the `with_*` builders.

use std::fmt;
use std::sync::Arc;

use axum::http::request::Parts;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::engine::{Component, History, RenderTree};
use super::error::BoxError;
use super::sidecar::PendingResponse;

pub const DEFAULT_ROOT_ELEMENT: &str = "react-app";
pub const DEFAULT_ROOT_ELEMENT_TYPE: &str = "div";

pub type WrapperHook = Arc<dyn Fn(RenderTree) -> RenderTree + Send + Sync>;
pub type HtmlHook = Arc<dyn Fn(String) -> String + Send + Sync>;
pub type RenderHook =
    Arc<dyn Fn(&Parts, &mut PendingResponse) -> Result<(), BoxError> + Send + Sync>;
pub type DehydrateHook = Arc<dyn Fn() -> Result<Value, BoxError> + Send + Sync>;
pub type HistoryHook = Arc<dyn Fn(History) -> History + Send + Sync>;
pub type DataFetch = BoxFuture<'static, Result<(), BoxError>>;
pub type FetchDataHook = Arc<dyn Fn(&[Component]) -> Vec<DataFetch> + Send + Sync>;

/// Extra attributes on the root element.
///
/// Accepts a single `["name", "value"]` pair or a list of pairs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RootElementAttributes {
    List(Vec<(String, String)>),
    Pair(String, String),
}

impl RootElementAttributes {
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        match self {
            Self::List(pairs) => pairs
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str()))
                .collect(),
            Self::Pair(name, value) => vec![(name.as_str(), value.as_str())],
        }
    }
}

/// Options shared with the client bundle.
#[derive(Clone)]
pub struct ClientOptions {
    pub root_element: String,
    pub root_element_type: String,
    pub root_element_attributes: Option<RootElementAttributes>,
    pub wrapper_hook: Option<WrapperHook>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            root_element: DEFAULT_ROOT_ELEMENT.to_string(),
            root_element_type: DEFAULT_ROOT_ELEMENT_TYPE.to_string(),
            root_element_attributes: None,
            wrapper_hook: None,
        }
    }
}

impl ClientOptions {
    pub fn with_wrapper_hook(
        mut self,
        hook: impl Fn(RenderTree) -> RenderTree + Send + Sync + 'static,
    ) -> Self {
        self.wrapper_hook = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("root_element", &self.root_element)
            .field("root_element_type", &self.root_element_type)
            .field("root_element_attributes", &self.root_element_attributes)
            .field("wrapper_hook", &self.wrapper_hook.is_some())
            .finish()
    }
}

impl From<&crate::config::SsrSettings> for ClientOptions {
    fn from(settings: &crate::config::SsrSettings) -> Self {
        Self {
            root_element: settings.root_element.clone(),
            root_element_type: settings.root_element_type.clone(),
            root_element_attributes: settings.root_element_attributes.clone(),
            wrapper_hook: None,
        }
    }
}

/// Server-side render behaviour.
#[derive(Clone, Default)]
pub struct ServerOptions {
    pub disabled_ssr_paths: Vec<String>,
    pub disable_ssr: bool,
    pub loading_screen: Option<String>,
    pub should_cache: bool,
    pub dont_move_scripts: bool,
    pub props: Map<String, Value>,
    pub html_hook: Option<HtmlHook>,
    pub pre_render: Option<RenderHook>,
    pub post_render: Option<RenderHook>,
    pub dehydrate_hook: Option<DehydrateHook>,
    pub history_hook: Option<HistoryHook>,
    pub fetch_data_hook: Option<FetchDataHook>,
}

impl ServerOptions {
    pub fn with_html_hook(mut self, hook: impl Fn(String) -> String + Send + Sync + 'static) -> Self {
        self.html_hook = Some(Arc::new(hook));
        self
    }

    pub fn with_pre_render(
        mut self,
        hook: impl Fn(&Parts, &mut PendingResponse) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.pre_render = Some(Arc::new(hook));
        self
    }

    pub fn with_post_render(
        mut self,
        hook: impl Fn(&Parts, &mut PendingResponse) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.post_render = Some(Arc::new(hook));
        self
    }

    pub fn with_dehydrate_hook(
        mut self,
        hook: impl Fn() -> Result<Value, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.dehydrate_hook = Some(Arc::new(hook));
        self
    }

    pub fn with_history_hook(
        mut self,
        hook: impl Fn(History) -> History + Send + Sync + 'static,
    ) -> Self {
        self.history_hook = Some(Arc::new(hook));
        self
    }

    pub fn with_fetch_data_hook(
        mut self,
        hook: impl Fn(&[Component]) -> Vec<DataFetch> + Send + Sync + 'static,
    ) -> Self {
        self.fetch_data_hook = Some(Arc::new(hook));
        self
    }

    /// Whether `path` starts with one of the configured SSR-disabled prefixes.
    pub fn is_ssr_disabled_for(&self, path: &str) -> bool {
        self.disabled_ssr_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("disabled_ssr_paths", &self.disabled_ssr_paths)
            .field("disable_ssr", &self.disable_ssr)
            .field("loading_screen", &self.loading_screen.is_some())
            .field("should_cache", &self.should_cache)
            .field("dont_move_scripts", &self.dont_move_scripts)
            .field("props", &self.props)
            .field("html_hook", &self.html_hook.is_some())
            .field("pre_render", &self.pre_render.is_some())
            .field("post_render", &self.post_render.is_some())
            .field("dehydrate_hook", &self.dehydrate_hook.is_some())
            .field("history_hook", &self.history_hook.is_some())
            .field("fetch_data_hook", &self.fetch_data_hook.is_some())
            .finish()
    }
}

impl From<&crate::config::SsrSettings> for ServerOptions {
    fn from(settings: &crate::config::SsrSettings) -> Self {
        Self {
            disabled_ssr_paths: settings.disabled_paths.clone(),
            disable_ssr: settings.disable_ssr,
            loading_screen: settings.loading_screen.clone(),
            should_cache: settings.should_cache,
            dont_move_scripts: settings.dont_move_scripts,
            props: settings.props.clone(),
            ..Self::default()
        }
    }
}
