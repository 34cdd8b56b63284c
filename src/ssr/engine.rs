//! Contracts of the external collaborators: route matcher, rendering engine,
//! and viewer resolution. The pipeline only ever calls them through these traits.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use super::env::{RequestEnv, ViewerId};
use super::error::{BoxError, RouteResolutionError};

/// One component of a matched route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    pub name: String,
    /// The component declares an asynchronous data-fetch contract.
    pub fetches_data: bool,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fetches_data: false,
        }
    }

    pub fn with_data_fetch(mut self) -> Self {
        self.fetches_data = true;
        self
    }
}

/// Input handed to the rendering engine for a matched route.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderTree {
    pub location: String,
    pub components: Vec<Component>,
    pub params: Map<String, Value>,
    pub props: Map<String, Value>,
}

impl RenderTree {
    pub fn new(location: impl Into<String>, components: Vec<Component>) -> Self {
        Self {
            location: location.into(),
            components,
            ..Self::default()
        }
    }

    /// Merge `extra` into the tree's props; `extra` wins on conflicts.
    pub fn merge_props(&mut self, extra: &Map<String, Value>) {
        for (key, value) in extra {
            self.props.insert(key.clone(), value.clone());
        }
    }

    pub fn components_with_data_fetch(&self) -> Vec<Component> {
        self.components
            .iter()
            .filter(|component| component.fetches_data)
            .cloned()
            .collect()
    }
}

/// In-memory navigation history seeded with the request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    entries: Vec<String>,
    index: usize,
}

impl History {
    pub fn memory(url: impl Into<String>) -> Self {
        Self {
            entries: vec![url.into()],
            index: 0,
        }
    }

    pub fn location(&self) -> &str {
        &self.entries[self.index]
    }

    /// Path component of the current location.
    pub fn pathname(&self) -> &str {
        let location = self.location();
        location
            .split_once(['?', '#'])
            .map_or(location, |(path, _)| path)
    }

    /// Query string of the current location, including the leading `?`.
    pub fn search(&self) -> &str {
        let location = self.location();
        let without_hash = location.split_once('#').map_or(location, |(rest, _)| rest);
        without_hash.find('?').map_or("", |idx| &without_hash[idx..])
    }

    pub fn push(&mut self, url: impl Into<String>) {
        self.entries.truncate(self.index + 1);
        self.entries.push(url.into());
        self.index = self.entries.len() - 1;
    }

    pub fn replace(&mut self, url: impl Into<String>) {
        self.entries[self.index] = url.into();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a redirecting route points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub pathname: String,
    pub search: String,
}

impl RedirectTarget {
    pub fn new(pathname: impl Into<String>, search: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            search: search.into(),
        }
    }

    /// Split a location such as `/foo?x=1` into path and query.
    pub fn parse(location: &str) -> Self {
        match location.find('?') {
            Some(idx) => Self::new(&location[..idx], &location[idx..]),
            None => Self::new(location, ""),
        }
    }

    /// Value for the `Location` header.
    pub fn location(&self) -> String {
        format!("{}{}", self.pathname, self.search)
    }
}

/// What the route matcher made of a URL.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteMatch {
    Render(RenderTree),
    Redirect(RedirectTarget),
    NoMatch,
}

#[async_trait]
pub trait RouteMatcher: Send + Sync {
    async fn resolve(
        &self,
        history: &History,
        env: &RequestEnv,
    ) -> Result<RouteMatch, RouteResolutionError>;
}

/// Turns a render tree into an HTML string.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn render_to_string(&self, tree: &RenderTree) -> Result<String, BoxError>;
}

/// Maps a login token to a viewer.
#[async_trait]
pub trait ViewerResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<ViewerId>;
}

/// Treats every request as anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousViewers;

#[async_trait]
impl ViewerResolver for AnonymousViewers {
    async fn resolve(&self, _token: &str) -> Option<ViewerId> {
        None
    }
}
