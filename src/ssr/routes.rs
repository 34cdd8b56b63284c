//! Static route table loaded from configuration.
//!
//! Paths are matched segment by segment; a `:name` segment captures the
//! corresponding path segment into the render tree's params.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::engine::{Component, History, RedirectTarget, RenderTree, RouteMatch, RouteMatcher};
use super::env::RequestEnv;
use super::error::RouteResolutionError;

/// One `[[routes]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteDefinition {
    pub path: String,
    pub components: Vec<String>,
    /// Components that declare an asynchronous data fetch.
    #[serde(default)]
    pub fetch_data: Vec<String>,
}

/// One `[[redirects]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedirectDefinition {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default)]
pub struct StaticRoutes {
    routes: Vec<RouteDefinition>,
    redirects: Vec<RedirectDefinition>,
}

impl StaticRoutes {
    pub fn new(routes: Vec<RouteDefinition>, redirects: Vec<RedirectDefinition>) -> Self {
        Self { routes, redirects }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn resolve_path(&self, pathname: &str) -> RouteMatch {
        if let Some(redirect) = self.redirects.iter().find(|r| r.from == pathname) {
            return RouteMatch::Redirect(RedirectTarget::parse(&redirect.to));
        }

        for route in &self.routes {
            if let Some(params) = match_path(&route.path, pathname) {
                let components = route
                    .components
                    .iter()
                    .map(|name| {
                        let component = Component::new(name.as_str());
                        if route.fetch_data.contains(name) {
                            component.with_data_fetch()
                        } else {
                            component
                        }
                    })
                    .collect();
                let mut tree = RenderTree::new(pathname, components);
                tree.params = params;
                return RouteMatch::Render(tree);
            }
        }

        RouteMatch::NoMatch
    }
}

#[async_trait]
impl RouteMatcher for StaticRoutes {
    async fn resolve(
        &self,
        history: &History,
        _env: &RequestEnv,
    ) -> Result<RouteMatch, RouteResolutionError> {
        Ok(self.resolve_path(history.pathname()))
    }
}

fn match_path(pattern: &str, pathname: &str) -> Option<Map<String, Value>> {
    let pattern: Vec<&str> = segments(pattern).collect();
    let path: Vec<&str> = segments(pathname).collect();
    if pattern.len() != path.len() {
        return None;
    }

    let mut params = Map::new();
    for (expected, actual) in pattern.iter().zip(path) {
        match expected.strip_prefix(':') {
            Some(name) => {
                params.insert(name.to_string(), Value::String(actual.to_string()));
            }
            None if *expected == actual => {}
            None => return None,
        }
    }
    Some(params)
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}
