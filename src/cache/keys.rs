//! Cache key definitions.

use std::fmt;

use crate::ssr::ViewerId;

/// Identifies one cached render: the viewer it was produced for and the URL it answers.
///
/// Viewer scoping keeps one user's personalized document away from everyone else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub viewer: ViewerId,
    pub url: String,
}

impl CacheKey {
    pub fn new(viewer: ViewerId, url: impl Into<String>) -> Self {
        Self {
            viewer,
            url: url.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.viewer, self.url)
    }
}
