//! Per-request environment: who is asking and with which headers.
//!
//! The environment is scoped to one request's future with a task-local, so
//! code deep inside route matching or rendering can read the viewer without
//! having it threaded through every call. Nothing here is process-wide.

use std::fmt;
use std::future::Future;

use axum::http::HeaderMap;

/// Sentinel rendered for requests without a resolved identity.
pub const ANONYMOUS_VIEWER: &str = "NOT_LOGGED_IN";

/// Resolved identity of the requester.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ViewerId {
    #[default]
    Anonymous,
    User(String),
}

impl ViewerId {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str(ANONYMOUS_VIEWER),
            Self::User(id) => f.write_str(id),
        }
    }
}

/// Identity and headers of the request being served.
#[derive(Debug, Clone, Default)]
pub struct RequestEnv {
    pub viewer: ViewerId,
    pub headers: HeaderMap,
}

impl RequestEnv {
    pub fn new(viewer: ViewerId, headers: HeaderMap) -> Self {
        Self { viewer, headers }
    }
}

tokio::task_local! {
    static REQUEST_ENV: RequestEnv;
}

/// Run `f` with `env` as the current request environment.
pub async fn scope<F>(env: RequestEnv, f: F) -> F::Output
where
    F: Future,
{
    REQUEST_ENV.scope(env, f).await
}

/// The environment of the request currently being served, if any.
pub fn current() -> Option<RequestEnv> {
    REQUEST_ENV.try_with(Clone::clone).ok()
}

/// The viewer of the request currently being served; anonymous outside a request.
pub fn current_viewer() -> ViewerId {
    REQUEST_ENV
        .try_with(|env| env.viewer.clone())
        .unwrap_or_default()
}
