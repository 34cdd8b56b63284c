//! Route outcome dispatcher.
//!
//! Runs the route matcher for one URL and maps the terminal outcomes
//! (redirect, no match, resolution error) to responses that end the request.

use axum::http::StatusCode;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use crate::error::ErrorReport;

use super::engine::{History, RenderTree, RouteMatch, RouteMatcher};
use super::env::RequestEnv;
use super::options::ServerOptions;
use super::render::RenderOutcome;

const SOURCE: &str = "ssr::dispatch";

pub const NOT_FOUND_BODY: &str = "<h1>404 Not Found</h1>";

/// Resolve `url` to a render tree, or to the outcome that terminates the request.
pub async fn dispatch(
    routes: &dyn RouteMatcher,
    url: &str,
    server: &ServerOptions,
    env: &RequestEnv,
) -> Result<RenderTree, RenderOutcome> {
    let mut history = History::memory(url);
    if let Some(hook) = server.history_hook.as_ref() {
        history = hook(history);
    }

    match routes.resolve(&history, env).await {
        Ok(RouteMatch::Render(tree)) => Ok(tree),
        Ok(RouteMatch::Redirect(target)) => {
            debug!(url, location = %target.location(), "route redirects");
            Err(RenderOutcome::Redirect {
                location: target.location(),
            })
        }
        Ok(RouteMatch::NoMatch) => {
            debug!(url, "no route matched");
            Err(RenderOutcome::NotFound)
        }
        Err(cause) => {
            error!(url, error = %cause, "route resolution failed");
            Err(RenderOutcome::Error { cause })
        }
    }
}

impl IntoResponse for RenderOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect { location } => {
                (StatusCode::FOUND, [(LOCATION, location)]).into_response()
            }
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                [(CONTENT_TYPE, "text/html; charset=utf-8")],
                NOT_FOUND_BODY,
            )
                .into_response(),
            Self::Error { cause } => {
                let mut response =
                    (StatusCode::INTERNAL_SERVER_ERROR, cause.to_string()).into_response();
                ErrorReport::from_error(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, &cause)
                    .attach(&mut response);
                response
            }
            Self::Rendered { markup, .. } => (
                StatusCode::OK,
                [(CONTENT_TYPE, "text/html; charset=utf-8")],
                markup,
            )
                .into_response(),
        }
    }
}
