//! HTTP surface of the server binary: a document shell behind the SSR middleware.

mod middleware;
mod shell;

pub use middleware::RequestContext;
pub use shell::{PlaceholderEngine, ShellState};

use axum::{Router, middleware as axum_middleware, routing::get};

use crate::ssr::{SsrState, ssr_layer};

use self::middleware::{log_responses, set_request_context};
use self::shell::{robots_txt, serve_shell};

/// Serve `shell` for every document path, with server rendering layered in front.
pub fn build_router(ssr: SsrState, shell: ShellState) -> Router {
    Router::new()
        .route("/robots.txt", get(robots_txt))
        .fallback(serve_shell)
        .with_state(shell)
        .layer(axum_middleware::from_fn_with_state(ssr, ssr_layer))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
