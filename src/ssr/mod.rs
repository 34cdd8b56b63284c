//! Server-side rendering middleware.
//!
//! [`ssr_layer`] takes part in document requests: it resolves the route,
//! renders the matched tree (or replays a cached render), lets the downstream
//! handler produce the HTML shell, and patches the rendered markup and
//! hydration data into the first document chunk of the response.

pub mod context;
pub mod dispatch;
pub mod document;
pub mod engine;
pub mod env;
pub mod error;
pub mod interceptor;
pub mod options;
pub mod pipeline;
pub mod policy;
pub mod render;
pub mod routes;
pub mod sidecar;

pub use context::{HydrationPayload, RenderContext};
pub use dispatch::{NOT_FOUND_BODY, dispatch};
pub use engine::{
    AnonymousViewers, Component, History, RedirectTarget, RenderEngine, RenderTree, RouteMatch,
    RouteMatcher, ViewerResolver,
};
pub use env::{ANONYMOUS_VIEWER, RequestEnv, ViewerId};
pub use error::{BoxError, ConfigurationError, RenderError, RouteResolutionError};
pub use interceptor::{ResponseInterceptor, Splice};
pub use options::{ClientOptions, RootElementAttributes, ServerOptions};
pub use pipeline::{SsrOutcome, SsrState, ssr_layer};
pub use policy::{Bypass, RoutePolicy};
pub use render::{RenderOutcome, Renderer};
pub use routes::{RedirectDefinition, RouteDefinition, StaticRoutes};
pub use sidecar::{DEHYDRATED_INITIAL_DATA, FAST_RENDER_DATA, PendingResponse, Sidecars};
