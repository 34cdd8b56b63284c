//! Pipeline entry: the axum middleware that decides participation for
//! every request and drives dispatch, render, and response patching.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, instrument};

use crate::cache::{CacheConfig, CacheKey, RenderCache};

use super::dispatch::dispatch;
use super::engine::{AnonymousViewers, RenderEngine, RouteMatcher, ViewerResolver};
use super::env::{self, RequestEnv, ViewerId};
use super::interceptor::{ResponseInterceptor, Splice};
use super::options::{ClientOptions, ServerOptions};
use super::policy::RoutePolicy;
use super::render::{RenderOutcome, Renderer};
use super::sidecar::PendingResponse;

pub const DEFAULT_LOGIN_COOKIE: &str = "meteor_login_token";

/// How [`ssr_layer`] handled a request, attached to the response as an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsrOutcome {
    Bypassed,
    /// Ended by dispatch: redirect, not found, or route error.
    Dispatched,
    Rendered,
    /// The render failed and the shell went out with an empty root.
    Degraded,
    CacheHit,
    /// A cached document existed but the downstream response was not a 200.
    CacheSkipped,
}

impl SsrOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bypassed => "bypassed",
            Self::Dispatched => "dispatched",
            Self::Rendered => "rendered",
            Self::Degraded => "degraded",
            Self::CacheHit => "cache_hit",
            Self::CacheSkipped => "cache_skipped",
        }
    }

    fn attach(self, mut response: Response) -> Response {
        response.extensions_mut().insert(self);
        response
    }
}

/// Shared state for [`ssr_layer`].
#[derive(Clone)]
pub struct SsrState {
    pub client: Arc<ClientOptions>,
    pub server: Arc<ServerOptions>,
    pub routes: Arc<dyn RouteMatcher>,
    pub renderer: Renderer,
    pub viewers: Arc<dyn ViewerResolver>,
    pub cache: Arc<RenderCache>,
    pub policy: Arc<RoutePolicy>,
    pub login_cookie: Arc<str>,
}

impl SsrState {
    pub fn new(
        routes: Arc<dyn RouteMatcher>,
        engine: Arc<dyn RenderEngine>,
        client: ClientOptions,
        server: ServerOptions,
        cache: &CacheConfig,
    ) -> Self {
        let client = Arc::new(client);
        let server = Arc::new(server);
        Self {
            renderer: Renderer::new(engine, Arc::clone(&client), Arc::clone(&server)),
            client,
            server,
            routes,
            viewers: Arc::new(AnonymousViewers),
            cache: Arc::new(RenderCache::new(cache)),
            policy: Arc::new(RoutePolicy::default()),
            login_cookie: Arc::from(DEFAULT_LOGIN_COOKIE),
        }
    }

    pub fn with_viewers(mut self, viewers: Arc<dyn ViewerResolver>) -> Self {
        self.viewers = viewers;
        self
    }

    pub fn with_policy(mut self, policy: RoutePolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn with_login_cookie(mut self, name: impl Into<String>) -> Self {
        self.login_cookie = Arc::from(name.into());
        self
    }

    /// Resolve the viewer from the login cookie; anonymous when absent or unknown.
    async fn resolve_viewer(&self, headers: &HeaderMap) -> ViewerId {
        let jar = CookieJar::from_headers(headers);
        let Some(token) = jar.get(&self.login_cookie) else {
            return ViewerId::Anonymous;
        };
        self.viewers
            .resolve(token.value())
            .await
            .unwrap_or_default()
    }
}

/// Server-render document requests.
///
/// Excluded paths go straight to `next`. Redirects, unmatched routes, and
/// route resolution failures end the request here without calling `next`.
/// Every other request calls `next` exactly once and has the first document
/// chunk of its response patched with the rendered markup.
///
/// A cache hit replays the stored document without rendering, so the
/// pre/post render hooks do not run and headers they would add are absent.
/// Only a 200 downstream response is replaced by the cached copy, and only a
/// render that did not fail is stored.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn ssr_layer(
    State(state): State<SsrState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(reason) = state.policy.classify(request.uri().path(), &state.server) {
        debug!(bypass = reason.as_str(), "skipping server render");
        return SsrOutcome::Bypassed.attach(next.run(request).await);
    }

    let viewer = state.resolve_viewer(request.headers()).await;
    let env = RequestEnv::new(viewer, request.headers().clone());

    env::scope(env.clone(), handle(state, env, request, next)).await
}

async fn handle(state: SsrState, env: RequestEnv, request: Request<Body>, next: Next) -> Response {
    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let tree = match dispatch(state.routes.as_ref(), &url, &state.server, &env).await {
        Ok(tree) => tree,
        Err(outcome) => return SsrOutcome::Dispatched.attach(outcome.into_response()),
    };

    let key = CacheKey::new(env.viewer, url);

    if state.server.should_cache {
        if let Some(document) = state.cache.get(&key) {
            let response = next.run(request).await;
            if response.status() != StatusCode::OK {
                debug!(
                    cache = "render",
                    outcome = "skipped",
                    key = %key,
                    status = response.status().as_u16(),
                    "downstream did not succeed, not replaying"
                );
                return SsrOutcome::CacheSkipped.attach(response);
            }
            debug!(cache = "render", outcome = "hit", key = %key, "replaying cached document");
            let response = ResponseInterceptor::new(Splice::Replay(document)).install(response);
            return SsrOutcome::CacheHit.attach(response);
        }
        debug!(cache = "render", outcome = "miss", key = %key, "rendering");
    }

    let (parts, body) = request.into_parts();
    let mut pending = PendingResponse::default();
    let outcome = state.renderer.render(tree, &parts, &mut pending).await;
    let RenderOutcome::Rendered {
        markup,
        sidecars,
        degraded,
    } = outcome
    else {
        return SsrOutcome::Dispatched.attach(outcome.into_response());
    };

    let mut response = next.run(Request::from_parts(parts, body)).await;
    let store = (state.server.should_cache && !degraded && response.status() == StatusCode::OK)
        .then(|| (Arc::clone(&state.cache), key));
    pending.apply(&mut response);

    let response = ResponseInterceptor::new(Splice::Render {
        markup,
        sidecars,
        client: Arc::clone(&state.client),
        server: Arc::clone(&state.server),
        store,
    })
    .install(response);

    if degraded {
        SsrOutcome::Degraded.attach(response)
    } else {
        SsrOutcome::Rendered.attach(response)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use axum::http::header::COOKIE;

    use super::*;
    use crate::ssr::engine::{History, RenderTree, RouteMatch};
    use crate::ssr::error::{BoxError, RouteResolutionError};

    struct NoRoutes;

    #[async_trait]
    impl RouteMatcher for NoRoutes {
        async fn resolve(
            &self,
            _history: &History,
            _env: &RequestEnv,
        ) -> Result<RouteMatch, RouteResolutionError> {
            Ok(RouteMatch::NoMatch)
        }
    }

    struct Blank;

    #[async_trait]
    impl RenderEngine for Blank {
        async fn render_to_string(&self, _tree: &RenderTree) -> Result<String, BoxError> {
            Ok(String::new())
        }
    }

    struct Tokens;

    #[async_trait]
    impl ViewerResolver for Tokens {
        async fn resolve(&self, token: &str) -> Option<ViewerId> {
            (token == "good").then(|| ViewerId::user("alice"))
        }
    }

    fn state() -> SsrState {
        SsrState::new(
            Arc::new(NoRoutes),
            Arc::new(Blank),
            ClientOptions::default(),
            ServerOptions::default(),
            &CacheConfig::default(),
        )
        .with_viewers(Arc::new(Tokens))
    }

    fn cookies(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static(value));
        headers
    }

    #[tokio::test]
    async fn viewer_comes_from_login_cookie() {
        let state = state();
        assert_eq!(
            state
                .resolve_viewer(&cookies("meteor_login_token=good"))
                .await,
            ViewerId::user("alice")
        );
    }

    #[tokio::test]
    async fn unknown_or_missing_token_is_anonymous() {
        let state = state();
        assert_eq!(
            state
                .resolve_viewer(&cookies("meteor_login_token=stale"))
                .await,
            ViewerId::Anonymous
        );
        assert_eq!(
            state.resolve_viewer(&cookies("theme=dark")).await,
            ViewerId::Anonymous
        );
        assert_eq!(
            state.resolve_viewer(&HeaderMap::new()).await,
            ViewerId::Anonymous
        );
    }

    #[tokio::test]
    async fn login_cookie_name_is_configurable() {
        let state = state().with_login_cookie("session");
        assert_eq!(
            state.resolve_viewer(&cookies("session=good")).await,
            ViewerId::user("alice")
        );
        assert_eq!(
            state
                .resolve_viewer(&cookies("meteor_login_token=good"))
                .await,
            ViewerId::Anonymous
        );
    }
}
