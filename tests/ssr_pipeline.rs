//! End-to-end behaviour of the SSR middleware in front of a document shell.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        HeaderValue, Request, StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION},
    },
    middleware,
    response::{IntoResponse, Response},
};
use router_ssr::{
    cache::{CacheConfig, CacheKey},
    ssr::{
        self, BoxError, ClientOptions, Component, History, NOT_FOUND_BODY, RedirectTarget,
        RenderEngine, RenderTree, RequestEnv, RouteMatch, RouteMatcher, RouteResolutionError,
        ServerOptions, Sidecars, SsrOutcome, SsrState, ViewerId, ViewerResolver, context,
        ssr_layer,
    },
};
use serde_json::{Value, json};
use tower::ServiceExt;

const SHELL: &str =
    r#"<!DOCTYPE html><html><head><title>t</title><script src="/app.js"></script></head><body></body></html>"#;

struct TestRoutes;

#[async_trait]
impl RouteMatcher for TestRoutes {
    async fn resolve(
        &self,
        history: &History,
        _env: &RequestEnv,
    ) -> Result<RouteMatch, RouteResolutionError> {
        match history.pathname() {
            "/old" => Ok(RouteMatch::Redirect(RedirectTarget::parse("/foo?x=1"))),
            "/broken" => Err(RouteResolutionError::new("route table unavailable")),
            "/explode" => Ok(RouteMatch::Render(RenderTree::new(
                "/explode",
                vec![Component::new("Explode")],
            ))),
            path if path.starts_with("/p") || path.starts_with("/admin") => Ok(
                RouteMatch::Render(RenderTree::new(path, vec![Component::new("Page")])),
            ),
            _ => Ok(RouteMatch::NoMatch),
        }
    }
}

/// Renders the viewer and location, reporting one subscription per render.
#[derive(Default)]
struct CountingEngine {
    calls: AtomicUsize,
}

#[async_trait]
impl RenderEngine for CountingEngine {
    async fn render_to_string(&self, tree: &RenderTree) -> Result<String, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if tree.components.iter().any(|c| c.name == "Explode") {
            return Err("component threw".into());
        }

        let viewer = ssr::env::current_viewer();
        context::record_subscription("page", json!({ "viewer": viewer.to_string() }));
        // Interleave with other in-flight renders.
        tokio::time::sleep(Duration::from_millis(5)).await;
        context::add_documents("items", vec![json!({ "owner": viewer.to_string() })]);

        Ok(format!("<span>{}:{}</span>", viewer, tree.location))
    }
}

struct CookieViewers;

#[async_trait]
impl ViewerResolver for CookieViewers {
    async fn resolve(&self, token: &str) -> Option<ViewerId> {
        token.strip_prefix("token-").map(ViewerId::user)
    }
}

struct Harness {
    app: Router,
    state: SsrState,
    engine: Arc<CountingEngine>,
    downstream_calls: Arc<AtomicUsize>,
}

fn harness(server: ServerOptions, cache: CacheConfig) -> Harness {
    let engine = Arc::new(CountingEngine::default());
    let state = SsrState::new(
        Arc::new(TestRoutes),
        engine.clone(),
        ClientOptions::default(),
        server,
        &cache,
    )
    .with_viewers(Arc::new(CookieViewers));

    let downstream_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&downstream_calls);
    let app = Router::new()
        .fallback(move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                shell_response()
            }
        })
        .layer(middleware::from_fn_with_state(state.clone(), ssr_layer));

    Harness {
        app,
        state,
        engine,
        downstream_calls,
    }
}

fn shell_response() -> Response {
    (
        [
            (CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
            (CONTENT_LENGTH, HeaderValue::from(SHELL.len())),
        ],
        SHELL,
    )
        .into_response()
}

fn caching() -> ServerOptions {
    ServerOptions {
        should_cache: true,
        ..ServerOptions::default()
    }
}

fn request(uri: &str, viewer_token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = viewer_token {
        builder = builder.header(COOKIE, format!("meteor_login_token={token}"));
    }
    builder.body(Body::empty()).expect("request should build")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Response) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    (response.status(), response)
}

async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should collect");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

fn hydration(body: &str) -> Value {
    let marker = r#"<script type="text/inject-data" data-key="fast-render-data">"#;
    let start = body.find(marker).expect("hydration sidecar present") + marker.len();
    let end = start + body[start..].find("</script>").expect("sidecar closes");
    serde_json::from_str(&body[start..end]).expect("sidecar is JSON")
}

#[tokio::test]
async fn excluded_paths_go_straight_downstream() {
    let server = ServerOptions {
        disabled_ssr_paths: vec!["/admin".to_string()],
        ..caching()
    };
    let h = harness(server, CacheConfig::default());

    for uri in [
        "/favicon.ico",
        "/robots.txt",
        "/app.manifest",
        "/service-worker.js",
        "/sockjs/info",
        "/admin/users",
    ] {
        let (status, response) = send(&h.app, request(uri, None)).await;
        assert_eq!(status, StatusCode::OK, "uri {uri}");
        assert_eq!(body_string(response).await, SHELL, "uri {uri}");
    }

    assert_eq!(h.downstream_calls.load(Ordering::SeqCst), 6);
    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 0);
    assert!(h.state.cache.is_empty());
}

#[tokio::test]
async fn redirect_ends_request_without_downstream() {
    let h = harness(ServerOptions::default(), CacheConfig::default());

    let (status, response) = send(&h.app, request("/old", None)).await;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(response.headers()[LOCATION], "/foo?x=1");
    assert_eq!(h.downstream_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unmatched_route_is_not_found() {
    let h = harness(ServerOptions::default(), CacheConfig::default());

    let (status, response) = send(&h.app, request("/nowhere", None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await, NOT_FOUND_BODY);
    assert_eq!(h.downstream_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn route_resolution_error_is_internal_error() {
    let h = harness(ServerOptions::default(), CacheConfig::default());

    let (status, response) = send(&h.app, request("/broken", None)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "route table unavailable");
    assert_eq!(h.downstream_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rendered_markup_and_hydration_are_spliced_into_shell() {
    let h = harness(ServerOptions::default(), CacheConfig::default());

    let (status, response) = send(&h.app, request("/p?tab=1", Some("token-alice"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response.headers().get(CONTENT_LENGTH).is_none());
    assert!(response.extensions().get::<Sidecars>().is_some());

    let body = body_string(response).await;
    assert_eq!(body.matches(r#"id="react-app""#).count(), 1);
    assert!(body.contains(r#"<div id="react-app"><span>alice:/p</span></div>"#));
    // Head scripts now trail the body content.
    assert!(body.find("/app.js").expect("script kept") > body.find("react-app").expect("root"));
    assert_eq!(
        hydration(&body),
        json!({
            "subscriptions": { "page": [{ "viewer": "alice" }] },
            "collectionData": { "items": [[{ "owner": "alice" }]] }
        })
    );
    assert_eq!(h.downstream_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cache_hit_replays_identical_document_without_rendering() {
    let h = harness(caching(), CacheConfig::default());

    let (_, first) = send(&h.app, request("/p", Some("token-alice"))).await;
    let first = body_string(first).await;
    let (status, second) = send(&h.app, request("/p", Some("token-alice"))).await;
    let second = body_string(second).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.downstream_calls.load(Ordering::SeqCst), 2);
    assert!(
        h.state
            .cache
            .has(&CacheKey::new(ViewerId::user("alice"), "/p"))
    );
}

#[tokio::test]
async fn cached_renders_are_isolated_per_viewer() {
    let h = harness(caching(), CacheConfig::default());

    let (_, alice) = send(&h.app, request("/p", Some("token-alice"))).await;
    let alice = body_string(alice).await;
    let (_, bob) = send(&h.app, request("/p", Some("token-bob"))).await;
    let bob = body_string(bob).await;
    let (_, anonymous) = send(&h.app, request("/p", None)).await;
    let anonymous = body_string(anonymous).await;

    assert!(alice.contains("alice:/p"));
    assert!(bob.contains("bob:/p"));
    assert!(!bob.contains("alice"));
    assert!(anonymous.contains("NOT_LOGGED_IN:/p"));
    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn cache_evicts_least_recently_used_render() {
    let h = harness(
        caching(),
        CacheConfig {
            capacity: 2,
            ..CacheConfig::default()
        },
    );

    for uri in ["/p1", "/p2", "/p3"] {
        let (_, response) = send(&h.app, request(uri, None)).await;
        body_string(response).await;
    }

    assert_eq!(h.state.cache.len(), 2);
    assert!(!h.state.cache.has(&CacheKey::new(ViewerId::Anonymous, "/p1")));

    let (_, response) = send(&h.app, request("/p1", None)).await;
    body_string(response).await;
    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn caching_disabled_renders_every_time() {
    let h = harness(ServerOptions::default(), CacheConfig::default());

    for _ in 0..2 {
        let (_, response) = send(&h.app, request("/p", None)).await;
        body_string(response).await;
    }

    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 2);
    assert!(h.state.cache.is_empty());
}

#[tokio::test]
async fn render_failure_still_serves_the_shell() {
    let h = harness(ServerOptions::default(), CacheConfig::default());

    let (status, response) = send(&h.app, request("/explode", None)).await;
    let body = body_string(response).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#"<div id="react-app"></div>"#));
    assert_eq!(h.downstream_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_render_is_not_cached_and_retries() {
    let h = harness(caching(), CacheConfig::default());

    let (status, response) = send(&h.app, request("/explode", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response.extensions().get::<SsrOutcome>(),
        Some(&SsrOutcome::Degraded)
    );
    assert!(body_string(response).await.contains(r#"<div id="react-app"></div>"#));
    assert!(
        !h.state
            .cache
            .has(&CacheKey::new(ViewerId::Anonymous, "/explode"))
    );

    let (_, response) = send(&h.app, request("/explode", None)).await;
    body_string(response).await;
    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 2);
    assert!(h.state.cache.is_empty());
}

#[tokio::test]
async fn cached_document_is_not_replayed_over_failed_downstream() {
    let engine = Arc::new(CountingEngine::default());
    let state = SsrState::new(
        Arc::new(TestRoutes),
        engine.clone(),
        ClientOptions::default(),
        caching(),
        &CacheConfig::default(),
    );
    let served = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .fallback(move || {
            let served = Arc::clone(&served);
            async move {
                let mut response = shell_response();
                if served.fetch_add(1, Ordering::SeqCst) > 0 {
                    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
                }
                response
            }
        })
        .layer(middleware::from_fn_with_state(state.clone(), ssr_layer));

    let (_, first) = send(&app, request("/p", None)).await;
    assert!(body_string(first).await.contains("NOT_LOGGED_IN:/p"));
    assert!(state.cache.has(&CacheKey::new(ViewerId::Anonymous, "/p")));

    let (status, second) = send(&app, request("/p", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        second.extensions().get::<SsrOutcome>(),
        Some(&SsrOutcome::CacheSkipped)
    );
    assert_eq!(body_string(second).await, SHELL);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cache_hit_skips_render_hooks() {
    let pre_render_calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&pre_render_calls);
    let server = ServerOptions {
        should_cache: true,
        ..ServerOptions::default()
    }
    .with_pre_render(move |_, pending| {
        counted.fetch_add(1, Ordering::SeqCst);
        pending
            .headers
            .insert("x-rendered", HeaderValue::from_static("1"));
        Ok(())
    });
    let h = harness(server, CacheConfig::default());

    let (_, first) = send(&h.app, request("/p", None)).await;
    assert_eq!(first.headers()["x-rendered"], "1");
    assert_eq!(
        first.extensions().get::<SsrOutcome>(),
        Some(&SsrOutcome::Rendered)
    );
    body_string(first).await;

    let (_, second) = send(&h.app, request("/p", None)).await;
    assert!(second.headers().get("x-rendered").is_none());
    assert_eq!(
        second.extensions().get::<SsrOutcome>(),
        Some(&SsrOutcome::CacheHit)
    );
    body_string(second).await;

    assert_eq!(pre_render_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_document_downstream_passes_through() {
    let engine = Arc::new(CountingEngine::default());
    let state = SsrState::new(
        Arc::new(TestRoutes),
        engine,
        ClientOptions::default(),
        ServerOptions::default(),
        &CacheConfig::default(),
    );
    let app = Router::new()
        .fallback(|| async { "<p>fragment</p>" })
        .layer(middleware::from_fn_with_state(state, ssr_layer));

    let (status, response) = send(&app, request("/p", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body_string(response).await, "<p>fragment</p>");
}

#[tokio::test]
async fn concurrent_renders_keep_their_own_hydration() {
    let h = harness(ServerOptions::default(), CacheConfig::default());

    let (alice, bob) = tokio::join!(
        send(&h.app, request("/p", Some("token-alice"))),
        send(&h.app, request("/p", Some("token-bob"))),
    );
    let alice = body_string(alice.1).await;
    let bob = body_string(bob.1).await;

    assert_eq!(
        hydration(&alice)["subscriptions"]["page"],
        json!([{ "viewer": "alice" }])
    );
    assert_eq!(
        hydration(&bob)["subscriptions"]["page"],
        json!([{ "viewer": "bob" }])
    );
    assert_eq!(
        hydration(&bob)["collectionData"]["items"],
        json!([[{ "owner": "bob" }]])
    );
}

#[tokio::test]
async fn hooks_shape_the_response() {
    let server = ServerOptions::default()
        .with_pre_render(|request, pending| {
            pending.headers.insert(
                "x-rendered-path",
                HeaderValue::from_str(request.uri.path())?,
            );
            Ok(())
        })
        .with_dehydrate_hook(|| Ok(json!({ "apollo": { "ROOT_QUERY": {} } })))
        .with_html_hook(|html| html.replace("<title>t</title>", "<title>hooked</title>"))
        .with_history_hook(|mut history| {
            if history.pathname() == "/legacy" {
                history.replace("/p");
            }
            history
        });
    let h = harness(server, CacheConfig::default());

    let (status, response) = send(&h.app, request("/legacy", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.headers()["x-rendered-path"], "/legacy");

    let body = body_string(response).await;
    assert!(body.contains("<title>hooked</title>"));
    assert!(body.contains(r#"data-key="dehydrated-initial-data""#));
    assert!(body.contains("NOT_LOGGED_IN:/p"));
}
