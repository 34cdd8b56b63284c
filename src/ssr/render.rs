//! Render orchestrator: drives one render of a matched route.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::http::request::Parts;
use futures::FutureExt;
use futures::future::join_all;
use metrics::{counter, histogram};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, error, instrument, warn};
use tracing_error::SpanTrace;

use crate::error::ErrorReport;

use super::context;
use super::engine::{RenderEngine, RenderTree};
use super::error::{ConfigurationError, RenderError, RouteResolutionError};
use super::options::{ClientOptions, ServerOptions};
use super::sidecar::{DEHYDRATED_INITIAL_DATA, FAST_RENDER_DATA, PendingResponse, Sidecars};

const SOURCE: &str = "ssr::render";

pub(crate) const METRIC_RENDER_MS: &str = "router_ssr_render_ms";
pub(crate) const METRIC_RENDER_ERROR: &str = "router_ssr_render_error_total";

/// Result of handling one routed request.
#[derive(Debug)]
pub enum RenderOutcome {
    Redirect { location: String },
    NotFound,
    /// `degraded` is set when the render failed and `markup` is the empty fallback.
    Rendered {
        markup: String,
        sidecars: Sidecars,
        degraded: bool,
    },
    Error { cause: RouteResolutionError },
}

/// Runs renders for matched routes with a fixed engine and options.
#[derive(Clone)]
pub struct Renderer {
    engine: Arc<dyn RenderEngine>,
    client: Arc<ClientOptions>,
    server: Arc<ServerOptions>,
}

impl Renderer {
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        client: Arc<ClientOptions>,
        server: Arc<ServerOptions>,
    ) -> Self {
        Self {
            engine,
            client,
            server,
        }
    }

    /// Render `tree`, always producing [`RenderOutcome::Rendered`].
    ///
    /// Any failure or panic from the engine or a hook is logged and yields
    /// empty markup flagged as degraded so the response can still complete.
    #[instrument(skip_all, fields(route = %tree.location))]
    pub async fn render(
        &self,
        tree: RenderTree,
        request: &Parts,
        pending: &mut PendingResponse,
    ) -> RenderOutcome {
        let route = tree.location.clone();
        let started = Instant::now();

        let result = AssertUnwindSafe(context::scope(self.render_in_context(
            tree, request, pending,
        )))
        .catch_unwind()
        .await;

        histogram!(METRIC_RENDER_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let (markup, degraded) = match result {
            Ok(Ok(markup)) => (markup, false),
            Ok(Err(err)) => {
                report_failure(&route, &err);
                (String::new(), true)
            }
            Err(panic) => {
                report_failure(&route, &RenderError::from_panic(panic));
                (String::new(), true)
            }
        };

        RenderOutcome::Rendered {
            markup,
            sidecars: pending.sidecars.clone(),
            degraded,
        }
    }

    async fn render_in_context(
        &self,
        mut tree: RenderTree,
        request: &Parts,
        pending: &mut PendingResponse,
    ) -> Result<String, RenderError> {
        if let Some(hook) = self.server.pre_render.as_ref() {
            hook(request, pending).map_err(|err| RenderError::hook("preRender", err))?;
        }

        tree.merge_props(&self.server.props);
        self.fetch_data(&tree).await?;

        if let Some(hook) = self.client.wrapper_hook.as_ref() {
            tree = hook(tree);
        }

        let markup = if !self.server.disable_ssr {
            self.engine
                .render_to_string(&tree)
                .await
                .map_err(RenderError::Engine)?
        } else {
            self.server.loading_screen.clone().unwrap_or_default()
        };

        if let Some(hook) = self.server.dehydrate_hook.as_ref() {
            let dehydrated = hook().map_err(|err| RenderError::hook("dehydrateHook", err))?;
            pending.sidecars.push(DEHYDRATED_INITIAL_DATA, dehydrated);
        }

        if let Some(hook) = self.server.post_render.as_ref() {
            hook(request, pending).map_err(|err| RenderError::hook("postRender", err))?;
        }

        let hydration = serde_json::to_value(context::drain()).map_err(|source| {
            RenderError::Serialize {
                key: FAST_RENDER_DATA,
                source,
            }
        })?;
        pending.sidecars.push(FAST_RENDER_DATA, hydration);

        Ok(markup)
    }

    /// Resolve every data fetch declared by the tree before rendering.
    async fn fetch_data(&self, tree: &RenderTree) -> Result<(), RenderError> {
        let components = tree.components_with_data_fetch();
        if components.is_empty() {
            return Ok(());
        }

        let Some(hook) = self.server.fetch_data_hook.as_ref() else {
            let err = ConfigurationError::MissingFetchDataHook {
                components: components.into_iter().map(|c| c.name).collect(),
            };
            warn!(error = %err, "skipping component data fetch");
            return Ok(());
        };

        let fetches = hook(&components);
        debug!(
            components = components.len(),
            fetches = fetches.len(),
            "awaiting component data"
        );

        join_all(fetches)
            .await
            .into_iter()
            .collect::<Result<Vec<()>, _>>()
            .map(|_| ())
            .map_err(RenderError::DataFetch)
    }
}

fn report_failure(route: &str, err: &RenderError) {
    counter!(METRIC_RENDER_ERROR).increment(1);
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let report = ErrorReport::from_error(
        SOURCE,
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        err,
    );

    error!(
        timestamp = %timestamp,
        route,
        error = %err,
        chain = ?report.messages,
        span_trace = %SpanTrace::capture(),
        "error while server-rendering"
    );
}
