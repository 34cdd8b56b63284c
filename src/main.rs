use std::{future::IntoFuture, process, sync::Arc};

use router_ssr::{
    cache::CacheConfig,
    config::{self, Settings},
    error::AppError,
    infra::{
        error::InfraError,
        http::{self, PlaceholderEngine, ShellState},
        telemetry,
    },
    ssr::{ClientOptions, RoutePolicy, ServerOptions, SsrState, StaticRoutes},
};
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    match cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()))
    {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let shell = ShellState::load(&settings.ssr.shell_path).await?;

    let routes = StaticRoutes::new(settings.routes.clone(), settings.redirects.clone());
    if routes.is_empty() {
        warn!("no routes configured; every document request will answer 404");
    }

    let state = SsrState::new(
        Arc::new(routes),
        Arc::new(PlaceholderEngine),
        ClientOptions::from(&settings.ssr),
        ServerOptions::from(&settings.ssr),
        &CacheConfig::from(&settings.cache),
    )
    .with_policy(RoutePolicy::new(settings.ssr.reserved_prefixes.clone()))
    .with_login_cookie(settings.ssr.login_cookie.clone());

    let router = http::build_router(state, shell);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(addr = %settings.server.addr, "listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let finished = tokio::select! {
        result = &mut server => Some(result),
        () = &mut shutdown => None,
    };

    match finished {
        Some(result) => result.map_err(InfraError::from)?,
        None => {
            info!(
                grace_secs = settings.server.graceful_shutdown.as_secs(),
                "shutting down"
            );
            let _ = stop_tx.send(());
            match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
                Ok(result) => result.map_err(InfraError::from)?,
                Err(_) => warn!("graceful shutdown timed out; dropping open connections"),
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
