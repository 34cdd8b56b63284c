use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the router-ssr binary.
#[derive(Debug, Parser)]
#[command(
    name = "router-ssr",
    version,
    about = "Server-side rendering middleware server"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ROUTER_SSR_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve the HTML shell behind the SSR middleware.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the maximum number of cached renders.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<usize>,

    /// Override how long a cached render stays fresh.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Toggle caching of rendered documents.
    #[arg(
        long = "ssr-should-cache",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub ssr_should_cache: Option<bool>,

    /// Toggle rendering the loading screen instead of the route.
    #[arg(
        long = "ssr-disable",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub ssr_disable: Option<bool>,

    /// Override the HTML shell served downstream of the middleware.
    #[arg(long = "ssr-shell-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub ssr_shell_path: Option<PathBuf>,
}
