//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

use crate::ssr::{
    RedirectDefinition, RootElementAttributes, RouteDefinition,
    options::{DEFAULT_ROOT_ELEMENT, DEFAULT_ROOT_ELEMENT_TYPE},
    pipeline::DEFAULT_LOGIN_COOKIE,
    policy::DEFAULT_RESERVED_PREFIXES,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "router-ssr";
const ENV_PREFIX: &str = "ROUTER_SSR";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CACHE_CAPACITY: usize = 500;
const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_SHELL_PATH: &str = "config/shell.html";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub ssr: SsrSettings,
    pub routes: Vec<RouteDefinition>,
    pub redirects: Vec<RedirectDefinition>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub capacity: usize,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct SsrSettings {
    pub disabled_paths: Vec<String>,
    pub disable_ssr: bool,
    pub loading_screen: Option<String>,
    pub should_cache: bool,
    pub dont_move_scripts: bool,
    pub root_element: String,
    pub root_element_type: String,
    pub root_element_attributes: Option<RootElementAttributes>,
    pub props: Map<String, Value>,
    pub reserved_prefixes: Vec<String>,
    pub login_cookie: String,
    pub shell_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("ssr.disabled_paths")
            .with_list_parse_key("ssr.reserved_prefixes")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    ssr: RawSsrSettings,
    routes: Vec<RouteDefinition>,
    redirects: Vec<RedirectDefinition>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(capacity) = overrides.cache_capacity {
            self.cache.capacity = Some(capacity);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(should_cache) = overrides.ssr_should_cache {
            self.ssr.should_cache = Some(should_cache);
        }
        if let Some(disable) = overrides.ssr_disable {
            self.ssr.disable_ssr = Some(disable);
        }
        if let Some(path) = overrides.ssr_shell_path.as_ref() {
            self.ssr.shell_path = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            ssr,
            routes,
            redirects,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let ssr = build_ssr_settings(ssr)?;
        validate_routes(&routes, &redirects)?;

        Ok(Self {
            server,
            logging,
            cache,
            ssr,
            routes,
            redirects,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    // A zero capacity is clamped rather than rejected.
    let capacity = cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY).max(1);

    let ttl_seconds = cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        capacity,
        ttl: Duration::from_secs(ttl_seconds),
    })
}

fn build_ssr_settings(ssr: RawSsrSettings) -> Result<SsrSettings, LoadError> {
    let root_element = non_empty(ssr.root_element, DEFAULT_ROOT_ELEMENT, "ssr.root_element")?;
    let root_element_type = non_empty(
        ssr.root_element_type,
        DEFAULT_ROOT_ELEMENT_TYPE,
        "ssr.root_element_type",
    )?;
    if !root_element_type
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(LoadError::invalid(
            "ssr.root_element_type",
            format!("`{root_element_type}` is not a valid tag name"),
        ));
    }

    let disabled_paths = prefixes(ssr.disabled_paths.unwrap_or_default(), "ssr.disabled_paths")?;
    let reserved_prefixes = prefixes(
        ssr.reserved_prefixes.unwrap_or_else(|| {
            DEFAULT_RESERVED_PREFIXES
                .iter()
                .map(|p| (*p).to_string())
                .collect()
        }),
        "ssr.reserved_prefixes",
    )?;
    let login_cookie = non_empty(ssr.login_cookie, DEFAULT_LOGIN_COOKIE, "ssr.login_cookie")?;

    let shell_path = ssr
        .shell_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SHELL_PATH));
    if shell_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "ssr.shell_path",
            "path must not be empty",
        ));
    }

    Ok(SsrSettings {
        disabled_paths,
        disable_ssr: ssr.disable_ssr.unwrap_or(false),
        loading_screen: ssr.loading_screen,
        should_cache: ssr.should_cache.unwrap_or(false),
        dont_move_scripts: ssr.dont_move_scripts.unwrap_or(false),
        root_element,
        root_element_type,
        root_element_attributes: ssr.root_element_attributes,
        props: ssr.props.unwrap_or_default(),
        reserved_prefixes,
        login_cookie,
        shell_path,
    })
}

fn validate_routes(
    routes: &[RouteDefinition],
    redirects: &[RedirectDefinition],
) -> Result<(), LoadError> {
    if let Some(route) = routes.iter().find(|route| !route.path.starts_with('/')) {
        return Err(LoadError::invalid(
            "routes.path",
            format!("`{}` must start with `/`", route.path),
        ));
    }
    if let Some(redirect) = redirects
        .iter()
        .find(|redirect| !redirect.from.starts_with('/') || redirect.to.is_empty())
    {
        return Err(LoadError::invalid(
            "redirects",
            format!(
                "`{}` -> `{}` needs an absolute source and a target",
                redirect.from, redirect.to
            ),
        ));
    }
    Ok(())
}

fn non_empty(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoadError::invalid(key, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn prefixes(values: Vec<String>, key: &'static str) -> Result<Vec<String>, LoadError> {
    values
        .into_iter()
        .map(|value| {
            let trimmed = value.trim();
            if trimmed.starts_with('/') {
                Ok(trimmed.to_string())
            } else {
                Err(LoadError::invalid(
                    key,
                    format!("`{trimmed}` must start with `/`"),
                ))
            }
        })
        .collect()
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    capacity: Option<usize>,
    ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSsrSettings {
    disabled_paths: Option<Vec<String>>,
    disable_ssr: Option<bool>,
    loading_screen: Option<String>,
    should_cache: Option<bool>,
    dont_move_scripts: Option<bool>,
    root_element: Option<String>,
    root_element_type: Option<String>,
    root_element_attributes: Option<RootElementAttributes>,
    props: Option<Map<String, Value>>,
    reserved_prefixes: Option<Vec<String>>,
    login_cookie: Option<String>,
    shell_path: Option<PathBuf>,
}
