//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{CaptureArgs, CaptureOverrides, CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "promptshot";
// `config.json` with a top-level `port` predates the sectioned layout.
const LEGACY_CONFIG_BASENAME: &str = "config";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_WRONG_METHOD_STATUS: u16 = 404;
const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;
pub(crate) const DEFAULT_UPSTREAM_ENDPOINT: &str =
    "https://open.bigmodel.cn/api/paas/v4/chat/completions";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PUBLISH_DIR: &str = "public/image";
const DEFAULT_PUBLISH_BASE_URL: &str = "http://localhost";
pub(crate) const DEFAULT_VIEWPORT_WIDTH: u32 = 780;
pub(crate) const DEFAULT_VIEWPORT_HEIGHT: u32 = 2600;
const DEFAULT_CAPTURE_MAX_CONCURRENT: u32 = 2;
const DEFAULT_CAPTURE_QUEUE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CAPTURE_RENDER_TIMEOUT_SECS: u64 = 60;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub upstream: UpstreamSettings,
    pub publish: PublishSettings,
    pub capture: CaptureSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    pub wrong_method_status: WrongMethodStatus,
    pub max_body_bytes: usize,
}

/// Response status for requests to `/api` that are not POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrongMethodStatus {
    NotFound,
    MethodNotAllowed,
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
pub struct UpstreamSettings {
    pub endpoint: Url,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub directory: PathBuf,
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub serve_images: bool,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub browser_executable: Option<PathBuf>,
    pub viewport_width: NonZeroU32,
    pub viewport_height: NonZeroU32,
    pub max_concurrent: NonZeroU32,
    pub queue_timeout: Duration,
    pub render_timeout: Duration,
    pub no_sandbox: bool,
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
    load_from(Path::new("."), cli)
}

/// Same as [`load`], with the config file basenames resolved against `root`.
fn load_from(root: &Path, cli: &CliArgs) -> Result<Settings, LoadError> {
    let source = |basename: &str| {
        let path = root.join(basename);
        File::with_name(&path.to_string_lossy()).required(false)
    };
    let mut builder = Config::builder()
        .add_source(source(DEFAULT_CONFIG_BASENAME))
        .add_source(source(LOCAL_CONFIG_BASENAME))
        .add_source(source(LEGACY_CONFIG_BASENAME));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PROMPTSHOT").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Capture(args)) => raw.apply_capture_overrides(&args.overrides),
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
    port: Option<u16>,
    server: RawServerSettings,
    logging: RawLoggingSettings,
    upstream: RawUpstreamSettings,
    publish: RawPublishSettings,
    capture: RawCaptureSettings,
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
        if let Some(status) = overrides.server_wrong_method_status {
            self.server.wrong_method_status = Some(status);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(endpoint) = overrides.upstream_endpoint.as_ref() {
            self.upstream.endpoint = Some(endpoint.clone());
        }
        if let Some(seconds) = overrides.upstream_timeout_seconds {
            self.upstream.timeout_seconds = Some(seconds);
        }
        if let Some(serve) = overrides.publish_serve_images {
            self.publish.serve_images = Some(serve);
        }

        self.apply_capture_overrides(&overrides.capture);
    }

    fn apply_capture_overrides(&mut self, overrides: &CaptureOverrides) {
        if let Some(path) = overrides.browser_executable.as_ref() {
            self.capture.browser_executable = Some(path.clone());
        }
        if let Some(width) = overrides.viewport_width {
            self.capture.viewport_width = Some(width);
        }
        if let Some(height) = overrides.viewport_height {
            self.capture.viewport_height = Some(height);
        }
        if let Some(max) = overrides.max_concurrent {
            self.capture.max_concurrent = Some(max);
        }
        if let Some(no_sandbox) = overrides.no_sandbox {
            self.capture.no_sandbox = Some(no_sandbox);
        }
        if let Some(directory) = overrides.publish_directory.as_ref() {
            self.publish.directory = Some(directory.clone());
        }
        if let Some(base_url) = overrides.publish_base_url.as_ref() {
            self.publish.base_url = Some(base_url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            port,
            server,
            logging,
            upstream,
            publish,
            capture,
        } = raw;

        let server = build_server_settings(server, port)?;
        let logging = build_logging_settings(logging)?;
        let upstream = build_upstream_settings(upstream)?;
        let publish = build_publish_settings(publish)?;
        let capture = build_capture_settings(capture)?;

        Ok(Self {
            server,
            logging,
            upstream,
            publish,
            capture,
        })
    }
}

fn build_server_settings(
    server: RawServerSettings,
    legacy_port: Option<u16>,
) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.or(legacy_port).unwrap_or(DEFAULT_PORT);
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

    let wrong_method_status = match server
        .wrong_method_status
        .unwrap_or(DEFAULT_WRONG_METHOD_STATUS)
    {
        404 => WrongMethodStatus::NotFound,
        405 => WrongMethodStatus::MethodNotAllowed,
        other => {
            return Err(LoadError::invalid(
                "server.wrong_method_status",
                format!("expected 404 or 405, got {other}"),
            ));
        }
    };

    let max_body_value = server.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    let max_body_bytes = NonZeroU64::new(max_body_value)
        .ok_or_else(|| LoadError::invalid("server.max_body_bytes", "must be greater than zero"))?;
    let max_body_bytes = usize::try_from(max_body_bytes.get()).map_err(|_| {
        LoadError::invalid(
            "server.max_body_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        wrong_method_status,
        max_body_bytes,
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

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let raw_endpoint = upstream
        .endpoint
        .unwrap_or_else(|| DEFAULT_UPSTREAM_ENDPOINT.to_string());
    let endpoint = Url::parse(raw_endpoint.trim())
        .map_err(|err| LoadError::invalid("upstream.endpoint", format!("invalid URL: {err}")))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "upstream.endpoint",
            "scheme must be http or https",
        ));
    }

    let timeout = positive_seconds(
        upstream
            .timeout_seconds
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        "upstream.timeout_seconds",
    )?;
    let connect_timeout = positive_seconds(
        upstream
            .connect_timeout_seconds
            .unwrap_or(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS),
        "upstream.connect_timeout_seconds",
    )?;

    Ok(UpstreamSettings {
        endpoint,
        timeout,
        connect_timeout,
    })
}

fn build_publish_settings(publish: RawPublishSettings) -> Result<PublishSettings, LoadError> {
    let directory = publish
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PUBLISH_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "publish.directory",
            "path must not be empty",
        ));
    }

    let raw_base = publish
        .base_url
        .unwrap_or_else(|| DEFAULT_PUBLISH_BASE_URL.to_string());
    let base_url = normalize_base_url(&raw_base)
        .map_err(|reason| LoadError::invalid("publish.base_url", reason))?;

    Ok(PublishSettings {
        directory,
        base_url,
        serve_images: publish.serve_images.unwrap_or(true),
    })
}

fn build_capture_settings(capture: RawCaptureSettings) -> Result<CaptureSettings, LoadError> {
    let browser_executable = capture
        .browser_executable
        .filter(|path| !path.as_os_str().is_empty());

    let viewport_width = non_zero_u32(
        capture
            .viewport_width
            .unwrap_or(DEFAULT_VIEWPORT_WIDTH)
            .into(),
        "capture.viewport_width",
    )?;
    let viewport_height = non_zero_u32(
        capture
            .viewport_height
            .unwrap_or(DEFAULT_VIEWPORT_HEIGHT)
            .into(),
        "capture.viewport_height",
    )?;
    let max_concurrent = non_zero_u32(
        capture
            .max_concurrent
            .unwrap_or(DEFAULT_CAPTURE_MAX_CONCURRENT)
            .into(),
        "capture.max_concurrent",
    )?;

    let queue_timeout = positive_seconds(
        capture
            .queue_timeout_seconds
            .unwrap_or(DEFAULT_CAPTURE_QUEUE_TIMEOUT_SECS),
        "capture.queue_timeout_seconds",
    )?;
    let render_timeout = positive_seconds(
        capture
            .render_timeout_seconds
            .unwrap_or(DEFAULT_CAPTURE_RENDER_TIMEOUT_SECS),
        "capture.render_timeout_seconds",
    )?;

    Ok(CaptureSettings {
        browser_executable,
        viewport_width,
        viewport_height,
        max_concurrent,
        queue_timeout,
        render_timeout,
        no_sandbox: capture.no_sandbox.unwrap_or(false),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    wrong_method_status: Option<u16>,
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    endpoint: Option<String>,
    timeout_seconds: Option<u64>,
    connect_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPublishSettings {
    directory: Option<PathBuf>,
    base_url: Option<String>,
    serve_images: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCaptureSettings {
    browser_executable: Option<PathBuf>,
    viewport_width: Option<u32>,
    viewport_height: Option<u32>,
    max_concurrent: Option<u32>,
    queue_timeout_seconds: Option<u64>,
    render_timeout_seconds: Option<u64>,
    no_sandbox: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn normalize_base_url(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err("must not be empty".to_string());
    }
    let parsed = Url::parse(trimmed).map_err(|err| format!("invalid URL: {err}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err("scheme must be http or https".to_string());
    }
    Ok(trimmed.to_string())
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
