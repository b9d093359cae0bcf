use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the promptshot binary.
#[derive(Debug, Parser)]
#[command(
    name = "promptshot",
    version,
    about = "Relay chat completions and publish the answer as an image"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PROMPTSHOT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the relay HTTP service.
    Serve(Box<ServeArgs>),
    /// Render a local markdown file to a published PNG without calling upstream.
    Capture(CaptureArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct CaptureArgs {
    #[command(flatten)]
    pub overrides: CaptureOverrides,

    /// Markdown file to render.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Text whose fingerprint names the artifact; defaults to the file contents.
    #[arg(long, value_name = "TEXT")]
    pub name: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CaptureOverrides {
    /// Override the headless browser executable.
    #[arg(long = "capture-browser-executable", value_name = "PATH")]
    pub browser_executable: Option<PathBuf>,

    /// Override the viewport width in pixels.
    #[arg(long = "capture-viewport-width", value_name = "PIXELS")]
    pub viewport_width: Option<u32>,

    /// Override the viewport height in pixels.
    #[arg(long = "capture-viewport-height", value_name = "PIXELS")]
    pub viewport_height: Option<u32>,

    /// Override the number of simultaneous browser captures.
    #[arg(long = "capture-max-concurrent", value_name = "COUNT")]
    pub max_concurrent: Option<u32>,

    /// Launch the browser without its sandbox (containers without user namespaces).
    #[arg(
        long = "capture-no-sandbox",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub no_sandbox: Option<bool>,

    /// Override the artifact publish directory.
    #[arg(long = "publish-directory", value_name = "PATH")]
    pub publish_directory: Option<PathBuf>,

    /// Override the public base URL prefixed to `/image/<fingerprint>.png`.
    #[arg(long = "publish-base-url", value_name = "URL")]
    pub publish_base_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub capture: CaptureOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Status returned for non-POST requests to `/api` (404 or 405).
    #[arg(long = "server-wrong-method-status", value_name = "STATUS")]
    pub server_wrong_method_status: Option<u16>,

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

    /// Override the upstream chat-completions endpoint.
    #[arg(long = "upstream-endpoint", value_name = "URL")]
    pub upstream_endpoint: Option<String>,

    /// Override the upstream request timeout.
    #[arg(long = "upstream-timeout-seconds", value_name = "SECONDS")]
    pub upstream_timeout_seconds: Option<u64>,

    /// Toggle serving published images under `/image`.
    #[arg(
        long = "publish-serve-images",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub publish_serve_images: Option<bool>,
}
