use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the boa-render binary.
#[derive(Debug, Parser)]
#[command(
    name = "boa-render",
    version,
    about = "HTML to PDF document rendering service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "BOA_RENDER_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Render one template file and exit.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
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
}

#[derive(Debug, Args, Default, Clone)]
pub struct BrowserOverrides {
    /// Override the browser executable.
    #[arg(long = "browser-executable", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub browser_executable: Option<PathBuf>,

    /// Launch the browser without its sandbox.
    #[arg(
        long = "browser-no-sandbox",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub browser_no_sandbox: Option<bool>,

    /// Override the browser launch timeout.
    #[arg(long = "browser-launch-timeout-seconds", value_name = "SECONDS")]
    pub browser_launch_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub browser: BrowserOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the maximum request body size in bytes.
    #[arg(long = "server-max-request-bytes", value_name = "BYTES")]
    pub server_max_request_bytes: Option<u64>,

    /// Override the idle time after which the browser is closed.
    #[arg(long = "browser-idle-timeout-seconds", value_name = "SECONDS")]
    pub browser_idle_timeout_seconds: Option<u64>,

    /// Override the artifact directory.
    #[arg(long = "artifacts-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub artifacts_directory: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub browser: BrowserOverrides,

    /// HTML template containing `{{TOKEN}}` placeholders.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub template: PathBuf,

    /// JSON object mapping token names to values.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub tokens: Option<PathBuf>,

    /// Where to write the rendered bytes.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// Insert token values without HTML escaping.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub raw: bool,
}
