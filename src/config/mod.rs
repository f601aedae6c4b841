//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    BrowserOverrides, CliArgs, Command, LoggingOverrides, RenderArgs, ServeArgs, ServeOverrides,
};

use std::{net::SocketAddr, num::NonZeroU64, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "boa-render";
const ENV_PREFIX: &str = "BOA_RENDER";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_MAX_REQUEST_BYTES: u64 = 2 * 1024 * 1024;
const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 20;
const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PRINT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_NETWORK_IDLE_MILLIS: u64 = 500;
const DEFAULT_ARTIFACT_DIR: &str = "artifacts";
const DEFAULT_ORGANISATION_NAME: &str = "BOA";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub browser: BrowserSettings,
    pub render: RenderSettings,
    pub artifacts: ArtifactSettings,
    pub branding: BrandingSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    pub max_request_bytes: NonZeroU64,
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
pub struct BrowserSettings {
    pub executable: Option<PathBuf>,
    pub no_sandbox: bool,
    pub launch_timeout: Duration,
    /// `None` disables the idle reaper.
    pub idle_timeout: Option<Duration>,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub load_timeout: Duration,
    pub print_timeout: Duration,
    pub network_idle: Duration,
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BrandingSettings {
    pub organisation_name: String,
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
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("browser.extra_args")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => {
            raw.apply_logging_overrides(&args.logging);
            raw.apply_browser_overrides(&args.browser);
        }
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
    browser: RawBrowserSettings,
    render: RawRenderSettings,
    artifacts: RawArtifactSettings,
    branding: RawBrandingSettings,
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
        if let Some(bytes) = overrides.server_max_request_bytes {
            self.server.max_request_bytes = Some(bytes);
        }
        if let Some(seconds) = overrides.browser_idle_timeout_seconds {
            self.browser.idle_timeout_seconds = Some(seconds);
        }
        if let Some(directory) = overrides.artifacts_directory.as_ref() {
            self.artifacts.directory = Some(directory.clone());
        }

        self.apply_logging_overrides(&overrides.logging);
        self.apply_browser_overrides(&overrides.browser);
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_browser_overrides(&mut self, overrides: &BrowserOverrides) {
        if let Some(path) = overrides.browser_executable.as_ref() {
            self.browser.executable = Some(path.clone());
        }
        if let Some(no_sandbox) = overrides.browser_no_sandbox {
            self.browser.no_sandbox = Some(no_sandbox);
        }
        if let Some(seconds) = overrides.browser_launch_timeout_seconds {
            self.browser.launch_timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            browser,
            render,
            artifacts,
            branding,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            browser: build_browser_settings(browser)?,
            render: build_render_settings(render)?,
            artifacts: build_artifact_settings(artifacts)?,
            branding: build_branding_settings(branding)?,
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
    let graceful_shutdown = non_zero_secs(graceful_secs, "server.graceful_shutdown_seconds")?;

    let max_request_bytes_value = server
        .max_request_bytes
        .unwrap_or(DEFAULT_MAX_REQUEST_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("server.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "server.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
        max_request_bytes,
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

fn build_browser_settings(browser: RawBrowserSettings) -> Result<BrowserSettings, LoadError> {
    let executable = match browser.executable {
        Some(path) if path.as_os_str().is_empty() => {
            return Err(LoadError::invalid(
                "browser.executable",
                "path must not be empty",
            ));
        }
        other => other,
    };

    let launch_timeout = non_zero_secs(
        browser
            .launch_timeout_seconds
            .unwrap_or(DEFAULT_LAUNCH_TIMEOUT_SECS),
        "browser.launch_timeout_seconds",
    )?;

    let idle_timeout = match browser.idle_timeout_seconds.unwrap_or(0) {
        0 => None,
        seconds => Some(Duration::from_secs(seconds)),
    };

    Ok(BrowserSettings {
        executable,
        no_sandbox: browser.no_sandbox.unwrap_or(false),
        launch_timeout,
        idle_timeout,
        extra_args: browser.extra_args.unwrap_or_default(),
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let load_timeout = non_zero_secs(
        render
            .load_timeout_seconds
            .unwrap_or(DEFAULT_LOAD_TIMEOUT_SECS),
        "render.load_timeout_seconds",
    )?;
    let print_timeout = non_zero_secs(
        render
            .print_timeout_seconds
            .unwrap_or(DEFAULT_PRINT_TIMEOUT_SECS),
        "render.print_timeout_seconds",
    )?;

    let network_idle_millis = render
        .network_idle_millis
        .unwrap_or(DEFAULT_NETWORK_IDLE_MILLIS);
    if network_idle_millis == 0 {
        return Err(LoadError::invalid(
            "render.network_idle_millis",
            "must be greater than zero",
        ));
    }
    let network_idle = Duration::from_millis(network_idle_millis);
    if network_idle >= load_timeout {
        return Err(LoadError::invalid(
            "render.network_idle_millis",
            "must be shorter than the load timeout",
        ));
    }

    Ok(RenderSettings {
        load_timeout,
        print_timeout,
        network_idle,
    })
}

fn build_artifact_settings(artifacts: RawArtifactSettings) -> Result<ArtifactSettings, LoadError> {
    let directory = artifacts
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "artifacts.directory",
            "path must not be empty",
        ));
    }

    Ok(ArtifactSettings { directory })
}

fn build_branding_settings(branding: RawBrandingSettings) -> Result<BrandingSettings, LoadError> {
    let organisation_name = branding
        .organisation_name
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|| DEFAULT_ORGANISATION_NAME.to_string());
    if organisation_name.is_empty() {
        return Err(LoadError::invalid(
            "branding.organisation_name",
            "must not be empty",
        ));
    }

    Ok(BrandingSettings { organisation_name })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBrowserSettings {
    executable: Option<PathBuf>,
    no_sandbox: Option<bool>,
    launch_timeout_seconds: Option<u64>,
    idle_timeout_seconds: Option<u64>,
    extra_args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    load_timeout_seconds: Option<u64>,
    print_timeout_seconds: Option<u64>,
    network_idle_millis: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawArtifactSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBrandingSettings {
    organisation_name: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}
