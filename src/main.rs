use std::{collections::BTreeMap, process, sync::Arc, time::Duration};

use boa_render::{
    application::{
        documents::{Branding, DocumentService},
        error::AppError,
        render::{
            BrowserControl, BrowserManager, FallbackChain, RenderEngine, RenderResult,
            RenderTimeouts, TextPdfGenerator, TokenMap,
        },
    },
    config,
    infra::{
        artifacts::ArtifactStore,
        browser::{ChromiumBackend, ChromiumOptions},
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

/// Shortest pause between idle checks of the browser.
const MIN_REAPER_INTERVAL: Duration = Duration::from_secs(1);

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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

struct Pipeline {
    browser: BrowserManager<ChromiumBackend>,
    engine: RenderEngine<ChromiumBackend>,
    documents: DocumentService,
}

fn build_pipeline(settings: &config::Settings) -> Pipeline {
    let backend = ChromiumBackend::new(ChromiumOptions {
        executable: settings.browser.executable.clone(),
        no_sandbox: settings.browser.no_sandbox,
        extra_args: settings.browser.extra_args.clone(),
    });
    let browser = BrowserManager::new(backend, settings.browser.launch_timeout);
    let engine = RenderEngine::new(
        browser.clone(),
        RenderTimeouts {
            load: settings.render.load_timeout,
            print: settings.render.print_timeout,
            network_idle: settings.render.network_idle,
        },
    );
    let chain = FallbackChain::new(
        Arc::new(engine.clone()),
        Arc::new(TextPdfGenerator::default()),
    );
    let documents = DocumentService::new(
        chain,
        Branding {
            organisation_name: settings.branding.organisation_name.clone(),
        },
    );

    Pipeline {
        browser,
        engine,
        documents,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pipeline = build_pipeline(&settings);
    let artifacts = ArtifactStore::new(settings.artifacts.directory.clone())
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let browser: Arc<dyn BrowserControl> = Arc::new(pipeline.browser.clone());
    let state = ApiState {
        documents: pipeline.documents.clone(),
        artifacts: Arc::new(artifacts),
        browser: Arc::clone(&browser),
        pages: pipeline.engine.page_counter(),
    };

    let body_limit = usize::try_from(settings.server.max_request_bytes.get())
        .map_err(|_| AppError::from(InfraError::configuration("request limit out of range")))?;
    let router = http::build_router(state, body_limit);

    let reaper = settings
        .browser
        .idle_timeout
        .map(|idle| spawn_idle_reaper(Arc::clone(&browser), idle));

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "boa_render::main",
        addr = %settings.server.addr,
        "listening"
    );

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .await
    });

    let outcome = tokio::select! {
        joined = &mut server => Some(joined),
        _ = shutdown_signal() => None,
    };

    let result = match outcome {
        Some(joined) => server_result(joined),
        None => {
            info!(target = "boa_render::main", "shutdown requested");
            let _ = stop_tx.send(true);
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
                Ok(joined) => server_result(joined),
                Err(_) => {
                    warn!(
                        target = "boa_render::main",
                        timeout_secs = settings.server.graceful_shutdown.as_secs(),
                        "graceful shutdown timed out; dropping open connections"
                    );
                    server.abort();
                    Ok(())
                }
            }
        }
    };

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    browser.shutdown().await;
    info!(target = "boa_render::main", "stopped");

    result
}

fn server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

fn spawn_idle_reaper(browser: Arc<dyn BrowserControl>, idle: Duration) -> JoinHandle<()> {
    let period = (idle / 2).max(MIN_REAPER_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if browser.close_if_idle(idle).await {
                info!(
                    target = "boa_render::main",
                    idle_secs = idle.as_secs(),
                    "closed idle browser"
                );
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "boa_render::main", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "boa_render::main", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let template = tokio::fs::read_to_string(&args.template)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let values: BTreeMap<String, String> = match args.tokens.as_ref() {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .map_err(|err| AppError::from(InfraError::from(err)))?;
            serde_json::from_str(&raw)
                .map_err(|err| AppError::validation(format!("invalid token file: {err}")))?
        }
        None => BTreeMap::new(),
    };

    let mut tokens = TokenMap::new();
    for (name, value) in values {
        if args.raw {
            tokens.insert_raw(name, value);
        } else {
            tokens.insert_text(name, value);
        }
    }

    let pipeline = build_pipeline(&settings);
    let stem = args
        .output
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string);
    let rendered = pipeline
        .documents
        .render_template(&template, tokens, None, stem.as_deref())
        .await;
    pipeline.browser.shutdown().await;
    let rendered = rendered?;

    let (bytes, detail) = match &rendered.result {
        RenderResult::Pdf { bytes, source } => (bytes.clone(), source.as_str().to_string()),
        RenderResult::Html { bytes, reason } => (bytes.clone(), reason.clone()),
        RenderResult::Error { cause } => {
            return Err(AppError::unexpected(format!(
                "document could not be produced: {}",
                cause.as_str()
            )));
        }
    };

    tokio::fs::write(&args.output, &bytes)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "boa_render::main",
        kind = rendered.result.kind().as_str(),
        detail = %detail,
        output = %args.output.display(),
        size_bytes = bytes.len(),
        "render complete"
    );
    println!("{}", rendered.result.kind().as_str());

    Ok(())
}
