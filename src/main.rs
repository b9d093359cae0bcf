use std::{net::SocketAddr, process, sync::Arc, time::Duration};

use promptshot::{
    application::{
        capture::ImageCapturer, document::DocumentRenderer, error::AppError,
        relay::RelayService,
    },
    config::{self, CaptureArgs},
    domain::fingerprint::Fingerprint,
    infra::{
        artifacts::ArtifactStorage,
        browser::ChromiumRasterizer,
        error::InfraError,
        http::{self, RelayState},
        telemetry,
        upstream::ReqwestCompletionClient,
    },
};
use tokio::sync::Notify;
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

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Capture(args) => run_capture(settings, args).await,
    }
}

fn build_capturer(settings: &config::Settings) -> Result<ImageCapturer, AppError> {
    let storage = ArtifactStorage::new(
        settings.publish.directory.clone(),
        settings.publish.base_url.clone(),
    )
    .map_err(|err| AppError::from(InfraError::from(err)))?;
    let rasterizer = Arc::new(ChromiumRasterizer::new(&settings.capture));
    Ok(ImageCapturer::new(rasterizer, storage, &settings.capture))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let upstream = Arc::new(ReqwestCompletionClient::new(&settings.upstream)?);
    let relay = Arc::new(RelayService::new(upstream, build_capturer(&settings)?));
    let router = http::build_router(RelayState::new(relay, &settings));

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        addr = %settings.server.addr,
        publish_dir = %settings.publish.directory.display(),
        upstream = %settings.upstream.endpoint,
        "promptshot listening"
    );

    let shutdown = Arc::new(Notify::new());
    let signalled = shutdown.clone();
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        signalled.notify_one();
    });
    let server = async move { server.await };

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = drain_deadline(shutdown, grace) => {
            warn!(grace_seconds = grace.as_secs(), "in-flight requests outlived shutdown grace period");
        }
    }

    info!("promptshot stopped");
    Ok(())
}

async fn drain_deadline(shutdown: Arc<Notify>, grace: Duration) {
    shutdown.notified().await;
    tokio::time::sleep(grace).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
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
                error!(error = %err, "failed to listen for SIGTERM");
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
    info!("shutdown signal received");
}

async fn run_capture(settings: config::Settings, args: CaptureArgs) -> Result<(), AppError> {
    let markdown = tokio::fs::read_to_string(&args.input)
        .await
        .map_err(|err| {
            AppError::validation(format!(
                "failed to read `{}`: {err}",
                args.input.display()
            ))
        })?;
    let fingerprint = Fingerprint::of(args.name.as_deref().unwrap_or(&markdown));

    let html = DocumentRenderer::new()
        .render(&markdown)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    let artifact = build_capturer(&settings)?
        .capture(&html, &fingerprint)
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;

    println!("{}", artifact.file_path.display());
    println!("{}", artifact.public_url);
    Ok(())
}
