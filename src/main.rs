use std::process::ExitCode;

use tokio::net::TcpListener;
use webfinger::config::{Configuration, ServerSettings};
use webfinger::{AppState, app, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::setup_tracing();

    // Nothing is served unless both loads succeed.
    let (config, settings) =
        match Configuration::load().and_then(|config| {
            ServerSettings::load().map(|settings| (config, settings))
        }) {
            Ok(loaded) => loaded,
            Err(err) => {
                tracing::error!(%err, "configuration error");
                return ExitCode::FAILURE;
            },
        };

    tracing::info!(
        service = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        resource = config.resource(),
        issuer_url = config.issuer_url(),
        allow_domain_wildcard = config.allow_domain_wildcard(),
        "webfinger server build"
    );

    if let Some(address) = settings.metrics_address() {
        let handle = match telemetry::setup_metrics_recorder() {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(%err, "cannot install prometheus recorder");
                return ExitCode::FAILURE;
            },
        };
        let listener = match TcpListener::bind(address).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(%err, %address, "cannot bind metrics listener");
                return ExitCode::FAILURE;
            },
        };

        tracing::info!(%address, "metrics exposed on /metrics");
        tokio::spawn(async move {
            if let Err(err) =
                axum::serve(listener, telemetry::metrics_app(handle)).await
            {
                tracing::error!(%err, "metrics server stopped");
            }
        });
    }

    let address = settings.address();
    let listener = match TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, %address, "cannot bind listener");
            return ExitCode::FAILURE;
        },
    };
    tracing::info!(%address, "server starting");

    if let Err(err) = axum::serve(listener, app(AppState::new(config)))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%err, "server stopped unexpectedly");
        return ExitCode::FAILURE;
    }

    tracing::info!("server stopped");
    ExitCode::SUCCESS
}

/// Resolve on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(err) => {
                tracing::error!(%err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
