use std::net::{Ipv4Addr, SocketAddr};

use mihu::config::DEFAULT_PORT;

#[tokio::main]
async fn main() {
    mihu::telemetry::setup_logging();

    let state = match mihu::initialize_state().await {
        Ok(state) => state,
        Err(error) => {
            // without storage the API cannot serve anything.
            tracing::error!(%error, "cannot initialize application state");
            std::process::exit(1);
        },
    };

    let addr = SocketAddr::from((
        Ipv4Addr::UNSPECIFIED,
        state.config.port.unwrap_or(DEFAULT_PORT),
    ));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%addr, %error, "cannot bind listener");
            std::process::exit(1);
        },
    };

    tracing::info!(%addr, "server started");

    if let Err(error) = axum::serve(listener, mihu::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%error, "server stopped unexpectedly");
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "cannot listen for shutdown signal");
    }

    tracing::info!("shutting down");
}
