use anyhow::Context;
use ragserve::{app, config, logging};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = config::load_dotenv();
    logging::init_tracing();
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }
    let config = config::load().context("invalid configuration")?;

    let router = match app::AppContext::initialize(config.clone()).await {
        Ok(context) => {
            tracing::info!("All components initialized");
            context.router()
        }
        Err(error) if config.strict_startup || !error.is_degradable() => {
            tracing::error!(error = %error, "Startup failed");
            return Err(error).context("failed to initialize the RAG pipeline");
        }
        Err(error) => {
            tracing::warn!(
                error = %error,
                "Startup failed; serving in degraded mode (pipeline routes return 503)"
            );
            app::build_router(&config, None)
        }
    };

    let listener = TcpListener::bind((config.app_host.as_str(), config.app_port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.app_host, config.app_port))?;
    tracing::info!(
        "Listening on http://{}",
        listener.local_addr().context("listener address")?
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
