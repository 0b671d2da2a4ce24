use anyhow::{Context, Result};
use glowdcc::api::GlowmarktClient;
use glowdcc::logging::{get_logger, init_logging};
use glowdcc::{Config, Integration};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    config.validate().context("Invalid configuration")?;
    init_logging(&config.logging).context("Failed to initialize logging")?;

    let logger = get_logger("main");
    logger.info(&format!("glowdcc {} starting up", env!("APP_VERSION")));

    let client = Arc::new(GlowmarktClient::from_config(&config)?);
    let integration = Arc::new(
        Integration::setup(&config, client)
            .await
            .context("Setup failed")?,
    );

    #[cfg(feature = "web")]
    let web_task = config.web.enabled.then(|| {
        let integration = Arc::clone(&integration);
        let (host, port) = (config.web.host.clone(), config.web.port);
        tokio::spawn(async move {
            if let Err(e) = glowdcc::web::serve(integration, &host, port).await {
                get_logger("web").error(&format!("Web server error: {e}"));
            }
        })
    });

    integration
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                logger.error(&format!("Failed to listen for shutdown signal: {e}"));
            }
        })
        .await;

    #[cfg(feature = "web")]
    if let Some(task) = web_task {
        task.abort();
    }

    logger.info("Shutdown complete");
    Ok(())
}
