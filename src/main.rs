/// Media Lounge - media sharing and chat server

use anyhow::Context;
use media_lounge::{
    config::{ServerConfig, DEFAULT_LOG_FILTER},
    context::AppContext,
    jobs, server,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env().context("failed to load configuration")?;

    // Initialize logging
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (plain, json) = if config.logging.json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();

    // Print banner
    print_banner();

    // Create application context
    let ctx = AppContext::new(config)
        .await
        .context("failed to initialize application")?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    __  ___         ___         __
   /  |/  /__  ____/ (_)___ _  / /   ____  __  ______  ____ ____
  / /|_/ / _ \/ __  / / __ `/ / /   / __ \/ / / / __ \/ __ `/ _ \
 / /  / /  __/ /_/ / / /_/ / / /___/ /_/ / /_/ / / / / /_/ /  __/
/_/  /_/\___/\__,_/_/\__,_/ /_____/\____/\__,_/_/ /_/\__, /\___/
                                                    /____/
        Media sharing and chat server v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
