use std::sync::Arc;

use anyhow::{Context, Result};
use rand::Rng;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::HttpChatClient;
use crate::config::Config;
use crate::generate::Generator;
use crate::providers::ProviderRegistry;
use crate::{db, server, store};

const ADMIN_TOKEN_SETTING: &str = "admin_token";

/// Build the generator from config: providers in priority order over the HTTP transport.
pub fn build_generator(config: &Config) -> Result<Generator> {
    let settings = config.generation.settings()?;
    let registry = ProviderRegistry::from_config(&config.providers, config.generation.gemini_delay()?);
    let client = HttpChatClient::new(config.generation.request_timeout()?).context("building HTTP client")?;
    Ok(Generator::new(registry, Arc::new(client), settings))
}

pub async fn run(config: Config) -> Result<()> {
    let pool = db::create_pool(&config.db_path()).await.context("creating database")?;
    info!(db_path = %config.db_path().display(), "database ready");

    let admin_token = bootstrap_admin_token(&pool, &config).await?;

    let generator = build_generator(&config)?;
    let providers: Vec<String> = generator.providers().into_iter().map(|p| p.name).collect();
    if providers.is_empty() {
        warn!("no AI providers configured, generation endpoints will return 503");
    } else {
        info!(providers = ?providers, "generation providers ready");
    }

    let cancel = CancellationToken::new();

    let app_state = server::AppState {
        pool: pool.clone(),
        admin_token: Arc::from(admin_token),
        generator,
        cancel: cancel.clone(),
    };

    let router = server::build_router(app_state, &config.server.cors_origins);
    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding to {}", config.server.listen))?;

    info!(listen = %config.server.listen, "HTTP server listening");

    // Run the server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                server_cancel.cancelled().await;
            })
            .await
    });

    // Wait for shutdown signal
    wait_for_shutdown().await?;
    info!("shutdown signal received");

    // Cancelling also aborts in-flight generation requests
    cancel.cancel();

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if tokio::time::timeout(shutdown_timeout, server_handle).await.is_err() {
        warn!("server did not stop within {}s", shutdown_timeout.as_secs());
    }

    pool.close().await;
    info!("shutdown complete");

    Ok(())
}

async fn bootstrap_admin_token(pool: &SqlitePool, config: &Config) -> Result<String> {
    // Priority: config/env value → DB stored value → auto-generate
    if let Some(token) = config.server.admin_token.as_deref().filter(|t| !t.is_empty()) {
        store::set_setting(pool, ADMIN_TOKEN_SETTING, token).await?;
        info!("using admin token from config");
        return Ok(token.to_string());
    }

    if let Some(token) = store::get_setting(pool, ADMIN_TOKEN_SETTING).await? {
        info!("using stored admin token");
        return Ok(token);
    }

    let token = generate_token();
    store::set_setting(pool, ADMIN_TOKEN_SETTING, &token).await?;
    warn!(
        token = %token,
        "admin token generated, save this: it won't be shown again"
    );
    Ok(token)
}

fn generate_token() -> String {
    use rand::distr::Alphanumeric;
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

async fn wait_for_shutdown() -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("registering SIGTERM handler")?;
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("waiting for ctrl-c")?;
    }

    Ok(())
}
