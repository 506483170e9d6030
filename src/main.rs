mod batch;
mod cli;
mod client;
mod config;
mod daemon;
mod db;
mod error;
mod extract;
mod generate;
mod models;
mod pipeline;
mod prompt;
mod providers;
mod server;
mod store;
mod topics;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::config::{Config, load_config, validate_config};
use crate::models::GenerationRequest;
use crate::prompt::PromptBuilder;
use crate::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing config file is fine: defaults plus environment credentials
    let config_found = cli.config.exists();
    let config = if config_found {
        load_config(&cli.config).with_context(|| format!("loading config from {}", cli.config.display()))?
    } else {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    };

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if config_found {
        info!(config_path = %cli.config.display(), "config loaded");
    } else {
        info!(config_path = %cli.config.display(), "config file not found, using defaults");
    }

    validate_config(&config).context("config validation failed")?;
    info!("config validated successfully");

    match cli.command {
        Some(Commands::Validate) => {
            println!("Configuration is valid.");
        }
        Some(Commands::Topics) => {
            for topic in topics::list_topics() {
                println!("{:<16} {:<20} {}", topic.id, topic.name, topic.description);
            }
        }
        Some(Commands::Providers) => {
            let generator = daemon::build_generator(&config)?;
            let providers = generator.providers();
            if providers.is_empty() {
                println!("No AI providers configured.");
            }
            for (i, provider) in providers.iter().enumerate() {
                let pacing = provider
                    .pre_call_delay
                    .map(|d| format!(" (waits {} before each call)", humantime::format_duration(d)))
                    .unwrap_or_default();
                println!("{}. {} [{}] {}{}", i + 1, provider.name, provider.model, provider.base_url, pacing);
            }
        }
        Some(Commands::Generate {
            topic,
            count,
            links,
            save,
            output,
        }) => {
            let pool = if save {
                let pool = db::create_pool(&config.db_path()).await.context("creating database")?;
                info!(db_path = %config.db_path().display(), "database ready");
                Some(pool)
            } else {
                None
            };

            let catalog = match &pool {
                Some(pool) => store::topic_catalog(pool).await?,
                None => topics::list_topics(),
            };
            let generator = daemon::build_generator(&config)?.with_prompts(PromptBuilder::new(catalog));

            let mut request = GenerationRequest::new(topic, count);
            request.internal_links = links;

            // Ctrl-C aborts the run between provider calls
            let cancel = CancellationToken::new();
            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c_cancel.cancel();
                }
            });

            let outcomes = generator.generate_batch(&request, &cancel).await?;
            let json = serde_json::to_string_pretty(&outcomes).context("serializing outcomes")?;

            match output {
                Some(path) => {
                    std::fs::write(&path, &json).with_context(|| format!("writing output to {}", path.display()))?;
                    println!("Outcomes written to: {}", path.display());
                }
                None => println!("{json}"),
            }

            if let Some(pool) = pool {
                let summary = pipeline::persist_outcomes(&SqliteStore::new(pool.clone()), outcomes).await;
                println!(
                    "Saved {} draft(s) ({} under a numbered slug), {} failed.",
                    summary.posts.len(),
                    summary.renamed,
                    summary.errors.len()
                );
                pool.close().await;
            }
        }
        None => {
            daemon::run(config).await?;
        }
    }

    Ok(())
}
