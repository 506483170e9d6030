use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::InternalLink;

#[derive(Parser)]
#[command(name = "quillpress", about = "Blog backend with multi-provider AI draft generation")]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the configuration file
    Validate,

    /// List the built-in topic catalog
    Topics,

    /// List configured generation providers in priority order
    Providers,

    /// Generate posts for a topic and print the outcomes as JSON
    Generate {
        /// Topic id from the catalog, or any free-form subject
        topic: String,

        /// Number of posts to generate (1-10)
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Internal link as "anchor=url" (repeatable)
        #[arg(long = "link", value_parser = parse_link)]
        links: Vec<InternalLink>,

        /// Save successful posts to the database as drafts
        #[arg(long)]
        save: bool,

        /// Write the JSON outcomes to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn parse_link(value: &str) -> Result<InternalLink, String> {
    let (anchor, url) = value
        .split_once('=')
        .ok_or_else(|| format!("expected \"anchor=url\", got '{value}'"))?;
    let (anchor, url) = (anchor.trim(), url.trim());
    if anchor.is_empty() || url.is_empty() {
        return Err(format!("link '{value}' needs both an anchor and a url"));
    }
    Ok(InternalLink {
        anchor: anchor.to_string(),
        url: url.to_string(),
    })
}
