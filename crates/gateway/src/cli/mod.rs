pub mod ask;
pub mod chat;
pub mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ww_domain::config::Config;

/// WasteWise: a waste-sorting assistant backed by Gemini on Vertex AI.
#[derive(Debug, Parser)]
#[command(name = "wastewise", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Send a single message and print the reply.
    Ask {
        /// The message to send.
        message: String,
        /// Session to continue.  Only meaningful within one process, so
        /// mostly useful for testing the unknown-session path.
        #[arg(long)]
        session: Option<String>,
        /// Output the reply as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Interactive chat holding one session.
    Chat,
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (defaults and env applied) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `WW_CONFIG` (or `config.toml`),
/// then apply environment overrides.  Returns the config and the path that
/// was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("WW_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path, |name| std::env::var(name).ok())?;
    Ok((config, config_path))
}

/// A missing file yields the defaults; a present but invalid file is an
/// error.
pub fn load_config_from<F>(path: &str, env: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config = if std::path::Path::new(path).exists() {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing {path}"))?
    } else {
        Config::default()
    };
    config
        .apply_env(env)
        .context("applying environment overrides")?;
    Ok(config)
}
