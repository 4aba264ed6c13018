pub mod ask;
pub mod chat;
pub mod config;
pub mod models;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use ed_domain::config::Config;

/// edition: LLM assistant for literary writing projects.
#[derive(Debug, Parser)]
#[command(name = "edition", version, about)]
pub struct Cli {
    /// Explicit config file (otherwise discovered from the project directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Project directory used for config discovery.
    #[arg(long, global = true, default_value = ".")]
    pub project: PathBuf,
    /// Log at debug level regardless of the configured filter.
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a single prompt and print the answer.
    Ask {
        /// The prompt to send.
        prompt: String,
        /// File whose content is sent as context before the prompt.
        #[arg(long)]
        context: Option<PathBuf>,
        /// Trim the context file to roughly this many tokens first.
        #[arg(long)]
        context_tokens: Option<usize>,
        /// Provider id override (e.g. "lmstudio").
        #[arg(long)]
        provider: Option<String>,
        /// Model or alias override (e.g. "sonnet-3.7").
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Stream tokens as they arrive.
        #[arg(long)]
        stream: bool,
        /// Print the answer and token usage as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Interactive conversation with history and compression.
    Chat {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// System prompt for the session.
        #[arg(long)]
        system: Option<String>,
        /// Compress the history before each request.
        #[arg(long)]
        compress: bool,
    },
    /// Run an editorial instruction over a text file.
    Analyze {
        file: PathBuf,
        /// What to look for (style, pacing, consistency...).
        #[arg(long, default_value = "Analyze the style, structure and clarity of this text.")]
        instruction: String,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// List the models a provider accepts.
    Models {
        #[arg(long)]
        provider: Option<String>,
    },
    /// Try every Claude alias with a tiny request and report which answer.
    ProbeModels {
        #[arg(long, default_value = "claude")]
        provider: String,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration: `--config` when given, otherwise discovery under
/// the project directory. Returns the config and the path it came from (or
/// would be written to).
pub fn load_config(explicit: Option<&Path>, project: &Path) -> anyhow::Result<(Config, PathBuf)> {
    match explicit {
        Some(path) => {
            let config = Config::load(path)
                .map_err(|e| anyhow::anyhow!("loading {}: {e}", path.display()))?;
            Ok((config, path.to_path_buf()))
        }
        None => Ok(Config::discover(project)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_with_overrides() {
        let cli = Cli::try_parse_from([
            "edition", "ask", "Propose un titre", "--provider", "lmstudio", "--model", "haiku",
            "--stream",
        ])
        .unwrap();
        match cli.command {
            Command::Ask { prompt, provider, model, stream, json, .. } => {
                assert_eq!(prompt, "Propose un titre");
                assert_eq!(provider.as_deref(), Some("lmstudio"));
                assert_eq!(model.as_deref(), Some("haiku"));
                assert!(stream);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["edition", "config", "show", "--config", "x.toml", "-v"]).unwrap();
        assert!(matches!(cli.command, Command::Config(ConfigCommand::Show)));
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(cli.verbose);
    }

    #[test]
    fn load_config_reports_bad_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = load_config(Some(&missing), dir.path()).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn load_config_discovers_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("edition.toml"),
            "[llm]\nactive_provider = \"lmstudio\"\n",
        )
        .unwrap();
        // Discovery honours EDITION_CONFIG first; skip if the environment sets it.
        if std::env::var(ed_domain::config::CONFIG_ENV).is_ok() {
            return;
        }
        let (config, path) = load_config(None, dir.path()).unwrap();
        assert_eq!(config.llm.active_provider, "lmstudio");
        assert!(path.ends_with("edition.toml"));
    }
}
