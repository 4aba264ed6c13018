use clap::Parser;

use ed_cli::cli::ask::{self, AskArgs};
use ed_cli::cli::chat::{self, ChatArgs};
use ed_cli::cli::{self as commands, load_config, Cli, Command, ConfigCommand};
use ed_cli::logging::init_tracing;
use ed_llm::{Analyst, ChatOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load_config(cli.config.as_deref(), &cli.project)?;

    // `config show` output must stay parseable, so no logging there.
    if !matches!(cli.command, Command::Config(ConfigCommand::Show)) {
        init_tracing(&config.logging, cli.verbose)?;
        tracing::debug!(
            path = %config_path.display(),
            provider = %config.llm.active_provider,
            "config loaded"
        );
    }

    match cli.command {
        Command::Ask {
            prompt,
            context,
            context_tokens,
            provider,
            model,
            max_tokens,
            stream,
            json,
        } => {
            ask::run(
                &config,
                AskArgs {
                    prompt,
                    context,
                    context_tokens,
                    provider,
                    model,
                    max_tokens,
                    stream,
                    json,
                },
            )
            .await
        }
        Command::Chat {
            provider,
            model,
            system,
            compress,
        } => {
            chat::chat(
                &config,
                ChatArgs {
                    provider,
                    model,
                    system,
                    compress,
                },
            )
            .await
        }
        Command::Analyze {
            file,
            instruction,
            provider,
            model,
        } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|e| anyhow::anyhow!("reading {}: {e}", file.display()))?;
            let llm = ask::build_llm(&config, provider.as_deref())?;
            let analyst = Analyst::new(&llm).with_options(ChatOptions {
                model,
                ..Default::default()
            });
            println!("{}", analyst.analyze_content(&content, &instruction).await?);
            Ok(())
        }
        Command::Models { provider } => commands::models::list(&config, provider.as_deref()).await,
        Command::ProbeModels { provider } => commands::models::probe(&config, &provider).await,
        Command::Config(ConfigCommand::Validate) => {
            if !commands::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => commands::config::show(&config),
    }
}
