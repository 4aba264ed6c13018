//! `edition ask`: one-shot prompt.
//!
//! Sends a single prompt (optionally preceded by a context file), prints the
//! answer to stdout and exits. Useful for scripting and piping.

use std::io::Write;
use std::path::PathBuf;

use ed_domain::config::Config;
use ed_domain::message::Message;
use ed_domain::stream::StreamEvent;
use ed_llm::{ChatOptions, UnifiedLlm};
use futures_util::StreamExt;

pub struct AskArgs {
    pub prompt: String,
    pub context: Option<PathBuf>,
    pub context_tokens: Option<usize>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
    pub json: bool,
}

/// Build the dispatcher and switch to `provider` when one is given.
pub fn build_llm(config: &Config, provider: Option<&str>) -> anyhow::Result<UnifiedLlm> {
    let llm = UnifiedLlm::from_config(config)?;
    if let Some(id) = provider {
        llm.set_provider(id)?;
    }
    Ok(llm)
}

pub async fn run(config: &Config, args: AskArgs) -> anyhow::Result<()> {
    let llm = build_llm(config, args.provider.as_deref())?;

    let context = match &args.context {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
            Some(match args.context_tokens {
                Some(budget) => llm.compress_text(&raw, budget),
                None => raw,
            })
        }
        None => None,
    };

    let opts = ChatOptions {
        model: args.model.clone(),
        max_tokens: args.max_tokens,
        ..Default::default()
    };

    if args.stream && !args.json {
        let content = match &context {
            Some(ctx) => format!("{ctx}\n\n{}", args.prompt),
            None => args.prompt.clone(),
        };
        let mut stream = llm.chat_stream(&[Message::user(content)], opts).await?;
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Token { text } => {
                    print!("{text}");
                    std::io::stdout().flush().ok();
                }
                StreamEvent::Done { .. } => println!(),
                StreamEvent::Error { message } => anyhow::bail!("stream error: {message}"),
            }
        }
        return Ok(());
    }

    let answer = llm.generate(&args.prompt, context.as_deref(), opts).await?;

    if args.json {
        let usage = llm.token_usage();
        let out = serde_json::json!({
            "provider": llm.provider(),
            "content": answer,
            "usage": usage,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{answer}");
    }
    Ok(())
}
