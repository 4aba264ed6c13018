//! `edition models` and `edition probe-models`.

use std::time::Instant;

use ed_domain::config::Config;
use ed_domain::message::Message;
use ed_llm::{ChatOptions, UnifiedLlm};
use ed_providers::models::{alias_target, CLAUDE_MODELS};

use super::ask::build_llm;

const PROBE_PROMPT: &str = "Reply with the single word: ok";
const PROBE_MAX_TOKENS: u32 = 10;

pub async fn list(config: &Config, provider: Option<&str>) -> anyhow::Result<()> {
    let llm = build_llm(config, provider)?;
    println!("Models for provider '{}':", llm.provider());
    for model in llm.supported_models().await? {
        println!("  {model}");
    }
    Ok(())
}

/// Outcome of probing one alias.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Ok { model: String, millis: u128 },
    /// The provider answered with another model (the alias was replaced).
    FellBack { model: String },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub alias: String,
    pub outcome: ProbeOutcome,
}

/// Send a tiny request for every alias except `default`.
pub async fn probe(config: &Config, provider: &str) -> anyhow::Result<()> {
    let llm = build_llm(config, Some(provider))?;
    let mut results = Vec::new();

    for (alias, full) in CLAUDE_MODELS.iter().filter(|(a, _)| *a != "default") {
        eprint!("probing {alias:<12} ({full}) ... ");
        let result = probe_one(&llm, alias).await;
        eprintln!("{}", outcome_label(&result.outcome));
        results.push(result);
    }

    println!();
    print!("{}", recap(&results));
    Ok(())
}

async fn probe_one(llm: &UnifiedLlm, alias: &str) -> ProbeResult {
    let opts = ChatOptions::default()
        .with_model(alias)
        .with_max_tokens(PROBE_MAX_TOKENS)
        .compressed(false);

    let started = Instant::now();
    let outcome = match llm.chat(&[Message::user(PROBE_PROMPT)], opts).await {
        Ok(resp) if Some(resp.model.as_str()) == alias_target(alias) => ProbeOutcome::Ok {
            model: resp.model,
            millis: started.elapsed().as_millis(),
        },
        Ok(resp) => ProbeOutcome::FellBack { model: resp.model },
        Err(e) => ProbeOutcome::Failed {
            error: e.to_string(),
        },
    };

    ProbeResult {
        alias: alias.to_string(),
        outcome,
    }
}

fn outcome_label(outcome: &ProbeOutcome) -> String {
    match outcome {
        ProbeOutcome::Ok { millis, .. } => format!("ok ({millis} ms)"),
        ProbeOutcome::FellBack { model } => format!("unavailable, answered by {model}"),
        ProbeOutcome::Failed { error } => format!("failed: {error}"),
    }
}

/// Summary table printed after a probe run.
pub fn recap(results: &[ProbeResult]) -> String {
    let working = results
        .iter()
        .filter(|r| matches!(r.outcome, ProbeOutcome::Ok { .. }))
        .count();

    let mut out = format!("{working}/{} aliases answered\n", results.len());
    for r in results {
        let mark = match r.outcome {
            ProbeOutcome::Ok { .. } => "✓",
            ProbeOutcome::FellBack { .. } => "~",
            ProbeOutcome::Failed { .. } => "✗",
        };
        out.push_str(&format!("  {mark} {:<12} {}\n", r.alias, outcome_label(&r.outcome)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recap_counts_only_direct_answers() {
        let results = vec![
            ProbeResult {
                alias: "haiku".into(),
                outcome: ProbeOutcome::Ok {
                    model: "claude-3-haiku-20240307".into(),
                    millis: 120,
                },
            },
            ProbeResult {
                alias: "opus".into(),
                outcome: ProbeOutcome::FellBack {
                    model: "claude-sonnet-4-20250514".into(),
                },
            },
            ProbeResult {
                alias: "opus-4".into(),
                outcome: ProbeOutcome::Failed {
                    error: "provider claude: HTTP 401 - bad key".into(),
                },
            },
        ];
        let text = recap(&results);
        assert!(text.starts_with("1/3 aliases answered\n"));
        assert!(text.contains("✓ haiku"));
        assert!(text.contains("~ opus "));
        assert!(text.contains("✗ opus-4"));
        assert!(text.contains("answered by claude-sonnet-4-20250514"));
    }
}
