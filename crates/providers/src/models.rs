//! Claude model names and the short aliases accepted in config and on the
//! command line.

/// Environment variable overriding the default Claude model.
pub const DEFAULT_MODEL_ENV: &str = "CLAUDE_DEFAULT_MODEL";

/// Alias → full model name. `default` is the model used when nothing else
/// is requested.
pub const CLAUDE_MODELS: &[(&str, &str)] = &[
    ("haiku", "claude-3-haiku-20240307"),
    ("haiku-3.5", "claude-3-5-haiku-20241022"),
    ("sonnet-3.5", "claude-3-5-sonnet-20241022"),
    ("sonnet-3.7", "claude-3-7-sonnet-20250219"),
    ("sonnet-4", "claude-sonnet-4-20250514"),
    ("opus", "claude-3-opus-20240229"),
    ("opus-4", "claude-opus-4-20250514"),
    ("default", "claude-sonnet-4-20250514"),
];

/// Full name behind an alias.
pub fn alias_target(alias: &str) -> Option<&'static str> {
    CLAUDE_MODELS
        .iter()
        .find(|(name, _)| *name == alias)
        .map(|(_, model)| *model)
}

/// The built-in default model.
pub fn builtin_default() -> &'static str {
    alias_target("default").unwrap_or("claude-sonnet-4-20250514")
}

/// Pick the provider-wide default model: `CLAUDE_DEFAULT_MODEL`, then the
/// configured value, then the built-in default. Aliases are expanded.
pub fn default_claude_model(configured: Option<&str>) -> String {
    let chosen = std::env::var(DEFAULT_MODEL_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| configured.map(String::from));

    match chosen {
        Some(name) => alias_target(&name).map(String::from).unwrap_or(name),
        None => builtin_default().to_string(),
    }
}

/// Resolve what the caller asked for into a concrete model name.
///
/// - nothing requested → `default`
/// - a known alias → its full name
/// - something that is not a Claude model name → `default`, with a warning
/// - anything else is passed through unchanged
pub fn resolve_model_name(requested: Option<&str>, default: &str) -> String {
    let name = match requested.map(str::trim) {
        None | Some("") => return default.to_string(),
        Some(name) => name,
    };

    if let Some(full) = alias_target(name) {
        return full.to_string();
    }

    if !name.starts_with("claude-") {
        tracing::warn!(
            requested = %name,
            fallback = %default,
            "not a Claude model name, using the default model"
        );
        return default.to_string();
    }

    name.to_string()
}

/// Aliases first, then each distinct full name once.
pub fn supported_claude_models() -> Vec<String> {
    let mut out: Vec<String> = CLAUDE_MODELS.iter().map(|(a, _)| a.to_string()).collect();
    let mut seen = std::collections::HashSet::new();
    for (_, full) in CLAUDE_MODELS {
        if seen.insert(*full) {
            out.push(full.to_string());
        }
    }
    out
}
