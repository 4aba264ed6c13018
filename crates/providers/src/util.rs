//! Helpers shared by the adapters: error mapping, token counts, API keys.

use ed_domain::config::AuthConfig;
use ed_domain::error::{Error, Result};

/// Transport failures. Timeouts stay distinct so the dispatcher can report
/// them as such; both kinds are retriable.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else if e.is_connect() {
        Error::Http(format!("cannot reach server: {e}"))
    } else {
        Error::Http(e.to_string())
    }
}

/// Build the error for a non-success HTTP answer.
///
/// The message always starts with `HTTP <code>` so callers can tell
/// server-side failures from client mistakes.
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> Error {
    Error::Provider {
        provider: provider.to_string(),
        message: format!("HTTP {} - {}", status.as_u16(), body),
    }
}

/// Token counts arrive as JSON numbers; clamp instead of wrapping.
pub(crate) fn token_count(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// API keys
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where a provider key was found. Logged in place of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// `auth.key` in the config file.
    Inline,
    /// OS keychain entry `auth.service` / `auth.account`.
    Keychain,
    /// The variable named by `auth.env` (`ANTHROPIC_API_KEY` by default).
    EnvVar,
    /// `{SERVICE}_{ACCOUNT}` on machines without a keychain daemon.
    HeadlessEnv,
}

impl KeySource {
    pub fn as_str(self) -> &'static str {
        match self {
            KeySource::Inline => "config",
            KeySource::Keychain => "keychain",
            KeySource::EnvVar => "env",
            KeySource::HeadlessEnv => "headless_env",
        }
    }
}

/// Look up a key without logging. Sources are tried in [`KeySource`]
/// declaration order; a configured `env` variable that is unset is an error
/// even when the keychain is also configured.
pub fn find_api_key(auth: &AuthConfig) -> Result<(String, KeySource)> {
    if let Some(key) = auth.key.as_deref().filter(|k| !k.trim().is_empty()) {
        return Ok((key.to_string(), KeySource::Inline));
    }

    let keychain = auth.service.as_deref().zip(auth.account.as_deref());
    if let Some((service, account)) = keychain {
        match keychain_secret(service, account) {
            Ok(secret) => return Ok((secret, KeySource::Keychain)),
            Err(e) => tracing::debug!(service, account, error = %e, "no usable keychain entry"),
        }
    }

    if let Some(var) = auth.env.as_deref() {
        return non_empty_env(var)
            .map(|v| (v, KeySource::EnvVar))
            .ok_or_else(|| Error::Auth(format!("environment variable {var} is not set")));
    }

    if let Some((service, account)) = keychain {
        let var = headless_env_name(service, account);
        return non_empty_env(&var)
            .map(|v| (v, KeySource::HeadlessEnv))
            .ok_or_else(|| {
                Error::Auth(format!(
                    "no keychain entry {service}/{account} and {var} is not set"
                ))
            });
    }

    Err(Error::Auth(
        "no API key source: set auth.env, auth.key or auth.service + auth.account".into(),
    ))
}

/// Key for a provider that cannot work without one (the hosted API).
pub fn resolve_api_key(provider: &str, auth: &AuthConfig) -> Result<String> {
    let (key, source) = find_api_key(auth).map_err(|e| match e {
        Error::Auth(msg) => Error::Auth(format!("provider {provider}: {msg}")),
        other => other,
    })?;
    if source == KeySource::Inline {
        tracing::warn!(provider, "API key read from the config file in plain text");
    }
    tracing::debug!(provider, source = source.as_str(), "API key resolved");
    Ok(key)
}

/// Bearer key for a local server. An empty auth section means no header.
pub fn optional_api_key(provider: &str, auth: &AuthConfig) -> Result<Option<String>> {
    if auth.is_empty() {
        return Ok(None);
    }
    resolve_api_key(provider, auth).map(Some)
}

fn keychain_secret(service: &str, account: &str) -> Result<String> {
    keyring::Entry::new(service, account)
        .and_then(|entry| entry.get_password())
        .map_err(|e| Error::Auth(format!("keychain {service}/{account}: {e}")))
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// `("edition", "anthropic-api-key")` → `EDITION_ANTHROPIC_API_KEY`.
pub fn headless_env_name(service: &str, account: &str) -> String {
    format!("{service}_{account}")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub(crate) fn head_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
