use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider system
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider id used for requests until switched at runtime.
    #[serde(default = "d_active")]
    pub active_provider: String,
    /// Provider ids tried, in order, when the active one fails with a
    /// transient error. The active provider itself is skipped.
    #[serde(default = "d_fallback")]
    pub fallback_order: Vec<String>,
    #[serde(default = "d_120000u")]
    pub default_timeout_ms: u64,
    /// Default response budget when the caller does not set one.
    #[serde(default = "d_1000")]
    pub max_tokens: u32,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    /// Registered LLM providers (adding a provider = adding config).
    #[serde(default = "d_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            active_provider: d_active(),
            fallback_order: d_fallback(),
            default_timeout_ms: d_120000u(),
            max_tokens: d_1000(),
            temperature: d_temperature(),
            providers: d_providers(),
        }
    }
}

impl LlmConfig {
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Answer locally without any network call. Only honoured by the
    /// LM Studio adapter; useful for dry runs and offline tests.
    #[serde(default)]
    pub simulate: bool,
}

impl ProviderConfig {
    /// The hosted Claude API, keyed by `ANTHROPIC_API_KEY`.
    pub fn anthropic(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ProviderKind::Anthropic,
            base_url: "https://api.anthropic.com".into(),
            auth: AuthConfig {
                env: Some("ANTHROPIC_API_KEY".into()),
                ..Default::default()
            },
            default_model: None,
            embedding_model: None,
            simulate: false,
        }
    }

    /// A local LM Studio server on its default port.
    pub fn lm_studio(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ProviderKind::LmStudio,
            base_url: "http://localhost:1234/v1".into(),
            auth: AuthConfig::default(),
            default_model: None,
            embedding_model: None,
            simulate: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    LmStudio,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer env or keychain).
    #[serde(default)]
    pub key: Option<String>,
    /// Keychain service name (e.g., "edition").
    #[serde(default)]
    pub service: Option<String>,
    /// Keychain account name (e.g., "anthropic-api-key").
    #[serde(default)]
    pub account: Option<String>,
}

impl AuthConfig {
    pub fn is_empty(&self) -> bool {
        self.env.is_none() && self.key.is_none() && self.service.is_none() && self.account.is_none()
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_active() -> String {
    "claude".into()
}
fn d_fallback() -> Vec<String> {
    vec!["lmstudio".into()]
}
fn d_120000u() -> u64 {
    120_000
}
fn d_1000() -> u32 {
    1000
}
fn d_temperature() -> f32 {
    0.7
}
fn d_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::anthropic("claude"),
        ProviderConfig::lm_studio("lmstudio"),
    ]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
