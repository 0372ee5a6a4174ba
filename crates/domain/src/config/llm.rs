use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM / models configuration (spec §6 `models.*`)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `[models]` — the primary/fallback model chain and proxy connection the
/// `ProviderChain` (§4.3) drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model tried first on every call.
    #[serde(default = "d_primary_model")]
    pub primary: String,
    /// Models tried, in order, on the primary provider after `primary`
    /// exhausts its retries.
    #[serde(default)]
    pub fallbacks: Vec<String>,
    /// OpenAI-compatible endpoint the primary/fallback models above run on.
    #[serde(default)]
    pub proxy: ProviderEndpoint,
    /// Additional (provider, models) fallback tuples tried, in order, once
    /// every model on `proxy` has been exhausted (§4.3 "fallback providers").
    #[serde(default)]
    pub fallback_providers: Vec<ProviderEndpoint>,
    /// Default sampling temperature for orchestrator turns.
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    /// Default max output tokens for orchestrator turns.
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    /// Retry/backoff policy shared by every model in the chain.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary: d_primary_model(),
            fallbacks: Vec::new(),
            proxy: ProviderEndpoint::default(),
            fallback_providers: Vec::new(),
            temperature: d_temperature(),
            max_tokens: d_max_tokens(),
            retry: RetryConfig::default(),
        }
    }
}

/// Connection details for one OpenAI-compatible endpoint.
///
/// Used both as `models.proxy` (the primary provider) and as an entry in
/// `models.fallback_providers` (§4.3's provider-level fallback chain).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    #[serde(default = "d_provider_id")]
    pub id: String,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Models to try on this endpoint, in order. Ignored on `models.proxy`,
    /// which instead uses `models.primary` + `models.fallbacks`.
    #[serde(default)]
    pub models: Vec<String>,
    /// Plaintext API key. Prefer `api_key_env`; kept as an escape hatch,
    /// matching the teacher's `AuthConfig.key` (warned on use).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: Option<String>,
    /// OS keychain service/account, tried before `api_key_env`.
    #[serde(default)]
    pub keychain_service: Option<String>,
    #[serde(default)]
    pub keychain_account: Option<String>,
    #[serde(default = "d_timeout_s")]
    pub timeout_s: u64,
}

impl Default for ProviderEndpoint {
    fn default() -> Self {
        Self {
            id: d_provider_id(),
            base_url: d_base_url(),
            models: Vec::new(),
            api_key: None,
            api_key_env: d_api_key_env(),
            keychain_service: None,
            keychain_account: None,
            timeout_s: d_timeout_s(),
        }
    }
}

/// Retry/backoff knobs for `Error` classification in the provider chain
/// (§4.3: linear backoff for transient errors, exponential for rate limits).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    /// Base delay in milliseconds for both backoff curves.
    #[serde(default = "d_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Exponential backoff ceiling.
    #[serde(default = "d_rate_limit_cap_ms")]
    pub rate_limit_backoff_cap_ms: u64,
    /// Pause before moving to the next model after rate-limit exhaustion.
    #[serde(default = "d_rate_limit_pause_ms")]
    pub rate_limit_pre_fallback_pause_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: d_max_retries(),
            retry_delay_ms: d_retry_delay_ms(),
            rate_limit_backoff_cap_ms: d_rate_limit_cap_ms(),
            rate_limit_pre_fallback_pause_ms: d_rate_limit_pause_ms(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_primary_model() -> String {
    "gpt-4o".into()
}
fn d_provider_id() -> String {
    "primary".into()
}
fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".into())
}
fn d_timeout_s() -> u64 {
    120
}
fn d_temperature() -> f32 {
    0.7
}
fn d_max_tokens() -> u32 {
    4096
}
fn d_max_retries() -> u32 {
    2
}
fn d_retry_delay_ms() -> u64 {
    1000
}
fn d_rate_limit_cap_ms() -> u64 {
    30_000
}
fn d_rate_limit_pause_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = LlmConfig::default();
        assert_eq!(cfg.primary, "gpt-4o");
        assert!(cfg.fallbacks.is_empty());
        assert_eq!(cfg.retry.max_retries, 2);
        assert_eq!(cfg.retry.rate_limit_backoff_cap_ms, 30_000);
    }

    #[test]
    fn deserializes_partial_config() {
        let json = r#"{"primary": "gpt-4o-mini", "fallbacks": ["gpt-3.5-turbo"]}"#;
        let cfg: LlmConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.primary, "gpt-4o-mini");
        assert_eq!(cfg.fallbacks, vec!["gpt-3.5-turbo".to_string()]);
        assert_eq!(cfg.temperature, 0.7);
    }
}
