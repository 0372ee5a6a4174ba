mod agent;
mod compaction;
mod daemon;
mod discord;
mod llm;
mod logging;
mod router;
mod sessions;

pub use agent::*;
pub use compaction::*;
pub use daemon::*;
pub use discord::*;
pub use llm::*;
pub use logging::*;
pub use router::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config (spec §6 "Configuration")
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub models: LlmConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. An empty
    /// vec means the config is usable as-is.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.models.primary.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "models.primary".into(),
                message: "primary model must not be empty".into(),
            });
        }

        if self.models.proxy.base_url.is_empty()
            || !(self.models.proxy.base_url.starts_with("http://")
                || self.models.proxy.base_url.starts_with("https://"))
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "models.proxy.base_url".into(),
                message: format!(
                    "base_url must start with http:// or https:// (got \"{}\")",
                    self.models.proxy.base_url
                ),
            });
        }

        if self.models.proxy.api_key.is_none() && self.models.proxy.api_key_env.is_none() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "models.proxy".into(),
                message: "no api_key or api_key_env configured; requests will fail auth".into(),
            });
        }

        for (i, fp) in self.models.fallback_providers.iter().enumerate() {
            if fp.models.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("models.fallback_providers[{i}].models"),
                    message: "fallback provider has no models configured".into(),
                });
            }
        }

        if self.compaction.target_tokens >= self.compaction.max_context_tokens {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "compaction.target_tokens".into(),
                message: "target_tokens must be less than max_context_tokens".into(),
            });
        }

        if self.agent.max_tool_rounds == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "agent.max_tool_rounds".into(),
                message: "max_tool_rounds must be bounded and greater than 0".into(),
            });
        }

        // Persona validation: name uniqueness, non-empty channel lists, and
        // that `default_persona` (if set) names a real persona.
        let mut seen_names: HashSet<&str> = HashSet::new();
        let mut seen_channels: HashSet<&str> = HashSet::new();
        for (i, persona) in self.router.personas.iter().enumerate() {
            if persona.name.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("router.personas[{i}].name"),
                    message: "persona name must not be empty".into(),
                });
            } else if !seen_names.insert(&persona.name) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("router.personas[{i}].name"),
                    message: format!("duplicate persona name \"{}\"", persona.name),
                });
            }
            for channel in &persona.channel_ids {
                if !seen_channels.insert(channel.as_str()) {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Warning,
                        field: format!("router.personas[{i}].channel_ids"),
                        message: format!(
                            "channel \"{channel}\" is mapped to more than one persona; the last match wins"
                        ),
                    });
                }
            }
        }
        if let Some(default) = &self.router.default_persona {
            if !self.router.personas.iter().any(|p| &p.name == default) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "router.default_persona".into(),
                    message: format!("default_persona \"{default}\" does not name a configured persona"),
                });
            }
        }

        for (i, entry) in self.router.report_back.iter().enumerate() {
            if !(entry.webhook_url.starts_with("http://") || entry.webhook_url.starts_with("https://")) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("router.report_back[{i}].webhook_url"),
                    message: "webhook_url must start with http:// or https://".into(),
                });
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            models: LlmConfig {
                proxy: ProviderEndpoint {
                    base_url: "https://api.openai.com/v1".into(),
                    api_key_env: Some("OPENAI_API_KEY".into()),
                    ..ProviderEndpoint::default()
                },
                ..LlmConfig::default()
            },
            ..Config::default()
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn empty_primary_model_is_error() {
        let mut cfg = valid_config();
        cfg.models.primary = String::new();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "models.primary").is_some());
    }

    #[test]
    fn bad_base_url_is_error() {
        let mut cfg = valid_config();
        cfg.models.proxy.base_url = "ftp://example.com".into();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "models.proxy.base_url").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn missing_api_key_is_warning() {
        let mut cfg = valid_config();
        cfg.models.proxy.api_key_env = None;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "models.proxy").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn target_tokens_must_be_below_max() {
        let mut cfg = valid_config();
        cfg.compaction.target_tokens = cfg.compaction.max_context_tokens;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "compaction.target_tokens").is_some());
    }

    #[test]
    fn duplicate_persona_names_rejected() {
        let mut cfg = valid_config();
        cfg.router.personas = vec![
            PersonaConfig {
                name: "ops".into(),
                channel_ids: vec!["c1".into()],
                workspace: ".".into(),
                prompt_files: vec![],
                model: None,
                base_url: None,
                temperature: 0.7,
                max_tokens: 4096,
                authorized_users: None,
                require_mention: None,
            },
            PersonaConfig {
                name: "ops".into(),
                channel_ids: vec!["c2".into()],
                workspace: ".".into(),
                prompt_files: vec![],
                model: None,
                base_url: None,
                temperature: 0.7,
                max_tokens: 4096,
                authorized_users: None,
                require_mention: None,
            },
        ];
        let issues = cfg.validate();
        assert!(find_issue(&issues, "router.personas[1].name").is_some());
    }

    #[test]
    fn unknown_default_persona_is_error() {
        let mut cfg = valid_config();
        cfg.router.default_persona = Some("missing".into());
        let issues = cfg.validate();
        assert!(find_issue(&issues, "router.default_persona").is_some());
    }

    #[test]
    fn deserializes_partial_json() {
        let json = r#"{"agent": {"max_tool_rounds": 10}}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.agent.max_tool_rounds, 10);
        assert_eq!(cfg.models.primary, "gpt-4o");
    }
}
