//! `ProviderChain` — try a model, retry it, fall back to the next model,
//! then fall back to the next provider, per §4.3.

use crate::decisions::{Decision, DecisionLog, DecisionOutcome};
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use sa_domain::config::{LlmConfig, ProviderEndpoint};
use sa_domain::error::{Error, Result};
use sa_domain::trace::TraceEvent;
use std::sync::Arc;
use std::time::Duration;

const DECISION_LOG_CAPACITY: usize = 256;

struct Entry {
    provider: Arc<dyn LlmProvider>,
    models: Vec<String>,
}

/// Drives the primary provider across its model list, then each configured
/// fallback provider across its own model list, applying the retry/backoff
/// policy in `RetryConfig` uniformly.
pub struct ProviderChain {
    entries: Vec<Entry>,
    retry: sa_domain::config::RetryConfig,
    decisions: DecisionLog,
}

impl ProviderChain {
    /// Build a chain from an `LlmConfig`: the primary endpoint carries
    /// `models.primary` + `models.fallbacks`; each `fallback_providers` entry
    /// carries its own `models` list.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut entries = Vec::new();

        let mut primary_models = vec![config.primary.clone()];
        primary_models.extend(config.fallbacks.iter().cloned());
        entries.push(Entry {
            provider: Arc::new(OpenAiCompatProvider::from_config(
                &config.proxy,
                &config.primary,
            )?),
            models: primary_models,
        });

        for fp in &config.fallback_providers {
            let default_model = fp
                .models
                .first()
                .cloned()
                .unwrap_or_else(|| config.primary.clone());
            entries.push(Entry {
                provider: Arc::new(OpenAiCompatProvider::from_config(fp, &default_model)?),
                models: fp.models.clone(),
            });
        }

        Ok(Self {
            entries,
            retry: config.retry.clone(),
            decisions: DecisionLog::new(DECISION_LOG_CAPACITY),
        })
    }

    /// Build directly from a pre-constructed provider list, bypassing
    /// endpoint resolution. Used by tests and by callers assembling a chain
    /// from non-config-driven providers (e.g. the interactive `chat` CLI
    /// pointed at an ad-hoc endpoint).
    pub fn from_providers(
        entries: Vec<(Arc<dyn LlmProvider>, Vec<String>)>,
        retry: sa_domain::config::RetryConfig,
    ) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(provider, models)| Entry { provider, models })
                .collect(),
            retry,
            decisions: DecisionLog::new(DECISION_LOG_CAPACITY),
        }
    }

    pub fn recent_decisions(&self, limit: usize) -> Vec<Decision> {
        self.decisions.recent(limit)
    }

    /// Run the full chat completion algorithm: try `req.model` first if set,
    /// then the configured model lists in order, returning the first
    /// success or the last error after exhausting everything.
    pub async fn chat(&self, mut req: ChatRequest) -> Result<ChatResponse> {
        let pinned_model = req.model.take();
        let mut last_err: Option<Error> = None;

        if let Some(model) = pinned_model {
            if let Some(entry) = self.entries.first() {
                match self.try_model(entry, &model, &req).await {
                    Ok(resp) => return Ok(resp),
                    Err(e) => last_err = Some(e),
                }
            }
        }

        let mut previous: Option<(&str, &str)> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            for model in &entry.models {
                if let Some((from_provider, from_model)) = previous {
                    TraceEvent::LlmFallback {
                        from_provider: from_provider.to_string(),
                        from_model: from_model.to_string(),
                        to_provider: entry.provider.provider_id().to_string(),
                        to_model: model.clone(),
                        reason: "previous model failed or was rate-limited".into(),
                    }
                    .emit();
                }
                previous = Some((entry.provider.provider_id(), model.as_str()));

                match self.try_model(entry, model, &req).await {
                    Ok(resp) => return Ok(resp),
                    Err(e) => {
                        let is_last_model_in_entry = entry.models.last() == Some(model);
                        let is_last_entry = i + 1 == self.entries.len();
                        if e.is_rate_limit() && !(is_last_model_in_entry && is_last_entry) {
                            tokio::time::sleep(Duration::from_millis(
                                self.retry.rate_limit_pre_fallback_pause_ms,
                            ))
                            .await;
                        }
                        last_err = Some(e);
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Provider {
            provider: "chain".into(),
            message: "no providers configured".into(),
        }))
    }

    /// Try one model on one provider, up to `max_retries` attempts, applying
    /// rate-limit-aware backoff between attempts.
    async fn try_model(&self, entry: &Entry, model: &str, req: &ChatRequest) -> Result<ChatResponse> {
        let mut attempt_req = req.clone();
        attempt_req.model = Some(model.to_string());

        let mut last_err = Error::Provider {
            provider: entry.provider.provider_id().to_string(),
            message: "no attempts made".into(),
        };

        for attempt in 0..=self.retry.max_retries {
            let started = std::time::Instant::now();
            match entry.provider.chat(&attempt_req).await {
                Ok(resp) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    self.decisions.record(Decision {
                        timestamp: chrono::Utc::now(),
                        provider: entry.provider.provider_id().to_string(),
                        model: model.to_string(),
                        attempt,
                        outcome: DecisionOutcome::Success,
                        latency_ms,
                    });
                    TraceEvent::LlmRequest {
                        provider: entry.provider.provider_id().to_string(),
                        model: model.to_string(),
                        streaming: false,
                        duration_ms: latency_ms,
                        prompt_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens),
                        completion_tokens: resp.usage.as_ref().map(|u| u.completion_tokens),
                    }
                    .emit();
                    return Ok(resp);
                }
                Err(e) => {
                    let rate_limited = e.is_rate_limit();
                    self.decisions.record(Decision {
                        timestamp: chrono::Utc::now(),
                        provider: entry.provider.provider_id().to_string(),
                        model: model.to_string(),
                        attempt,
                        outcome: if rate_limited {
                            DecisionOutcome::RateLimited
                        } else {
                            DecisionOutcome::Error
                        },
                        latency_ms: started.elapsed().as_millis() as u64,
                    });

                    let is_last_attempt = attempt == self.retry.max_retries;
                    last_err = e;
                    if is_last_attempt {
                        break;
                    }

                    let delay_ms = if rate_limited {
                        let exp = self.retry.retry_delay_ms * 2u64.saturating_pow(attempt + 2);
                        exp.min(self.retry.rate_limit_backoff_cap_ms)
                    } else {
                        self.retry.retry_delay_ms * (attempt as u64 + 1)
                    };
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }

        Err(last_err)
    }
}
