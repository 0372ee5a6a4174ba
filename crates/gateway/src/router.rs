//! Location → Persona routing (spec §4.4).
//!
//! Grounded on the teacher's persona/channel-routing shape in
//! `runtime/turn.rs` (persona lookup feeding into per-turn provider/model
//! selection), rewritten around the trimmed `RouterConfig`/`PersonaConfig`
//! and a cached per-persona `ProviderChain`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use sa_domain::config::{Config, LlmConfig, PersonaConfig, ProviderEndpoint};
use sa_domain::error::Result;
use sa_providers::ProviderChain;

/// Recalls relevant prior context from an external memory capability.
/// Out of scope for this core (§1); the default never recalls anything.
#[async_trait]
pub trait MemoryRecall: Send + Sync {
    async fn recall(&self, _location: &str, _persona: &str) -> Option<String> {
        None
    }
}

pub struct NoopMemoryRecall;

#[async_trait]
impl MemoryRecall for NoopMemoryRecall {
    async fn recall(&self, _location: &str, _persona: &str) -> Option<String> {
        None
    }
}

pub struct Router {
    config: sa_domain::config::RouterConfig,
    llm_config: LlmConfig,
    default_chain: Arc<ProviderChain>,
    persona_chains: Mutex<HashMap<String, Arc<ProviderChain>>>,
    memory: Arc<dyn MemoryRecall>,
}

impl Router {
    pub fn new(config: &Config, default_chain: Arc<ProviderChain>) -> Self {
        Self {
            config: config.router.clone(),
            llm_config: config.models.clone(),
            default_chain,
            persona_chains: Mutex::new(HashMap::new()),
            memory: Arc::new(NoopMemoryRecall),
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryRecall>) -> Self {
        self.memory = memory;
        self
    }

    /// O(1) lookup of the persona mapped to `location`, falling back to
    /// `default_persona` when no channel-specific mapping exists.
    pub fn route(&self, location: &str) -> Option<&PersonaConfig> {
        self.config
            .personas
            .iter()
            .find(|p| p.channel_ids.iter().any(|c| c == location))
            .or_else(|| {
                self.config
                    .default_persona
                    .as_ref()
                    .and_then(|name| self.config.personas.iter().find(|p| &p.name == name))
            })
    }

    /// Whether `location` is covered by any persona mapping. Used by
    /// admission filtering (§6): when routing is active, unmapped
    /// non-DM locations are ignored.
    pub fn is_routed(&self) -> bool {
        !self.config.personas.is_empty()
    }

    pub fn is_user_authorized(persona: &PersonaConfig, user_id: &str) -> bool {
        match &persona.authorized_users {
            Some(allowed) => allowed.iter().any(|u| u == user_id),
            None => true,
        }
    }

    /// Returns the `ProviderChain` to use for `location`: a cached
    /// per-persona chain if the matched persona pins a distinct
    /// `base_url`, otherwise the shared default chain.
    pub fn chain_for(&self, location: &str) -> Result<Arc<ProviderChain>> {
        let Some(persona) = self.route(location) else {
            return Ok(self.default_chain.clone());
        };

        let Some(base_url) = &persona.base_url else {
            return Ok(self.default_chain.clone());
        };

        if let Some(existing) = self.persona_chains.lock().get(&persona.name) {
            return Ok(existing.clone());
        }

        let mut endpoint = self.llm_config.proxy.clone();
        endpoint.base_url = base_url.clone();
        if let Some(model) = &persona.model {
            endpoint.models = vec![model.clone()];
        }

        let chain = Arc::new(self.build_persona_chain(&endpoint, persona)?);
        self.persona_chains
            .lock()
            .insert(persona.name.clone(), chain.clone());
        Ok(chain)
    }

    fn build_persona_chain(
        &self,
        endpoint: &ProviderEndpoint,
        persona: &PersonaConfig,
    ) -> Result<ProviderChain> {
        let model = persona
            .model
            .clone()
            .unwrap_or_else(|| self.llm_config.primary.clone());
        let provider = sa_providers::OpenAiCompatProvider::from_config(endpoint, &model)?;
        let mut models = vec![model];
        models.extend(self.llm_config.fallbacks.iter().cloned());
        Ok(ProviderChain::from_providers(
            vec![(Arc::new(provider), models)],
            self.llm_config.retry.clone(),
        ))
    }

    /// Concatenates the text of `persona.prompt_files` (or the global
    /// fallback) joined by `\n\n---\n\n`, optionally appending a recalled
    /// memory block.
    pub async fn system_prompt_for(&self, persona: Option<&PersonaConfig>, location: &str) -> String {
        let (workspace, files): (&str, &[String]) = match persona {
            Some(p) => (p.workspace.as_str(), &p.prompt_files),
            None => (".", &[]),
        };

        let mut sections = Vec::new();
        for file in files {
            let path = Path::new(workspace).join(file);
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => sections.push(content),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "prompt file unreadable, skipping");
                }
            }
        }

        let mut prompt = sections.join("\n\n---\n\n");

        let persona_name = persona.map(|p| p.name.as_str()).unwrap_or("default");
        if let Some(recalled) = self.memory.recall(location, persona_name).await {
            if !prompt.is_empty() {
                prompt.push_str("\n\n---\n\n");
            }
            prompt.push_str(&recalled);
        }

        prompt
    }

    pub fn report_back_for(&self, location: &str) -> Option<&sa_domain::config::ReportBackEntry> {
        self.config.report_back.iter().find(|r| r.location == location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::RouterConfig;

    fn persona(name: &str, channels: Vec<&str>) -> PersonaConfig {
        PersonaConfig {
            name: name.into(),
            channel_ids: channels.into_iter().map(String::from).collect(),
            workspace: ".".into(),
            prompt_files: vec![],
            model: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: 4096,
            authorized_users: None,
            require_mention: None,
        }
    }

    fn router_with(personas: Vec<PersonaConfig>, default_persona: Option<&str>) -> Router {
        let mut config = Config::default();
        config.router = RouterConfig {
            personas,
            default_persona: default_persona.map(String::from),
            report_back: vec![],
        };
        let chain = Arc::new(ProviderChain::from_providers(vec![], Default::default()));
        Router::new(&config, chain)
    }

    #[test]
    fn routes_explicit_channel_mapping() {
        let router = router_with(vec![persona("eng", vec!["chan-1"])], None);
        let matched = router.route("chan-1").unwrap();
        assert_eq!(matched.name, "eng");
    }

    #[test]
    fn falls_back_to_default_persona() {
        let router = router_with(
            vec![persona("eng", vec!["chan-1"]), persona("general", vec![])],
            Some("general"),
        );
        let matched = router.route("chan-unmapped").unwrap();
        assert_eq!(matched.name, "general");
    }

    #[test]
    fn unmapped_location_with_no_default_is_none() {
        let router = router_with(vec![persona("eng", vec!["chan-1"])], None);
        assert!(router.route("chan-unmapped").is_none());
    }

    #[test]
    fn authorized_users_gate_when_set() {
        let mut p = persona("eng", vec!["chan-1"]);
        p.authorized_users = Some(vec!["alice".into()]);
        assert!(Router::is_user_authorized(&p, "alice"));
        assert!(!Router::is_user_authorized(&p, "bob"));
    }

    #[test]
    fn no_authorized_users_list_allows_anyone() {
        let p = persona("eng", vec!["chan-1"]);
        assert!(Router::is_user_authorized(&p, "anyone"));
    }

    #[test]
    fn is_routed_reflects_persona_presence() {
        assert!(!router_with(vec![], None).is_routed());
        assert!(router_with(vec![persona("eng", vec!["chan-1"])], None).is_routed());
    }

    #[tokio::test]
    async fn system_prompt_for_none_persona_is_empty() {
        let router = router_with(vec![], None);
        let prompt = router.system_prompt_for(None, "loc").await;
        assert_eq!(prompt, "");
    }
}
