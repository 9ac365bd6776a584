//! Provider lookup by name and per-kind defaults.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::info;

use crate::config::{ProviderDefault, ProvidersConfig};
use crate::job::{JobKind, JobPayload};

use super::{ProviderClient, ProviderError, VolcengineTtsClient};

/// Provider chosen for a submission.
#[derive(Clone)]
pub struct ResolvedProvider {
    pub name: String,
    pub model: Option<String>,
    pub client: Arc<dyn ProviderClient>,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("name", &self.name)
            .field("model", &self.model)
            .finish()
    }
}

/// Registered vendor clients plus the configured default per kind.
#[derive(Default)]
pub struct ProviderRegistry {
    clients: HashMap<String, Arc<dyn ProviderClient>>,
    defaults: BTreeMap<JobKind, ProviderDefault>,
    default_voice: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry with every vendor client that has configuration.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        let mut registry = Self {
            clients: HashMap::new(),
            defaults: config.defaults.clone(),
            default_voice: config.default_voice.clone(),
        };

        if let Some(ref tts) = config.volcengine_tts {
            registry = registry.register(Arc::new(VolcengineTtsClient::new(tts.clone())?));
        }

        info!(
            "Provider registry ready: {} client(s), {} default(s)",
            registry.clients.len(),
            registry.defaults.len()
        );
        Ok(registry)
    }

    /// Add a client under its own name. A later client replaces an earlier one.
    pub fn register(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.clients.insert(client.name().to_string(), client);
        self
    }

    /// Set the provider used for `kind` when a request names none.
    pub fn with_default(
        mut self,
        kind: JobKind,
        provider: impl Into<String>,
        model: Option<String>,
    ) -> Self {
        self.defaults.insert(
            kind,
            ProviderDefault {
                provider: provider.into(),
                model,
            },
        );
        self
    }

    pub fn with_default_voice(mut self, voice: impl Into<String>) -> Self {
        self.default_voice = Some(voice.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(name).cloned()
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }

    /// Pick the provider for `kind`: the request override if given, else the
    /// configured default. The default model only applies to the default provider.
    pub fn resolve(
        &self,
        kind: JobKind,
        requested: Option<&str>,
    ) -> Result<ResolvedProvider, ProviderError> {
        let default = self.defaults.get(&kind);
        let name = match requested.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => default
                .map(|d| d.provider.clone())
                .ok_or_else(|| {
                    ProviderError::NotConfigured(format!("no default provider for {}", kind))
                })?,
        };

        let client = self
            .get(&name)
            .ok_or_else(|| ProviderError::NotConfigured(format!("unknown provider {}", name)))?;

        if !client.supports(kind) {
            return Err(ProviderError::UnsupportedKind {
                provider: name,
                kind,
            });
        }

        let model = default
            .filter(|d| d.provider == name)
            .and_then(|d| d.model.clone());

        Ok(ResolvedProvider {
            name,
            model,
            client,
        })
    }

    /// Fill request fields that have configured defaults.
    pub fn apply_defaults(&self, payload: &mut JobPayload) {
        let Some(ref voice) = self.default_voice else {
            return;
        };
        match payload {
            JobPayload::TtsSynthesis(p) if p.voice.trim().is_empty() => {
                p.voice = voice.clone();
            }
            JobPayload::AvatarRender(p)
                if p.audio_url.is_none() && p.voice.as_deref().map_or(true, str::is_empty) =>
            {
                p.voice = Some(voice.clone());
            }
            _ => {}
        }
    }
}
