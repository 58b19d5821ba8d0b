use crate::openai_compatible_provider::{OpenAICompatibleConfig, OpenAICompatibleProvider};
use async_trait::async_trait;
use codemap_core::DescriptionConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Produces free-text descriptions for prompts.
///
/// Implementations never fail: any error is logged and reported as the
/// empty string, which callers read as "no description available".
#[async_trait]
pub trait DescriptionProvider: Send + Sync {
    async fn describe(&self, prompt: &str) -> String;

    fn provider_name(&self) -> &str;
}

/// Provider used when descriptions are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDescriptionProvider;

#[async_trait]
impl DescriptionProvider for NoopDescriptionProvider {
    async fn describe(&self, _prompt: &str) -> String {
        String::new()
    }

    fn provider_name(&self) -> &str {
        "noop"
    }
}

/// Cuts `prompt` to at most `max_chars` characters on a char boundary.
pub fn truncate_prompt(prompt: &str, max_chars: usize) -> &str {
    match prompt.char_indices().nth(max_chars) {
        Some((idx, _)) => &prompt[..idx],
        None => prompt,
    }
}

/// Builds the provider selected by configuration. A provider that cannot be
/// constructed degrades to the no-op provider.
pub fn provider_from_config(config: &DescriptionConfig) -> Arc<dyn DescriptionProvider> {
    if !config.enabled {
        return Arc::new(NoopDescriptionProvider);
    }
    let provider_config = OpenAICompatibleConfig {
        base_url: config.base_url.trim_end_matches('/').to_string(),
        model: config.model.clone(),
        api_key: config.api_key.clone(),
        timeout_secs: config.timeout_secs,
        max_retries: config.max_retries,
        max_chars: config.max_chars,
        ..Default::default()
    };
    match OpenAICompatibleProvider::new(provider_config) {
        Ok(provider) => {
            info!(
                "Descriptions enabled: {} at {}",
                config.model, config.base_url
            );
            Arc::new(provider)
        }
        Err(e) => {
            warn!("Description provider unavailable, continuing without: {:#}", e);
            Arc::new(NoopDescriptionProvider)
        }
    }
}
