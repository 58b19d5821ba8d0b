use anyhow::Result;
use async_trait::async_trait;
use codemap_ai::provider_from_config;
use codemap_core::{CodeMapConfig, ProjectId};
use codemap_generator::{GenerationReport, GenerationRequest, ProjectGenerator};
use std::path::Path;
use std::sync::Arc;

/// What a watch session calls when its debounce timer fires.
#[async_trait]
pub trait Regenerator: Send + 'static {
    async fn regenerate(&mut self, request: GenerationRequest) -> Result<GenerationReport>;
}

#[async_trait]
impl Regenerator for ProjectGenerator {
    async fn regenerate(&mut self, request: GenerationRequest) -> Result<GenerationReport> {
        self.generate(request).await
    }
}

/// Builds the regenerator of a newly registered project.
pub type RegeneratorFactory =
    Arc<dyn Fn(&ProjectId, &Path, &CodeMapConfig) -> Box<dyn Regenerator> + Send + Sync>;

/// Factory backed by the real generation pipeline.
pub fn generator_factory() -> RegeneratorFactory {
    Arc::new(|id: &ProjectId, root: &Path, config: &CodeMapConfig| {
        let provider = provider_from_config(&config.description);
        Box::new(ProjectGenerator::new(id.clone(), root, config, provider)) as Box<dyn Regenerator>
    })
}
