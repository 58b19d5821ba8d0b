pub mod openai_compatible_provider;
pub mod provider;

pub use openai_compatible_provider::{OpenAICompatibleConfig, OpenAICompatibleProvider};
pub use provider::{
    provider_from_config, truncate_prompt, DescriptionProvider, NoopDescriptionProvider,
};
