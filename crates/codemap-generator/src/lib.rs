// ABOUTME: Generation pipeline turning a project tree into the structure artifact
// ABOUTME: Consults the change detector and fingerprint store so only changed work is redone

pub mod entities;
pub mod generator;
pub mod prompts;

pub use generator::{GenerationOutcome, GenerationReport, GenerationRequest, ProjectGenerator};
