//! LLM integration module.
//!
//! Provides an OpenAI-compatible client and the fallback collaborator the
//! resolver consults when rule-based resolution fails.

mod client;
mod fallback;
mod prompts;

pub use client::{LlmClient, Message, Role};
pub use fallback::{parse_sections, FallbackRequest, FallbackSection, LlmFallback, NoFallback, SectionFallback};
pub use prompts::Prompts;
