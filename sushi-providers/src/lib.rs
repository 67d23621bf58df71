//! LLM backends for the SushiBot relay.
//!
//! - [`catalog`]: the closed set of models a session can switch between
//! - [`provider`]: the `Provider` trait, its HTTP backends and the registry
//!   that routes a model id to the backend serving it

pub mod catalog;
pub mod provider;

pub use catalog::{Backend, KnownModel, DEFAULT_MODEL};
pub use provider::{
    create_registry, AnthropicProvider, AuthStyle, ChatRequest, ChatResponse,
    CompatibleProvider, GeminiProvider, Message, Provider, ProviderError, ProviderRegistry,
    TextStream, TokenUsage,
};
