//! LLM completion service and the prompts built on it

pub mod client;
pub mod extractor;
pub mod json;

pub use client::ClaudeClient;

use thiserror::Error;

use crate::BoxFuture;

/// Shape the model is asked to answer in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    /// Bare JSON, no prose or code fences
    Json,
}

/// Per-call generation settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub response_format: ResponseFormat,
}

impl GenerationOptions {
    pub const fn text(temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            max_output_tokens,
            response_format: ResponseFormat::Text,
        }
    }

    pub const fn json(temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            max_output_tokens,
            response_format: ResponseFormat::Json,
        }
    }
}

/// LLM error types
#[derive(Debug, Error)]
pub enum AiError {
    #[error("ANTHROPIC_API_KEY not configured")]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Claude API error ({status}): {message}")]
    Api {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("No text content in response")]
    EmptyResponse,

    #[error("Invalid JSON in model output: {0}")]
    InvalidJson(String),
}

/// Single-turn prompt-in, text-out completion
pub trait CompletionService
where
    Self: Send + Sync,
{
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> BoxFuture<'a, Result<String, AiError>>;
}

/// Stand-in used when no API key is configured. Every call fails, so
/// callers take their documented fallbacks.
pub struct Unconfigured;

impl CompletionService for Unconfigured {
    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
        _options: &'a GenerationOptions,
    ) -> BoxFuture<'a, Result<String, AiError>> {
        Box::pin(async { Err(AiError::NotConfigured) })
    }
}
