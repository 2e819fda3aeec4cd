//! Generation service boundary.
//!
//! A generation backend maps (query text, retrieved passages) to a
//! free-text answer plus the passages it actually drew on. The engine
//! treats the backend as opaque and only relies on this contract.
//!
//! Concrete backends (Ollama) live in the `medinteract` app crate.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Passage;
use crate::prompt::render_qa_prompt;

/// Input to a generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// The formatted patient query.
    pub question: String,
    /// Retrieved context, in retrieval order. May be empty.
    pub passages: Vec<Passage>,
}

impl GenerationRequest {
    pub fn new(question: impl Into<String>, passages: Vec<Passage>) -> Self {
        Self {
            question: question.into(),
            passages,
        }
    }

    /// Render the single "stuffed" prompt holding every passage.
    pub fn stuffed_prompt(&self) -> String {
        render_qa_prompt(&self.question, &self.passages)
    }
}

/// Output of a generation call.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    /// Passages the answer is attributed to, in the backend's order.
    pub cited: Vec<Passage>,
}

/// Trait for text generation backends.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Model identifier, e.g. `"llama3.1"`.
    fn model_name(&self) -> &str;

    /// Produce an answer for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation>;
}
