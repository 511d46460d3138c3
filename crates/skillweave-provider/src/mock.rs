//! Deterministic completion client

use crate::error::Result;
use crate::llm::LlmClient;
use async_trait::async_trait;
use skillweave_types::ChatMessage;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Replays queued responses in order and records every prompt it receives.
///
/// Once the queue is drained it keeps answering with the fallback text.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    fallback: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl ScriptedLlm {
    /// Client answering with `responses`, one per call
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            fallback: String::new(),
        }
    }

    /// Text returned after the queue is exhausted
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Last user prompt of every call so far
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    /// Number of `generate` calls so far
    pub fn calls(&self) -> usize {
        lock(&self.prompts).len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let prompt = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        lock(&self.prompts).push(prompt);

        Ok(lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
