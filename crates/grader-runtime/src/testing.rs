//! Scripted provider for tests.

use async_trait::async_trait;
use grader_core::SchemaKind;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::providers::{
    LlmProvider, ModelConfig, ProviderError, StructuredRequest, StructuredResponse, TokenUsage,
};

/// One scripted outcome of a provider call.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(JsonValue),
    Text(String),
    Refusal(String),
    Http,
    Status(u16, String),
    /// Never answers within any sane timeout
    Hang,
}

struct Rule {
    schema: SchemaKind,
    needle: Option<String>,
    replies: VecDeque<Reply>,
}

/// Replays queued replies per schema (optionally per prompt substring).
///
/// The last reply of a queue repeats forever.
pub struct ScriptedProvider {
    name: String,
    rules: Mutex<Vec<Rule>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    healthy: bool,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            healthy: true,
        }
    }

    /// Report failure from `health_check`.
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn with_reply(self, schema: SchemaKind, reply: Reply) -> Self {
        self.push(schema, None, reply);
        self
    }

    /// Reply only to prompts containing `needle`.
    pub fn with_prompt_reply(self, schema: SchemaKind, needle: &str, reply: Reply) -> Self {
        self.push(schema, Some(needle.to_string()), reply);
        self
    }

    fn push(&self, schema: SchemaKind, needle: Option<String>, reply: Reply) {
        let mut rules = self.rules.lock();
        match rules
            .iter_mut()
            .find(|r| r.schema == schema && r.needle == needle)
        {
            Some(rule) => rule.replies.push_back(reply),
            None => rules.push(Rule {
                schema,
                needle,
                replies: VecDeque::from([reply]),
            }),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn next_reply(&self, schema: SchemaKind, prompt: &str) -> Option<Reply> {
        let mut rules = self.rules.lock();
        let matches = |rule: &Rule| match &rule.needle {
            Some(needle) => rule.schema == schema && prompt.contains(needle.as_str()),
            None => false,
        };
        let idx = rules
            .iter()
            .position(matches)
            .or_else(|| {
                rules
                    .iter()
                    .position(|r| r.schema == schema && r.needle.is_none())
            })?;
        let replies = &mut rules[idx].replies;
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn extract_structured(
        &self,
        request: &StructuredRequest,
        _config: &ModelConfig,
    ) -> Result<StructuredResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(request.prompt.clone());

        let reply = self
            .next_reply(request.schema.kind, &request.prompt)
            .unwrap_or_else(|| Reply::Status(500, "no scripted reply".to_string()));

        let respond = |content: String, refusal: Option<String>| StructuredResponse {
            content,
            refusal,
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 20,
                cache_read_tokens: 0,
                cache_creation_tokens: 0,
            },
            model: "scripted-model".to_string(),
            stop_reason: Some("end_turn".to_string()),
        };

        match reply {
            Reply::Json(value) => Ok(respond(value.to_string(), None)),
            Reply::Text(text) => Ok(respond(text, None)),
            Reply::Refusal(text) => Ok(respond(String::new(), Some(text))),
            Reply::Http => Err(ProviderError::HttpError("connection reset".to_string())),
            Reply::Status(status, message) => Err(ProviderError::ApiError { status, message }),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(ProviderError::Timeout(Duration::from_secs(24 * 3600)))
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn name(&self) -> &str {
        &self.name
    }
}
