//! Uniform LLM call layer (C4, §4.4): three logical clients (querygen,
//! evaluator, judge) over a primary OpenAI-compatible chat endpoint
//! with a completion-style fallback, plus lenient JSON-mode parsing
//! with one repair retry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("both primary and fallback endpoints failed: primary={primary}, fallback={fallback}")]
    BothEndpointsFailed { primary: String, fallback: String },
    #[error("response was not valid JSON after a repair attempt: {0}")]
    JsonParse(String),
}

#[derive(Debug, Clone)]
pub struct LlmEndpointConfig {
    pub primary_base_url: String,
    pub primary_model: String,
    pub primary_api_key: Option<String>,
    pub fallback_base_url: Option<String>,
    pub fallback_model: Option<String>,
    pub fallback_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallResult {
    pub raw_text: String,
    pub provider: String,
    pub model: String,
    pub used_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<ChatCompletionUsage>,
}

#[derive(Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Deserialize)]
struct ChatCompletionMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionUsage {
    #[serde(default)]
    total_cost_usd: Option<f64>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

/// One logical LLM client (querygen, evaluator, or judge). Each holds
/// its own endpoint config since in principle querygen/evaluator/judge
/// can point at different deployed models.
pub struct LlmClient {
    http_client: reqwest::Client,
    config: LlmEndpointConfig,
}

impl LlmClient {
    pub fn new(http_client: reqwest::Client, config: LlmEndpointConfig) -> Self {
        Self { http_client, config }
    }

    /// Calls the primary OpenAI-compatible chat endpoint, falling back
    /// to a completion-style endpoint on connection failure. The
    /// fallback preserves the same `{system, user}` → raw text
    /// contract even though its wire schema differs.
    pub async fn call(&self, system: &str, user: &str, max_tokens: u32, temperature: f32) -> Result<LlmCallResult, LlmError> {
        match self.call_primary(system, user, max_tokens, temperature).await {
            Ok(result) => Ok(result),
            Err(primary_err) => match self.call_fallback(system, user, max_tokens, temperature).await {
                Ok(result) => Ok(result),
                Err(fallback_err) => Err(LlmError::BothEndpointsFailed {
                    primary: primary_err,
                    fallback: fallback_err,
                }),
            },
        }
    }

    async fn call_primary(&self, system: &str, user: &str, max_tokens: u32, temperature: f32) -> Result<LlmCallResult, String> {
        let request = ChatCompletionRequest {
            model: &self.config.primary_model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            max_tokens,
            temperature,
        };

        let mut builder = self
            .http_client
            .post(format!("{}/chat/completions", self.config.primary_base_url))
            .json(&request);
        if let Some(key) = &self.config.primary_api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("primary endpoint returned {}", response.status()));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| e.to_string())?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| "primary endpoint returned no choices".to_string())?;

        Ok(LlmCallResult {
            raw_text: content,
            provider: "openai-compatible".to_string(),
            model: self.config.primary_model.clone(),
            used_fallback: false,
            cost_usd: parsed.usage.and_then(|usage| usage.total_cost_usd),
        })
    }

    async fn call_fallback(&self, system: &str, user: &str, max_tokens: u32, temperature: f32) -> Result<LlmCallResult, String> {
        let base_url = self.config.fallback_base_url.as_ref().ok_or("no fallback endpoint configured")?;
        let model = self.config.fallback_model.as_deref().unwrap_or(&self.config.primary_model);

        let request = CompletionRequest {
            model,
            prompt: format!("{system}\n\n{user}"),
            max_tokens,
            temperature,
        };

        let mut builder = self.http_client.post(format!("{base_url}/completions")).json(&request);
        if let Some(key) = &self.config.fallback_api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("fallback endpoint returned {}", response.status()));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| e.to_string())?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| "fallback endpoint returned no choices".to_string())?;

        Ok(LlmCallResult {
            raw_text: content,
            provider: "completion-fallback".to_string(),
            model: model.to_string(),
            used_fallback: true,
            cost_usd: None,
        })
    }
}

/// Strips Markdown code fences and surrounding whitespace before a
/// JSON parse attempt.
fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_fence = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_fence.strip_suffix("```").unwrap_or(without_fence).trim().to_string()
}

fn lenient_parse(raw: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(&strip_code_fences(raw))
}

/// Parses `raw` as JSON. On failure, issues one repair call via
/// `repair` (given the raw output and the parse error as a hint) and
/// retries; a second failure surfaces a structured error per §4.4.
pub async fn parse_json_with_repair<F, Fut>(raw: &str, repair: F) -> Result<Value, LlmError>
where
    F: FnOnce(String, String) -> Fut,
    Fut: std::future::Future<Output = Result<String, LlmError>>,
{
    match lenient_parse(raw) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            let repaired = repair(raw.to_string(), first_error.to_string()).await?;
            lenient_parse(&repaired).map_err(|e| LlmError::JsonParse(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_code_fences_removes_json_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(raw), "{\"a\": 1}");
    }

    #[test]
    fn strip_code_fences_is_noop_on_plain_json() {
        let raw = "{\"a\": 1}";
        assert_eq!(strip_code_fences(raw), raw);
    }

    #[tokio::test]
    async fn parse_json_with_repair_succeeds_on_first_attempt() {
        let result = parse_json_with_repair("{\"ok\": true}", |_raw, _err| async { Ok(String::new()) }).await;
        assert!(result.unwrap().get("ok").is_some());
    }

    #[tokio::test]
    async fn parse_json_with_repair_uses_repair_call_once() {
        let result = parse_json_with_repair("not json", |_raw, _err| async { Ok("{\"fixed\": true}".to_string()) }).await;
        assert!(result.unwrap().get("fixed").is_some());
    }

    #[tokio::test]
    async fn parse_json_with_repair_surfaces_structured_error_if_still_invalid() {
        let result = parse_json_with_repair("not json", |_raw, _err| async { Ok("still not json".to_string()) }).await;
        assert!(matches!(result, Err(LlmError::JsonParse(_))));
    }
}
