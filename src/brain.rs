use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::types::DecisionRequest;

/// `action_type` of the synthetic decision returned when the model could not
/// be reached or its reply could not be read.
pub const ERROR_ACTION: &str = "error";

pub const SYSTEM_PROMPT: &str = r#"You are a web automation agent that controls a real Chrome browser. Help the user complete a web-based task by choosing ONE action at a time.

## Available Actions
1. navigate - Navigate to a URL
   - Parameters: url (string)
2. click - Click on an element
   - Parameters: selector (string) - CSS selector of the element
3. type - Type text into an input field
   - Parameters: selector (string), text (string)
4. scroll - Scroll the page
   - Parameters: direction (string: up, down, left, right), amount (integer pixels, optional, default 300)
5. wait - Wait for a while
   - Parameters: seconds (number, at most 300)
6. extract - Extract information from an element
   - Parameters: selector (string), attribute (string, optional; omit or use "text" for the visible text, or e.g. "href")
7. done - The task is complete
   - Parameters: result (string) - Summary of the result
8. impossible - The task cannot be completed
   - Parameters: result (string) - Why it cannot be completed

## Page HTML
Interactive elements in the page HTML are listed with a selector like [data-pilot-id="e3"]. Prefer those selectors.

## Response Format
Respond with ONLY a JSON object of this shape:
{
  "action": {
    "action_type": "action_name",
    "parameters": { "param1": "value1" }
  },
  "reasoning": "Why this action moves the task forward"
}

## Rules
- Always give clear reasoning.
- Keep the number of actions small.
- If unsure what to do next, use extract to gather information.
- When the task is complete, use done with a summary of the result.
- If the task cannot be completed, or you keep hitting errors, use impossible with an explanation."#;

/// The model's proposal for the next step.
///
/// `action_type` is whatever the model said; checking it against the
/// vocabulary is the caller's job. A model that literally answers `"error"`
/// is just another unsupported suggestion: only [`Decision::error`] marks a
/// client fault.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub action_type: String,
    pub parameters: Map<String, Value>,
    pub reasoning: String,
    #[serde(skip)]
    fault: Option<String>,
}

impl Decision {
    pub fn new(action_type: impl Into<String>, parameters: Map<String, Value>, reasoning: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            parameters,
            reasoning: reasoning.into(),
            fault: None,
        }
    }

    /// Synthetic decision standing in for a transport or parse failure.
    pub fn error(cause: impl Into<String>) -> Self {
        let cause = cause.into();
        let mut parameters = Map::new();
        parameters.insert("message".into(), Value::String(cause.clone()));
        Self {
            action_type: ERROR_ACTION.to_string(),
            parameters,
            reasoning: format!("Decision client failed: {cause}"),
            fault: Some(cause),
        }
    }

    /// The failure cause if this is a synthetic error decision.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// Wire form: `{"action": {...}, "reasoning": ...}`.
    pub fn to_value(&self) -> Value {
        json!({
            "action": {
                "action_type": self.action_type,
                "parameters": self.parameters,
            },
            "reasoning": self.reasoning,
        })
    }
}

/// Proposes the next action for a task.
///
/// Implementations never fail: any problem reaching or understanding the
/// model is reported as [`Decision::error`].
#[async_trait]
pub trait DecisionClient: Send {
    async fn decide(&mut self, request: &DecisionRequest) -> Decision;
}

#[derive(Deserialize)]
struct Reply {
    action: ReplyAction,
    #[serde(default)]
    reasoning: String,
}

#[derive(Deserialize)]
struct ReplyAction {
    action_type: String,
    #[serde(default)]
    parameters: Option<Map<String, Value>>,
}

/// Parse the model's text reply into a decision.
pub fn parse_reply(content: &str) -> Result<Decision> {
    // Strip possible markdown fences the model might add
    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let reply: Reply = serde_json::from_str(cleaned)
        .with_context(|| format!("Invalid JSON response from model: {cleaned}"))?;

    Ok(Decision::new(
        reply.action.action_type,
        reply.action.parameters.unwrap_or_default(),
        reply.reasoning,
    ))
}

/// Decision client for any OpenAI-compatible chat completions endpoint
/// (OpenRouter by default).
pub struct ChatCompletionsClient {
    client: Client,
    config: ModelConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("could not build HTTP client")?;
        Ok(Self { client, config })
    }

    /// Request body for one decision.
    pub fn request_body(&self, request: &DecisionRequest) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_content(request) },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": { "type": "json_object" },
        })
    }

    async fn complete(&self, request: &DecisionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .with_context(|| format!("Error calling {url}"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("could not read model response ({status})"))?;

        if !status.is_success() {
            let err_msg = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|body| body["error"]["message"].as_str().map(String::from))
                .unwrap_or_else(|| text.trim().to_string());
            return Err(anyhow!("model API error ({status}): {err_msg}"));
        }

        let body: Value = serde_json::from_str(&text)
            .with_context(|| format!("model endpoint returned a non-JSON body ({status})"))?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| anyhow!("No content in model response: {body}"))
    }
}

#[async_trait]
impl DecisionClient for ChatCompletionsClient {
    async fn decide(&mut self, request: &DecisionRequest) -> Decision {
        let outcome = match self.complete(request).await {
            Ok(content) => {
                debug!(%content, "Model replied");
                parse_reply(&content)
            }
            Err(e) => Err(e),
        };

        outcome.unwrap_or_else(|e| {
            let cause = format!("{e:#}");
            warn!(%cause, "Decision request failed");
            Decision::error(cause)
        })
    }
}

/// User message content: the prompt, then the page HTML, then the screenshot.
/// A lone text part is sent as a plain string.
fn user_content(request: &DecisionRequest) -> Value {
    let mut parts = vec![json!({ "type": "text", "text": request.prompt })];

    if let Some(html) = request.html.as_deref().filter(|h| !h.is_empty()) {
        parts.push(json!({
            "type": "text",
            "text": format!("Current page HTML (simplified):\n{html}"),
        }));
    }

    if let Some(image) = request.screenshot.as_deref().filter(|i| !i.is_empty()) {
        parts.push(json!({
            "type": "image_url",
            "image_url": { "url": format!("data:image/png;base64,{image}") },
        }));
    }

    if parts.len() == 1 {
        Value::String(request.prompt.clone())
    } else {
        Value::Array(parts)
    }
}
