use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;

/// Outcome of executing one action against the page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Result of an `extract` action. A missing value means the element had no
    /// such attribute.
    pub fn extracted(selector: &str, attribute: Option<&str>, value: Option<String>) -> Self {
        let what = attribute.unwrap_or("text");
        let base = match &value {
            Some(v) => Self::ok(format!(
                "Extracted {what} from '{selector}' ({} chars)",
                v.chars().count()
            )),
            None => Self::failure(format!(
                "Element '{selector}' has no attribute '{what}'"
            )),
        };
        base.with_data(serde_json::json!({
            "selector": selector,
            "attribute": attribute,
            "value": value,
        }))
    }
}

/// Point-in-time capture of the page the agent is looking at.
#[derive(Debug, Clone, Serialize)]
pub struct PerceptionSnapshot {
    pub url: String,
    pub title: String,
    pub html: String,
    /// Raw PNG bytes; serialized as base64.
    #[serde(serialize_with = "png_as_base64")]
    pub screenshot: Option<Vec<u8>>,
    pub timestamp: DateTime<Local>,
}

impl PerceptionSnapshot {
    pub fn new(url: impl Into<String>, title: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            html: html.into(),
            screenshot: None,
            timestamp: Local::now(),
        }
    }

    /// Placeholder used when the page could not be read at all.
    pub fn unavailable() -> Self {
        Self::new("unknown", "Unknown", "")
    }

    pub fn with_screenshot(mut self, png: Vec<u8>) -> Self {
        self.screenshot = Some(png);
        self
    }

    pub fn screenshot_base64(&self) -> Option<String> {
        self.screenshot.as_ref().map(|png| STANDARD.encode(png))
    }
}

fn png_as_base64<S: serde::Serializer>(png: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match png {
        Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
        None => s.serialize_none(),
    }
}

/// Everything the Decision Client gets to see for one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionRequest {
    pub prompt: String,
    pub html: Option<String>,
    /// Base64-encoded PNG.
    pub screenshot: Option<String>,
}
