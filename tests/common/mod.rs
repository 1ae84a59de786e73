#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use browser_pilot::{
    Action, ActionExecutor, ActionResult, AgentConfig, Decision, DecisionClient, DecisionRequest,
    PerceptionSnapshot, Perceiver,
};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub fn quiet_config(max_steps: usize) -> AgentConfig {
    AgentConfig {
        max_steps,
        verbose: false,
        screenshot_dir: None,
        html_max_chars: 4000,
    }
}

pub fn decision(action_type: &str, params: Value) -> Decision {
    let parameters = match params {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Decision::new(action_type, parameters, format!("chose {action_type}"))
}

/// Replays a fixed list of decisions, then repeats `fallback` forever.
pub struct ScriptedBrain {
    script: VecDeque<Decision>,
    fallback: Decision,
    pub requests: Arc<Mutex<Vec<DecisionRequest>>>,
}

impl ScriptedBrain {
    pub fn new(script: Vec<Decision>) -> Self {
        Self {
            script: script.into(),
            fallback: decision("scroll", serde_json::json!({"direction": "down"})),
            requests: Arc::default(),
        }
    }

    pub fn repeating(fallback: Decision) -> Self {
        Self {
            script: VecDeque::new(),
            fallback,
            requests: Arc::default(),
        }
    }
}

#[async_trait]
impl DecisionClient for ScriptedBrain {
    async fn decide(&mut self, request: &DecisionRequest) -> Decision {
        self.requests.lock().unwrap().push(request.clone());
        self.script.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[derive(Clone, Default)]
pub struct FakeElement {
    pub text: String,
    pub attributes: HashMap<String, String>,
}

impl FakeElement {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            attributes: HashMap::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }
}

/// An in-memory page: a URL, some HTML and a set of selectable elements.
pub struct FakeBrowser {
    pub url: String,
    pub title: String,
    pub html: String,
    pub elements: HashMap<String, FakeElement>,
    pub screenshot: Option<Vec<u8>>,
    pub unreachable_urls: Vec<String>,
    pub perceive_fails: bool,
    pub executed: Arc<Mutex<Vec<Action>>>,
    pub released: Arc<AtomicBool>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            url: "about:blank".to_string(),
            title: String::new(),
            html: String::new(),
            elements: HashMap::new(),
            screenshot: None,
            unreachable_urls: Vec::new(),
            perceive_fails: false,
            executed: Arc::default(),
            released: Arc::default(),
        }
    }

    pub fn with_element(mut self, selector: &str, element: FakeElement) -> Self {
        self.elements.insert(selector.to_string(), element);
        self
    }

    fn find(&self, selector: &str) -> Result<&FakeElement> {
        self.elements
            .get(selector)
            .ok_or_else(|| anyhow!("element '{selector}' not found"))
    }

    fn apply(&mut self, action: &Action) -> Result<ActionResult> {
        match action {
            Action::Navigate { url } => {
                if self.unreachable_urls.contains(url) {
                    return Err(anyhow!("navigation to {url} timed out"));
                }
                self.url = url.clone();
                Ok(ActionResult::ok(format!("Navigated to {url}")))
            }
            Action::Click { selector } => {
                self.find(selector)?;
                Ok(ActionResult::ok(format!("Clicked '{selector}'")))
            }
            Action::Type { selector, text } => {
                self.find(selector)?;
                Ok(ActionResult::ok(format!("Typed '{text}'")))
            }
            Action::Extract {
                selector,
                attribute,
            } => {
                let element = self.find(selector)?;
                let value = match attribute.as_deref() {
                    None | Some("text") => Some(element.text.clone()),
                    Some(name) => element.attributes.get(name).cloned(),
                };
                Ok(ActionResult::extracted(selector, attribute.as_deref(), value))
            }
            Action::Scroll { .. } | Action::Wait { .. } => Ok(ActionResult::ok(action.to_string())),
            Action::Done { result } | Action::Impossible { result } => {
                Ok(ActionResult::ok(result.clone()))
            }
        }
    }
}

#[async_trait]
impl ActionExecutor for FakeBrowser {
    async fn execute(&mut self, action: &Action) -> ActionResult {
        self.executed.lock().unwrap().push(action.clone());
        self.apply(action)
            .unwrap_or_else(|e| ActionResult::failure(format!("{e:#}")))
    }
}

#[async_trait]
impl Perceiver for FakeBrowser {
    async fn perceive(&mut self) -> Result<PerceptionSnapshot> {
        if self.perceive_fails {
            return Err(anyhow!("target closed"));
        }
        let snapshot = PerceptionSnapshot::new(&self.url, &self.title, &self.html);
        Ok(match &self.screenshot {
            Some(png) => snapshot.with_screenshot(png.clone()),
            None => snapshot,
        })
    }
}

impl Drop for FakeBrowser {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
