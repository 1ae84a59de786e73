//! The perceive, decide, execute, record loop.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::actions::{Action, ActionKind};
use crate::brain::{ChatCompletionsClient, DecisionClient};
use crate::config::{AgentConfig, Config, ConfigError};
use crate::dom::truncate_with_marker;
use crate::hands::{ActionExecutor, ChromeBrowser, Perceiver};
use crate::history::{History, HistoryEntry, RunOutcome, RunStatus};
use crate::types::{DecisionRequest, PerceptionSnapshot};

/// Step diagnostics: `info` when the agent is verbose, `debug` otherwise.
macro_rules! diag {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Drives a browser towards a natural-language goal, one model decision at a
/// time.
///
/// The agent owns its browser and decision client; both are released when the
/// agent is dropped, however the run ended.
pub struct Agent<B, D> {
    browser: B,
    brain: D,
    config: AgentConfig,
}

impl Agent<ChromeBrowser, ChatCompletionsClient> {
    /// Launch Chrome and connect the model client described by `config`.
    pub async fn launch(config: &Config) -> Result<Self> {
        config.validate()?;
        let brain = ChatCompletionsClient::new(config.model.clone())?;

        let browser_config = config.browser.clone();
        let browser = tokio::task::spawn_blocking(move || ChromeBrowser::launch(&browser_config))
            .await
            .map_err(|e| anyhow!("Browser launch panicked: {e}"))??;

        Ok(Self::new(browser, brain, config.agent.clone())?)
    }
}

impl<B, D> Agent<B, D>
where
    B: ActionExecutor + Perceiver,
    D: DecisionClient,
{
    pub fn new(browser: B, brain: D, config: AgentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            browser,
            brain,
            config,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Work on `task` until the model declares it done or impossible, two
    /// steps in a row fail, or the step budget runs out.
    pub async fn run(&mut self, task: &str, initial_url: Option<&str>) -> RunOutcome {
        let verbose = self.config.verbose;
        let max_steps = self.config.max_steps;
        let mut history = History::new();
        let mut previous_failed = false;

        diag!(verbose, %task, "Starting task");

        if let Some(url) = initial_url {
            let action = Action::Navigate {
                url: url.to_string(),
            };
            let result = self.browser.execute(&action).await;
            diag!(verbose, success = result.success, message = %result.message, "Initial navigation");
            previous_failed = !result.success;
            let snapshot = self.perceive().await;
            history.record_initial(action, result, snapshot);
        }

        for step in 1..=max_steps {
            diag!(verbose, "--- Step {step}/{max_steps} ---");

            let snapshot = self.perceive().await;
            let request = compose_request(task, &snapshot, history.last(), self.config.html_max_chars);
            drop(snapshot);

            let decision = self.brain.decide(&request).await;

            let failure = if let Some(cause) = decision.fault() {
                warn!(step, %cause, "Decision failed");
                Some(cause.to_string())
            } else {
                diag!(
                    verbose,
                    step,
                    action_type = %decision.action_type,
                    reasoning = %decision.reasoning,
                    "Model chose action"
                );

                let action = match Action::from_parts(&decision.action_type, &decision.parameters) {
                    Ok(action) => action,
                    Err(e) if e.is_unknown_type() => {
                        error!(step, "Unknown action type: {}", decision.action_type);
                        continue;
                    }
                    Err(e) => {
                        warn!(step, "Malformed action from model: {e}");
                        continue;
                    }
                };

                diag!(verbose, step, "Executing {action}");
                let result = self.browser.execute(&action).await;
                diag!(verbose, step, success = result.success, message = %result.message, "Action result");

                let snapshot = self.perceive().await;
                let entry = history.record(action, result, snapshot);

                if let Some(message) = entry.action.terminal_result() {
                    let status = if entry.action.kind() == ActionKind::Done {
                        RunStatus::Succeeded
                    } else {
                        RunStatus::Failed
                    };
                    let message = message.to_string();
                    diag!(verbose, ?status, %message, "Task finished");
                    return outcome(status, message, step, history);
                }

                (!entry.result.success).then(|| entry.result.message.clone())
            };

            match failure {
                Some(cause) if previous_failed => {
                    error!(step, "Multiple errors in a row, giving up");
                    return outcome(
                        RunStatus::Failed,
                        format!("Multiple errors in a row, agent failed after {step} steps: {cause}"),
                        step,
                        history,
                    );
                }
                Some(_) => previous_failed = true,
                None => previous_failed = false,
            }
        }

        warn!(max_steps, "Step budget exhausted");
        outcome(
            RunStatus::Exhausted,
            format!("Reached maximum number of steps ({max_steps}) without completing the task"),
            max_steps,
            history,
        )
    }

    /// Release the browser and model client.
    pub fn close(self) {
        drop(self);
        info!("Browser closed");
    }

    async fn perceive(&mut self) -> PerceptionSnapshot {
        let snapshot = match self.browser.perceive().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Error getting page context: {e:#}");
                PerceptionSnapshot::unavailable()
            }
        };

        if let (Some(dir), Some(png)) = (&self.config.screenshot_dir, &snapshot.screenshot) {
            if let Err(e) = save_screenshot(dir, &snapshot.timestamp, png).await {
                warn!("Could not save screenshot: {e:#}");
            }
        }

        snapshot
    }
}

fn outcome(status: RunStatus, message: String, steps: usize, history: History) -> RunOutcome {
    RunOutcome {
        success: status == RunStatus::Succeeded,
        status,
        message,
        steps,
        history,
    }
}

/// Build the decision request for the next step.
pub fn compose_request(
    task: &str,
    snapshot: &PerceptionSnapshot,
    previous: Option<&HistoryEntry>,
    html_max_chars: usize,
) -> DecisionRequest {
    let (previous_action, previous_result) = match previous {
        Some(entry) => (
            entry.action.to_value().to_string(),
            serde_json::to_string(&entry.result).unwrap_or_default(),
        ),
        None => ("none".to_string(), "none".to_string()),
    };

    let prompt = format!(
        "Task: {task}\n\n\
         Current page: {title}\n\
         URL: {url}\n\n\
         Previous action: {previous_action}\n\
         Previous result: {previous_result}\n\n\
         What should I do next to complete the task?",
        title = snapshot.title,
        url = snapshot.url,
    );

    DecisionRequest {
        prompt,
        html: (!snapshot.html.is_empty()).then(|| truncate_with_marker(&snapshot.html, html_max_chars)),
        screenshot: snapshot.screenshot_base64(),
    }
}

/// Write a screenshot into `dir` under a name derived from its capture time.
pub async fn save_screenshot(dir: &Path, taken_at: &DateTime<Local>, png: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("could not create {}", dir.display()))?;
    let path = dir.join(format!("screenshot_{}.png", taken_at.format("%Y%m%d_%H%M%S_%3f")));
    tokio::fs::write(&path, png)
        .await
        .with_context(|| format!("could not write {}", path.display()))?;
    Ok(path)
}
