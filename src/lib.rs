//! A language model picks browser actions one step at a time; this crate
//! runs the loop that perceives the page, asks for a decision, executes it
//! and keeps the audit trail.

pub mod actions;
pub mod agent;
pub mod brain;
pub mod config;
pub mod dom;
pub mod hands;
pub mod history;
pub mod types;

pub use actions::{Action, ActionError, ActionKind, ScrollDirection};
pub use agent::Agent;
pub use brain::{ChatCompletionsClient, Decision, DecisionClient};
pub use config::{AgentConfig, BrowserConfig, Config, ConfigError, ModelConfig};
pub use hands::{ActionExecutor, ChromeBrowser, Perceiver};
pub use history::{History, HistoryEntry, RunOutcome, RunStatus};
pub use types::{ActionResult, DecisionRequest, PerceptionSnapshot};
