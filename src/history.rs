use chrono::{DateTime, Local};
use serde::Serialize;

use crate::actions::Action;
use crate::types::{ActionResult, PerceptionSnapshot};

/// One executed step. Entries are never changed once recorded.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    /// 0 for the initial navigation, then 1, 2, ... for loop actions.
    pub step: usize,
    pub action: Action,
    pub result: ActionResult,
    pub snapshot: PerceptionSnapshot,
    pub timestamp: DateTime<Local>,
}

/// Append-only audit trail of a run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the navigation performed before the first decision as step 0.
    pub fn record_initial(
        &mut self,
        action: Action,
        result: ActionResult,
        snapshot: PerceptionSnapshot,
    ) -> &HistoryEntry {
        debug_assert!(self.entries.is_empty(), "initial step must come first");
        self.push(0, action, result, snapshot)
    }

    /// Record a loop action under the next step number.
    pub fn record(
        &mut self,
        action: Action,
        result: ActionResult,
        snapshot: PerceptionSnapshot,
    ) -> &HistoryEntry {
        let step = self.entries.last().map_or(1, |last| last.step + 1);
        self.push(step, action, result, snapshot)
    }

    fn push(
        &mut self,
        step: usize,
        action: Action,
        result: ActionResult,
        snapshot: PerceptionSnapshot,
    ) -> &HistoryEntry {
        self.entries.push(HistoryEntry {
            step,
            action,
            result,
            snapshot,
            timestamp: Local::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Succeeded,
    Failed,
    Exhausted,
}

/// What a run produced, handed back to the caller exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    pub status: RunStatus,
    pub message: String,
    pub steps: usize,
    pub history: History,
}
