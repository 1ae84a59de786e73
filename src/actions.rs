use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_SCROLL_AMOUNT: i64 = 300;
pub const DEFAULT_DONE_RESULT: &str = "Task completed successfully";
pub const DEFAULT_IMPOSSIBLE_RESULT: &str = "Task could not be completed";
/// Longest pause a single `wait` may ask for.
pub const MAX_WAIT_SECONDS: f64 = 300.0;

/// The closed set of action kinds the agent understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Scroll,
    Wait,
    Extract,
    Done,
    Impossible,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        ActionKind::Navigate,
        ActionKind::Click,
        ActionKind::Type,
        ActionKind::Scroll,
        ActionKind::Wait,
        ActionKind::Extract,
        ActionKind::Done,
        ActionKind::Impossible,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Scroll => "scroll",
            ActionKind::Wait => "wait",
            ActionKind::Extract => "extract",
            ActionKind::Done => "done",
            ActionKind::Impossible => "impossible",
        }
    }

    /// `done` and `impossible` end a run; everything else continues it.
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionKind::Done | ActionKind::Impossible)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ActionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .ok_or_else(|| ActionError::UnknownType(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    /// Pixel offsets for `window.scrollBy`.
    pub fn offsets(self, amount: i64) -> (i64, i64) {
        match self {
            ScrollDirection::Up => (0, amount.saturating_neg()),
            ScrollDirection::Down => (0, amount),
            ScrollDirection::Left => (amount.saturating_neg(), 0),
            ScrollDirection::Right => (amount, 0),
        }
    }
}

impl FromStr for ScrollDirection {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            "left" => Ok(ScrollDirection::Left),
            "right" => Ok(ScrollDirection::Right),
            other => Err(format!(
                "expected one of up, down, left, right but got '{other}'"
            )),
        }
    }
}

/// Why a proposed action could not be constructed.
///
/// `UnknownType` means the model asked for something outside the vocabulary;
/// the other two mean it asked for a known action with a broken parameter set.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("unknown action type '{0}'")]
    UnknownType(String),
    #[error("{action}: missing required parameter '{name}'")]
    MissingParameter {
        action: ActionKind,
        name: &'static str,
    },
    #[error("{action}: invalid parameter '{name}': {reason}")]
    InvalidParameter {
        action: ActionKind,
        name: &'static str,
        reason: String,
    },
}

impl ActionError {
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, ActionError::UnknownType(_))
    }
}

/// A single browser instruction, carrying exactly the fields its kind needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action_type", content = "parameters", rename_all = "lowercase")]
pub enum Action {
    Navigate {
        url: String,
    },
    Click {
        selector: String,
    },
    Type {
        selector: String,
        text: String,
    },
    Scroll {
        direction: ScrollDirection,
        amount: i64,
    },
    Wait {
        seconds: f64,
    },
    Extract {
        selector: String,
        attribute: Option<String>,
    },
    Done {
        result: String,
    },
    Impossible {
        result: String,
    },
}

impl Action {
    /// Build an action from the raw `action_type` and parameter object a model
    /// returned. Unrecognized parameters are ignored.
    pub fn from_parts(action_type: &str, params: &Map<String, Value>) -> Result<Self, ActionError> {
        let kind: ActionKind = action_type.parse()?;
        let fields = Fields { kind, params };

        let action = match kind {
            ActionKind::Navigate => Action::Navigate {
                url: fields.required_str("url")?,
            },
            ActionKind::Click => Action::Click {
                selector: fields.required_str("selector")?,
            },
            ActionKind::Type => Action::Type {
                selector: fields.required_str("selector")?,
                text: fields.required_str("text")?,
            },
            ActionKind::Scroll => {
                let raw = fields.required_str("direction")?;
                let direction = raw
                    .parse()
                    .map_err(|reason| fields.invalid("direction", reason))?;
                let amount = fields
                    .optional_int("amount")?
                    .unwrap_or(DEFAULT_SCROLL_AMOUNT);
                if amount < 0 {
                    return Err(fields.invalid(
                        "amount",
                        format!("must be non-negative, got {amount}"),
                    ));
                }
                Action::Scroll { direction, amount }
            }
            ActionKind::Wait => Action::Wait {
                seconds: fields.seconds("seconds")?,
            },
            ActionKind::Extract => Action::Extract {
                selector: fields.required_str("selector")?,
                attribute: fields.optional_str("attribute")?,
            },
            ActionKind::Done => Action::Done {
                result: fields
                    .optional_str("result")?
                    .unwrap_or_else(|| DEFAULT_DONE_RESULT.to_string()),
            },
            ActionKind::Impossible => Action::Impossible {
                result: fields
                    .optional_str("result")?
                    .unwrap_or_else(|| DEFAULT_IMPOSSIBLE_RESULT.to_string()),
            },
        };

        Ok(action)
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Navigate { .. } => ActionKind::Navigate,
            Action::Click { .. } => ActionKind::Click,
            Action::Type { .. } => ActionKind::Type,
            Action::Scroll { .. } => ActionKind::Scroll,
            Action::Wait { .. } => ActionKind::Wait,
            Action::Extract { .. } => ActionKind::Extract,
            Action::Done { .. } => ActionKind::Done,
            Action::Impossible { .. } => ActionKind::Impossible,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    /// The summary carried by a terminal action.
    pub fn terminal_result(&self) -> Option<&str> {
        match self {
            Action::Done { result } | Action::Impossible { result } => Some(result),
            _ => None,
        }
    }

    /// Wire form: `{"action_type": ..., "parameters": {...}}`.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Navigate { url } => write!(f, "navigate {url}"),
            Action::Click { selector } => write!(f, "click {selector}"),
            Action::Type { selector, text } => write!(f, "type {text:?} into {selector}"),
            Action::Scroll { direction, amount } => {
                write!(f, "scroll {direction:?} by {amount}px")
            }
            Action::Wait { seconds } => write!(f, "wait {seconds}s"),
            Action::Extract {
                selector,
                attribute: Some(attr),
            } => write!(f, "extract {attr} from {selector}"),
            Action::Extract { selector, .. } => write!(f, "extract text from {selector}"),
            Action::Done { result } => write!(f, "done: {result}"),
            Action::Impossible { result } => write!(f, "impossible: {result}"),
        }
    }
}

struct Fields<'a> {
    kind: ActionKind,
    params: &'a Map<String, Value>,
}

impl Fields<'_> {
    fn missing(&self, name: &'static str) -> ActionError {
        ActionError::MissingParameter {
            action: self.kind,
            name,
        }
    }

    fn invalid(&self, name: &'static str, reason: impl Into<String>) -> ActionError {
        ActionError::InvalidParameter {
            action: self.kind,
            name,
            reason: reason.into(),
        }
    }

    fn present(&self, name: &str) -> Option<&Value> {
        self.params.get(name).filter(|v| !v.is_null())
    }

    fn required_str(&self, name: &'static str) -> Result<String, ActionError> {
        self.optional_str(name)?.ok_or_else(|| self.missing(name))
    }

    fn optional_str(&self, name: &'static str) -> Result<Option<String>, ActionError> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.invalid(name, format!("expected a string, got {other}"))),
        }
    }

    fn optional_int(&self, name: &'static str) -> Result<Option<i64>, ActionError> {
        let Some(value) = self.present(name) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| self.invalid(name, format!("expected an integer, got {value}")))
    }

    fn seconds(&self, name: &'static str) -> Result<f64, ActionError> {
        let value = self.present(name).ok_or_else(|| self.missing(name))?;
        let seconds = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| self.invalid(name, format!("expected a number, got {value}")))?;

        if !seconds.is_finite() || seconds < 0.0 {
            return Err(self.invalid(name, format!("must be a non-negative number, got {seconds}")));
        }
        if seconds > MAX_WAIT_SECONDS {
            return Err(self.invalid(
                name,
                format!("at most {MAX_WAIT_SECONDS} seconds, got {seconds}"),
            ));
        }
        Ok(seconds)
    }
}
