//! Activity-decision parsing.
//!
//! The model is asked for a JSON object, optionally wrapped in a fenced code
//! block. Validation is all-or-nothing: a single bad activity rejects the
//! whole decision.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::DecisionError;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").unwrap());

static STRATEGY_CHANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(pivot|change strategy|strategy change|new strategy|switch to)\b").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityType {
    Build,
    Write,
    Research,
    Analyze,
    Iterate,
    Ship,
}

impl ActivityType {
    pub const ALL: [ActivityType; 6] = [
        ActivityType::Build,
        ActivityType::Write,
        ActivityType::Research,
        ActivityType::Analyze,
        ActivityType::Iterate,
        ActivityType::Ship,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Build => "BUILD",
            ActivityType::Write => "WRITE",
            ActivityType::Research => "RESEARCH",
            ActivityType::Analyze => "ANALYZE",
            ActivityType::Iterate => "ITERATE",
            ActivityType::Ship => "SHIP",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub action: String,
    pub reasoning: String,
    pub duration_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDecision {
    pub activities: Vec<Activity>,
    pub urgency_assessment: String,
    pub confidence_in_strategy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_notes: Option<String>,
}

impl ActivityDecision {
    /// Strategy notes, if present and not blank.
    pub fn notes(&self) -> Option<&str> {
        self.strategy_notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// Whether free text talks about changing strategy.
pub fn mentions_strategy_change(text: &str) -> bool {
    STRATEGY_CHANGE_RE.is_match(text)
}

/// Strip an optional fenced code block around the payload.
fn strip_fence(raw: &str) -> &str {
    match FENCE_RE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

/// Parse and validate a decision response.
pub fn parse_decision(raw: &str) -> Result<ActivityDecision, DecisionError> {
    if raw.trim().is_empty() {
        return Err(DecisionError::Empty);
    }

    let value: Value = serde_json::from_str(strip_fence(raw))
        .map_err(|e| DecisionError::InvalidJson(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(DecisionError::NotAnObject);
    };

    let activities = match obj.get("activities") {
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .enumerate()
            .map(|(index, item)| parse_activity(index, item))
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(DecisionError::NoActivities),
    };

    let urgency_assessment = match obj.get("urgency_assessment") {
        Some(Value::String(s)) => s.clone(),
        _ => {
            return Err(DecisionError::InvalidField {
                field: "urgency_assessment",
                reason: "must be a string",
            });
        }
    };

    let confidence_in_strategy = match obj.get("confidence_in_strategy").and_then(Value::as_f64) {
        Some(c) if (0.0..=1.0).contains(&c) => c,
        Some(_) => {
            return Err(DecisionError::InvalidField {
                field: "confidence_in_strategy",
                reason: "must be between 0 and 1",
            });
        }
        None => {
            return Err(DecisionError::InvalidField {
                field: "confidence_in_strategy",
                reason: "must be a number",
            });
        }
    };

    let strategy_notes = match obj.get("strategy_notes") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(DecisionError::InvalidField {
                field: "strategy_notes",
                reason: "must be a string",
            });
        }
    };

    Ok(ActivityDecision {
        activities,
        urgency_assessment,
        confidence_in_strategy,
        strategy_notes,
    })
}

fn parse_activity(index: usize, item: &Value) -> Result<Activity, DecisionError> {
    let Value::Object(obj) = item else {
        return Err(DecisionError::InvalidActivity {
            index,
            reason: "must be an object".to_string(),
        });
    };

    let kind = match obj.get("type") {
        Some(Value::String(s)) => s.parse::<ActivityType>().map_err(|_| {
            DecisionError::InvalidActivityType {
                index,
                value: s.clone(),
            }
        })?,
        other => {
            return Err(DecisionError::InvalidActivityType {
                index,
                value: other.map(Value::to_string).unwrap_or_else(|| "missing".into()),
            });
        }
    };

    let action = non_empty_string(obj, "action", index)?;
    let reasoning = non_empty_string(obj, "reasoning", index)?;

    let duration_minutes = match obj.get("duration_minutes").and_then(Value::as_f64) {
        Some(d) if d > 0.0 => d,
        _ => {
            return Err(DecisionError::InvalidActivity {
                index,
                reason: "duration_minutes must be a positive number".to_string(),
            });
        }
    };

    Ok(Activity {
        kind,
        action,
        reasoning,
        duration_minutes,
    })
}

fn non_empty_string(
    obj: &Map<String, Value>,
    field: &str,
    index: usize,
) -> Result<String, DecisionError> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        _ => Err(DecisionError::InvalidActivity {
            index,
            reason: format!("{} must be a non-empty string", field),
        }),
    }
}
