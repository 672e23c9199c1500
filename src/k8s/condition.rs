//! Status conditions
//!
//! Every readiness check in the suite reads the same `(type, status, reason,
//! message)` tuples out of a resource status block.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status condition reported by a reconciler
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(
        rename = "lastTransitionTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn new(condition_type: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.condition_type, self.status)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

/// Anything exposing a list of status conditions
///
/// Objects that have not been reconciled yet have no status at all; they
/// return an empty list rather than an error.
pub trait HasConditions {
    fn conditions(&self) -> Vec<Condition>;
}

/// Expected state of a single condition
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionCheck {
    pub condition_type: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ConditionCheck {
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// True when `condition` matches every populated field
    pub fn matches(&self, condition: &Condition) -> bool {
        check_condition(
            condition,
            &self.condition_type,
            &self.status,
            self.reason.as_deref(),
            self.message.as_deref(),
        )
    }

    /// True when any condition of `obj` matches
    pub fn holds<T: HasConditions + ?Sized>(&self, obj: &T) -> bool {
        obj.conditions().iter().any(|c| self.matches(c))
    }
}

impl fmt::Display for ConditionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.condition_type, self.status)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

/// Build a check for `type == status`
pub fn has_condition(condition_type: impl Into<String>, status: impl Into<String>) -> ConditionCheck {
    ConditionCheck {
        condition_type: condition_type.into(),
        status: status.into(),
        reason: None,
        message: None,
    }
}

/// Compare a condition field by field; `None` means "don't care"
pub fn check_condition(
    condition: &Condition,
    condition_type: &str,
    status: &str,
    reason: Option<&str>,
    message: Option<&str>,
) -> bool {
    condition.condition_type == condition_type
        && condition.status == status
        && reason.map_or(true, |r| condition.reason.as_deref() == Some(r))
        && message.map_or(true, |m| condition.message.as_deref() == Some(m))
}

/// Render conditions for error messages
pub fn describe(conditions: &[Condition]) -> String {
    if conditions.is_empty() {
        return "no conditions reported".to_string();
    }
    conditions
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
