//! Status conditions
//!
//! A [`Conditions`] set holds at most one [`Condition`] per type, keeps
//! insertion order for stable output, and serialises as a plain list.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Condition type describing the overall outcome of a run
pub const CONDITION_SUCCEEDED: &str = "Succeeded";

/// Tri-state value of a condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A named, typed status field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn new(condition_type: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: String::new(),
            message: String::new(),
            last_transition_time: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }

    pub fn is_unknown(&self) -> bool {
        self.status == ConditionStatus::Unknown
    }

    /// Compares every field except the last transition time
    pub fn same_as(&self, other: &Condition) -> bool {
        self.condition_type == other.condition_type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Ordered set of conditions, unique by type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions {
    entries: IndexMap<String, Condition>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the condition of the given type, if present
    pub fn get(&self, condition_type: &str) -> Option<&Condition> {
        self.entries.get(condition_type)
    }

    /// Inserts `condition`, overwriting any entry of the same type in place
    ///
    /// The transition time moves to `clock.now()` only when the status or
    /// reason differs from the existing entry.
    pub fn set(&mut self, mut condition: Condition, clock: &dyn Clock) {
        let transition_time = match self.entries.get(&condition.condition_type) {
            Some(existing)
                if existing.status == condition.status && existing.reason == condition.reason =>
            {
                existing.last_transition_time.or_else(|| Some(clock.now()))
            }
            _ => Some(clock.now()),
        };
        condition.last_transition_time = transition_time;
        self.entries
            .insert(condition.condition_type.clone(), condition);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(list: Vec<Condition>) -> Self {
        Self {
            entries: list
                .into_iter()
                .map(|c| (c.condition_type.clone(), c))
                .collect(),
        }
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(set: Conditions) -> Self {
        set.entries.into_values().collect()
    }
}
