//! # Conditions
//!
//! Condition bookkeeping for source records.
//!
//! Each source kind carries a fixed set of dependent condition types plus a
//! `Ready` aggregate. `Ready` is a derived projection: it is recomputed from
//! the dependents on every write and mirrors the worst contributor. A stored
//! `Ready` value is never trusted.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate condition type
pub const CONDITION_READY: &str = "Ready";

pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";
pub const CONDITION_UNKNOWN: &str = "Unknown";

/// Condition represents one facet of a record's observed state
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Last time the condition status changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Record generation observed when the condition was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// A fixed set of dependent condition types whose aggregate is `Ready`
#[derive(Debug, Clone, Copy)]
pub struct ConditionSet {
    dependents: &'static [&'static str],
}

impl ConditionSet {
    pub const fn new(dependents: &'static [&'static str]) -> Self {
        Self { dependents }
    }

    /// Populate any missing condition type (dependents and `Ready`) as
    /// `Unknown`. Existing conditions are left untouched so observers never
    /// see a fleeting healthy state.
    pub fn initialize(&self, conditions: &mut Vec<Condition>, generation: i64) {
        for t in self.dependents.iter().chain([&CONDITION_READY]) {
            if get_condition(conditions, t).is_none() {
                set_condition(conditions, t, CONDITION_UNKNOWN, None, None, generation);
            }
        }
    }

    pub fn mark_true(
        &self,
        conditions: &mut Vec<Condition>,
        r#type: &str,
        reason: &str,
        message: &str,
        generation: i64,
    ) {
        set_condition(
            conditions,
            r#type,
            CONDITION_TRUE,
            Some(reason),
            Some(message),
            generation,
        );
        self.recompute_ready(conditions, generation);
    }

    pub fn mark_false(
        &self,
        conditions: &mut Vec<Condition>,
        r#type: &str,
        reason: &str,
        message: &str,
        generation: i64,
    ) {
        set_condition(
            conditions,
            r#type,
            CONDITION_FALSE,
            Some(reason),
            Some(message),
            generation,
        );
        self.recompute_ready(conditions, generation);
    }

    /// Recompute the `Ready` aggregate from the dependents.
    ///
    /// `Ready` is `True` iff every dependent is `True`; `False` if any is
    /// `False`; else `Unknown`. Reason and message mirror the worst
    /// contributor (the first `False`, else the first non-`True`).
    pub fn recompute_ready(&self, conditions: &mut Vec<Condition>, generation: i64) {
        let mut worst: Option<Condition> = None;
        for t in self.dependents {
            let dependent = get_condition(conditions, t).cloned().unwrap_or(Condition {
                r#type: (*t).to_string(),
                status: CONDITION_UNKNOWN.to_string(),
                reason: None,
                message: None,
                last_transition_time: None,
                observed_generation: None,
            });
            match dependent.status.as_str() {
                CONDITION_FALSE => {
                    worst = Some(dependent);
                    break;
                }
                CONDITION_TRUE => {}
                _ => {
                    if worst.is_none() {
                        worst = Some(dependent);
                    }
                }
            }
        }

        match worst {
            Some(c) => set_condition(
                conditions,
                CONDITION_READY,
                &c.status,
                c.reason.as_deref(),
                c.message.as_deref(),
                generation,
            ),
            None => set_condition(
                conditions,
                CONDITION_READY,
                CONDITION_TRUE,
                Some("Ready"),
                Some(""),
                generation,
            ),
        }
    }
}

/// Look up a condition by type
pub fn get_condition<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}

/// Whether a condition is absent or `Unknown`
pub fn condition_is_unknown(conditions: &[Condition], r#type: &str) -> bool {
    get_condition(conditions, r#type).map_or(true, |c| c.status == CONDITION_UNKNOWN)
}

fn set_condition(
    conditions: &mut Vec<Condition>,
    r#type: &str,
    status: &str,
    reason: Option<&str>,
    message: Option<&str>,
    generation: i64,
) {
    let now = || Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
    match conditions.iter_mut().find(|c| c.r#type == r#type) {
        Some(existing) => {
            // transition time only moves when the status value changes
            if existing.status != status {
                existing.last_transition_time = now();
            }
            existing.status = status.to_string();
            existing.reason = reason.map(str::to_string);
            existing.message = message.map(str::to_string);
            existing.observed_generation = Some(generation);
        }
        None => conditions.push(Condition {
            r#type: r#type.to_string(),
            status: status.to_string(),
            reason: reason.map(str::to_string),
            message: message.map(str::to_string),
            last_transition_time: now(),
            observed_generation: Some(generation),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SET: ConditionSet = ConditionSet::new(&["AlphaResolved", "ArtifactAvailable"]);

    #[test]
    fn initialize_populates_missing_as_unknown() {
        let mut conditions = Vec::new();
        SET.initialize(&mut conditions, 1);

        assert_eq!(conditions.len(), 3);
        for c in &conditions {
            assert_eq!(c.status, CONDITION_UNKNOWN, "condition {}", c.r#type);
        }
    }

    #[test]
    fn initialize_preserves_existing_conditions() {
        let mut conditions = Vec::new();
        SET.mark_true(&mut conditions, "AlphaResolved", "Resolved", "", 1);
        SET.initialize(&mut conditions, 2);

        let alpha = get_condition(&conditions, "AlphaResolved").unwrap();
        assert_eq!(alpha.status, CONDITION_TRUE);
    }

    #[test]
    fn ready_true_iff_all_dependents_true() {
        let mut conditions = Vec::new();
        SET.initialize(&mut conditions, 1);
        SET.mark_true(&mut conditions, "AlphaResolved", "Resolved", "", 1);
        assert_eq!(
            get_condition(&conditions, CONDITION_READY).unwrap().status,
            CONDITION_UNKNOWN
        );

        SET.mark_true(&mut conditions, "ArtifactAvailable", "Available", "", 1);
        let ready = get_condition(&conditions, CONDITION_READY).unwrap();
        assert_eq!(ready.status, CONDITION_TRUE);
        assert_eq!(ready.reason.as_deref(), Some("Ready"));
    }

    #[test]
    fn ready_mirrors_first_false_dependent() {
        let mut conditions = Vec::new();
        SET.initialize(&mut conditions, 1);
        SET.mark_true(&mut conditions, "AlphaResolved", "Resolved", "", 1);
        SET.mark_false(
            &mut conditions,
            "ArtifactAvailable",
            "RemoteError",
            "boom",
            1,
        );

        let ready = get_condition(&conditions, CONDITION_READY).unwrap();
        assert_eq!(ready.status, CONDITION_FALSE);
        assert_eq!(ready.reason.as_deref(), Some("RemoteError"));
        assert_eq!(ready.message.as_deref(), Some("boom"));
    }

    #[test]
    fn transition_time_is_stable_when_status_is_unchanged() {
        let mut conditions = Vec::new();
        SET.mark_false(&mut conditions, "AlphaResolved", "RemoteError", "one", 1);
        let first = get_condition(&conditions, "AlphaResolved")
            .unwrap()
            .last_transition_time
            .clone();

        SET.mark_false(&mut conditions, "AlphaResolved", "RemoteError", "two", 2);
        let alpha = get_condition(&conditions, "AlphaResolved").unwrap();
        assert_eq!(alpha.last_transition_time, first);
        assert_eq!(alpha.message.as_deref(), Some("two"));
        assert_eq!(alpha.observed_generation, Some(2));
    }
}
