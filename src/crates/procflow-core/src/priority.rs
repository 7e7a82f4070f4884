//! Priority parsing, validation and ordering for parallel groups.
//!
//! A member joins a group with an optional priority, written as a trailing
//! `(<digits>)` on its display name at the moment it is added:
//!
//! ```rust
//! use procflow_core::priority::parse_priority;
//!
//! assert_eq!(parse_priority("drill(1)"), ("drill".to_string(), Some(1)));
//! assert_eq!(parse_priority("drill"), ("drill".to_string(), None));
//! ```
//!
//! Lower numbers run first. Members without a priority sort after every assigned
//! one, and ties keep declaration order.

use crate::error::{FlowError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

fn priority_suffix() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(.+?)\((\d+)\)$").ok())
        .as_ref()
}

/// Split a trailing `(<digits>)` priority off a display name.
///
/// Surrounding whitespace is ignored when matching. Names without a well-formed
/// suffix, or whose number does not fit in a `u32`, come back unchanged with no
/// priority.
pub fn parse_priority(name: &str) -> (String, Option<u32>) {
    if let Some(caps) = priority_suffix().and_then(|re| re.captures(name.trim())) {
        if let Ok(priority) = caps[2].parse::<u32>() {
            return (caps[1].to_string(), Some(priority));
        }
    }
    (name.to_string(), None)
}

/// Rules a group's priority assignment must satisfy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityPolicy {
    /// Assigned priorities are at least 1 and pairwise distinct. Members may go
    /// without a priority.
    #[default]
    Unique,
    /// Either every member has a priority or none does, and the assigned set is
    /// exactly `1..=n`.
    Contiguous,
}

impl fmt::Display for PriorityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityPolicy::Unique => write!(f, "unique"),
            PriorityPolicy::Contiguous => write!(f, "contiguous"),
        }
    }
}

impl FromStr for PriorityPolicy {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unique" => Ok(PriorityPolicy::Unique),
            "contiguous" => Ok(PriorityPolicy::Contiguous),
            other => Err(FlowError::Configuration(format!(
                "unknown priority policy '{other}' (expected 'unique' or 'contiguous')"
            ))),
        }
    }
}

/// Validate a whole group's priorities against `policy`.
///
/// `members` pairs each member's name with its priority, in declaration order.
/// Groups with no assigned priority at all are always valid.
pub fn validate_priorities(members: &[(&str, Option<u32>)], policy: PriorityPolicy) -> Result<()> {
    let assigned: Vec<(&str, u32)> = members
        .iter()
        .filter_map(|(name, p)| p.map(|p| (*name, p)))
        .collect();

    if assigned.is_empty() {
        return Ok(());
    }

    if let Some((name, _)) = assigned.iter().find(|(_, p)| *p == 0) {
        return Err(FlowError::PriorityValidation(format!(
            "priority of '{name}' must be at least 1"
        )));
    }

    let mut seen = HashSet::with_capacity(assigned.len());
    for (name, p) in &assigned {
        if !seen.insert(*p) {
            return Err(FlowError::PriorityValidation(format!(
                "priority {p} of '{name}' is already taken"
            )));
        }
    }

    if policy == PriorityPolicy::Contiguous {
        if assigned.len() != members.len() {
            let missing: Vec<&str> = members
                .iter()
                .filter(|(_, p)| p.is_none())
                .map(|(name, _)| *name)
                .collect();
            return Err(FlowError::PriorityValidation(format!(
                "either all members or none must have a priority; missing: {}",
                missing.join(", ")
            )));
        }

        let n = members.len() as u32;
        if let Some((name, p)) = assigned.iter().find(|(_, p)| *p > n) {
            return Err(FlowError::PriorityValidation(format!(
                "priority {p} of '{name}' is outside 1..={n}"
            )));
        }
    }

    Ok(())
}

/// Sort key for an optional priority. Unassigned sorts after every assigned
/// priority, including `u32::MAX`.
pub fn sort_key(priority: Option<u32>) -> (bool, u32) {
    (priority.is_none(), priority.unwrap_or(0))
}

/// Indices of `priorities` in execution order: ascending priority, ties and
/// unassigned members in declaration order.
pub fn execution_indices(priorities: &[Option<u32>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..priorities.len()).collect();
    order.sort_by_key(|&i| sort_key(priorities[i]));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse_priority("paint(3)"), ("paint".to_string(), Some(3)));
        assert_eq!(parse_priority("a(b)(2)"), ("a(b)".to_string(), Some(2)));
        assert_eq!(parse_priority("(4)"), ("(4)".to_string(), None));
        assert_eq!(parse_priority("weld( 2)"), ("weld( 2)".to_string(), None));
        assert_eq!(parse_priority("weld(2) "), ("weld".to_string(), Some(2)));
        assert_eq!(parse_priority("  drill(7)"), ("drill".to_string(), Some(7)));
        assert_eq!(
            parse_priority("huge(99999999999)"),
            ("huge(99999999999)".to_string(), None)
        );
    }

    #[test]
    fn test_unique_policy() {
        let ok = [("a", Some(2)), ("b", Some(3)), ("c", None)];
        assert!(validate_priorities(&ok, PriorityPolicy::Unique).is_ok());

        let dup = [("a", Some(1)), ("b", Some(1))];
        assert!(matches!(
            validate_priorities(&dup, PriorityPolicy::Unique),
            Err(FlowError::PriorityValidation(_))
        ));

        let zero = [("a", Some(0))];
        assert!(validate_priorities(&zero, PriorityPolicy::Unique).is_err());
    }

    #[test]
    fn test_contiguous_policy() {
        let ok = [("a", Some(2)), ("b", Some(1)), ("c", Some(3))];
        assert!(validate_priorities(&ok, PriorityPolicy::Contiguous).is_ok());

        let partial = [("a", Some(1)), ("b", None)];
        assert!(validate_priorities(&partial, PriorityPolicy::Contiguous).is_err());

        let gap = [("a", Some(1)), ("b", Some(3))];
        assert!(validate_priorities(&gap, PriorityPolicy::Contiguous).is_err());

        let none = [("a", None), ("b", None)];
        assert!(validate_priorities(&none, PriorityPolicy::Contiguous).is_ok());
    }

    #[test]
    fn test_execution_indices() {
        let order = execution_indices(&[Some(2), None, Some(1), Some(3)]);
        assert_eq!(order, vec![2, 0, 3, 1]);
    }

    #[test]
    fn test_unassigned_sorts_after_max_priority() {
        let order = execution_indices(&[None, Some(u32::MAX), Some(1)]);
        assert_eq!(order, vec![2, 1, 0]);
        assert!(sort_key(Some(u32::MAX)) < sort_key(None));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Unique".parse::<PriorityPolicy>().unwrap(), PriorityPolicy::Unique);
        assert_eq!(
            " contiguous ".parse::<PriorityPolicy>().unwrap(),
            PriorityPolicy::Contiguous
        );
        assert!("strict".parse::<PriorityPolicy>().is_err());
    }
}
