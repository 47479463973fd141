//! Weekly plan model and the structural check applied to model output.
//!
//! A plan arrives as `{"weeklyPlan": {"week1": ["..."], ...}}`. Week order is
//! whatever order the object carried; `serde_json` is built with
//! `preserve_order` so it survives parsing and re-serialization.

use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

pub const PLAN_KEY: &str = "weeklyPlan";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Week {
    pub id: String,
    pub tasks: Vec<String>,
}

/// Ordered mapping of week id to the tasks for that week.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WeeklyPlan {
    weeks: Vec<Week>,
}

impl WeeklyPlan {
    pub fn weeks(&self) -> &[Week] {
        &self.weeks
    }

    pub fn is_empty(&self) -> bool {
        self.weeks.is_empty()
    }

    /// True when at least one week has a task.
    pub fn has_tasks(&self) -> bool {
        self.weeks.iter().any(|week| !week.tasks.is_empty())
    }

    /// Appends a week, replacing the tasks of an existing week with the same id.
    pub fn insert(&mut self, id: impl Into<String>, tasks: Vec<String>) {
        let id = id.into();
        match self.weeks.iter_mut().find(|week| week.id == id) {
            Some(week) => week.tasks = tasks,
            None => self.weeks.push(Week { id, tasks }),
        }
    }
}

impl Serialize for WeeklyPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.weeks.len()))?;
        for week in &self.weeks {
            map.serialize_entry(&week.id, &week.tasks)?;
        }
        map.end()
    }
}

/// Success body of `POST /api/decompose`.
#[derive(Debug, Clone, Serialize)]
pub struct DecomposeResponse {
    #[serde(rename = "weeklyPlan")]
    pub weekly_plan: WeeklyPlan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    pub path: Vec<String>,
    pub message: String,
}

impl SchemaIssue {
    fn new(path: &[&str], message: impl Into<String>) -> Self {
        Self {
            path: path.iter().map(|segment| segment.to_string()).collect(),
            message: message.into(),
        }
    }

    fn unexpected(path: &[&str], expected: &str, found: &Value) -> Self {
        Self::new(
            path,
            format!("Expected {}, received {}", expected, type_name(found)),
        )
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} - {}", self.path.join("."), self.message)
        }
    }
}

/// Every field that failed validation, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub issues: Vec<SchemaIssue>,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let issues = self
            .issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&issues)
    }
}

impl std::error::Error for SchemaViolation {}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Checks `value` against `{ weeklyPlan: Record<string, string[]> }`.
///
/// All offending paths are collected rather than stopping at the first one.
/// Keys other than `weeklyPlan` at the top level are ignored.
pub fn validate(value: &Value) -> Result<WeeklyPlan, SchemaViolation> {
    let root = match value {
        Value::Object(root) => root,
        other => {
            return Err(SchemaViolation {
                issues: vec![SchemaIssue::unexpected(&[], "object", other)],
            })
        }
    };

    let weeks = match root.get(PLAN_KEY) {
        Some(Value::Object(weeks)) => weeks,
        Some(other) => {
            return Err(SchemaViolation {
                issues: vec![SchemaIssue::unexpected(&[PLAN_KEY], "object", other)],
            })
        }
        None => {
            return Err(SchemaViolation {
                issues: vec![SchemaIssue::new(&[PLAN_KEY], "Required")],
            })
        }
    };

    let mut plan = WeeklyPlan::default();
    let mut issues = Vec::new();
    for (week_id, tasks) in weeks {
        let Value::Array(tasks) = tasks else {
            issues.push(SchemaIssue::unexpected(
                &[PLAN_KEY, week_id.as_str()],
                "array",
                tasks,
            ));
            continue;
        };
        let mut week_tasks = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            match task {
                Value::String(task) => week_tasks.push(task.clone()),
                other => {
                    let index = index.to_string();
                    issues.push(SchemaIssue::unexpected(
                        &[PLAN_KEY, week_id.as_str(), index.as_str()],
                        "string",
                        other,
                    ));
                }
            }
        }
        plan.insert(week_id.clone(), week_tasks);
    }

    if issues.is_empty() {
        Ok(plan)
    } else {
        Err(SchemaViolation { issues })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_accepts_plan() {
        let plan = validate(&json!({
            "weeklyPlan": {"week1": ["Practice chords"], "week2": ["Learn a song"]}
        }))
        .unwrap();

        assert_eq!(plan.weeks().len(), 2);
        assert_eq!(plan.weeks()[0].id, "week1");
        assert_eq!(plan.weeks()[1].tasks, vec!["Learn a song".to_string()]);
        assert!(plan.has_tasks());
    }

    #[test]
    fn test_validate_keeps_week_order() {
        let raw = r#"{"weeklyPlan": {"week10": ["b"], "week2": ["a"], "week1": []}}"#;
        let value: Value = serde_json::from_str(raw).unwrap();
        let plan = validate(&value).unwrap();

        let ids: Vec<&str> = plan.weeks().iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["week10", "week2", "week1"]);
        assert_eq!(
            serde_json::to_string(&DecomposeResponse { weekly_plan: plan }).unwrap(),
            r#"{"weeklyPlan":{"week10":["b"],"week2":["a"],"week1":[]}}"#
        );
    }

    #[test]
    fn test_validate_missing_key() {
        let err = validate(&json!({"week1": ["a"]})).unwrap_err();
        assert_eq!(err.issues, vec![SchemaIssue::new(&["weeklyPlan"], "Required")]);
        assert_eq!(err.to_string(), "weeklyPlan - Required");
    }

    #[test]
    fn test_validate_reports_every_bad_field() {
        let err = validate(&json!({
            "weeklyPlan": {"week1": "Practice chords", "week2": ["ok", 3], "week3": ["fine"]}
        }))
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "weeklyPlan.week1 - Expected array, received string; \
             weeklyPlan.week2.1 - Expected string, received number"
        );
    }

    #[test]
    fn test_validate_rejects_non_object_plan() {
        let err = validate(&json!({"weeklyPlan": [["a"]]})).unwrap_err();
        assert_eq!(err.to_string(), "weeklyPlan - Expected object, received array");

        let err = validate(&json!(["weeklyPlan"])).unwrap_err();
        assert_eq!(err.to_string(), "Expected object, received array");
    }

    #[test]
    fn test_empty_plan_has_no_tasks() {
        let plan = validate(&json!({"weeklyPlan": {}})).unwrap();
        assert!(plan.is_empty());
        assert!(!plan.has_tasks());

        let plan = validate(&json!({"weeklyPlan": {"week1": []}})).unwrap();
        assert!(!plan.is_empty());
        assert!(!plan.has_tasks());
    }
}
