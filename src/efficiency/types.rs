use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

/// Grouping label for tasks with no assignee.
pub const UNASSIGNED: &str = "Unassigned";

/// Lifecycle state of a task. The set is closed: adding a state means
/// updating every `match` over this enum, including the aggregator's
/// bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Review,
    Completed,
}

impl TaskStatus {
    /// Canonical display/storage form.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Review => "Review",
            TaskStatus::Completed => "Completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(TaskStatus::Pending),
            "In Progress" => Ok(TaskStatus::InProgress),
            "Review" => Ok(TaskStatus::Review),
            "Completed" => Ok(TaskStatus::Completed),
            other => Err(Error::Validation(format!(
                "unknown task status: {other}. Use: Pending, In Progress, Review, Completed"
            ))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a task as the aggregator consumes it.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    /// Required at creation; optional here so stale rows degrade to a zero
    /// contribution instead of an error.
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Set only when the task is Completed; may still be missing.
    pub completed_at: Option<DateTime<Utc>>,
    /// Percentage, 0-100.
    pub progress: u8,
    /// Assignee display name; `None` groups under "Unassigned".
    pub assignee: Option<String>,
}

/// One output row of the efficiency report, ranked by `avg_efficiency`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyRow {
    pub name: String,
    pub completed: u64,
    pub in_progress: u64,
    pub pending: u64,
    /// Average absolute completion delay in days, one decimal.
    pub avg_time_days: f64,
    /// Average efficiency score (0-100), one decimal.
    pub avg_efficiency: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Completed,
        ] {
            assert_eq!(TaskStatus::parse(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn test_status_parse_invalid() {
        assert!(TaskStatus::parse("Done").is_err());
        assert!(TaskStatus::parse("pending").is_err());
        assert!(TaskStatus::parse("").is_err());
    }
}
