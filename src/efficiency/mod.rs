pub mod types;

pub use types::*;

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::date_util::{days_between, round1};

/// Per-assignee running totals, built and discarded within one
/// `aggregate` call.
#[derive(Debug, Default)]
struct Accumulator {
    completed: u64,
    in_progress: u64,
    pending: u64,
    total_efficiency: f64,
    total_time: f64,
    count: u64,
}

/// Score a single task against `now`.
///
/// Returns `(efficiency, time_delta_days)`:
/// - Completed on or before the due date scores 100; each day of delay
///   costs 5 points, floored at 0. The time delta is the absolute delay.
/// - In-progress tasks score the remaining share of their progress:
///   `progress * (1 - elapsed/total)`, ratio capped at 1, floored at 0.
/// - Pending and Review tasks score a flat 10 until the due date passes,
///   then 0.
/// - A task with no due date, or a Completed task with no completion
///   timestamp, contributes nothing.
fn score_task(task: &TaskSnapshot, now: DateTime<Utc>) -> (f64, f64) {
    let Some(due_at) = task.due_at else {
        return (0.0, 0.0);
    };

    match task.status {
        TaskStatus::Completed => {
            let Some(completed_at) = task.completed_at else {
                return (0.0, 0.0);
            };
            let delay_days = days_between(due_at, completed_at);
            let efficiency = if delay_days <= 0.0 {
                100.0
            } else {
                (100.0 - delay_days * 5.0).max(0.0)
            };
            (efficiency, delay_days.abs())
        }
        TaskStatus::InProgress => {
            let total_days = days_between(task.created_at, due_at);
            let elapsed_days = days_between(task.created_at, now);
            let ratio = if total_days > 0.0 {
                (elapsed_days / total_days).min(1.0)
            } else {
                1.0
            };
            let efficiency = (f64::from(task.progress) * (1.0 - ratio)).max(0.0);
            (efficiency, 0.0)
        }
        TaskStatus::Pending | TaskStatus::Review => {
            let efficiency = if now > due_at { 0.0 } else { 10.0 };
            (efficiency, 0.0)
        }
    }
}

/// Aggregate task snapshots into one efficiency row per assignee, sorted
/// descending by average efficiency. Assignees appear in first-seen order
/// before the sort, and the sort is stable, so exact ties keep that order.
///
/// Pure and total: no input produces an error, and the same `(tasks, now)`
/// always yields the same output.
pub fn aggregate(tasks: &[TaskSnapshot], now: DateTime<Utc>) -> Vec<EfficiencyRow> {
    let mut order: Vec<String> = Vec::new();
    let mut stats: HashMap<String, Accumulator> = HashMap::new();

    for task in tasks {
        let name = task.assignee.as_deref().unwrap_or(UNASSIGNED);
        let acc = match stats.entry(name.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                order.push(name.to_string());
                e.insert(Accumulator::default())
            }
        };

        match task.status {
            TaskStatus::Completed => acc.completed += 1,
            TaskStatus::InProgress => acc.in_progress += 1,
            // Review is deliberately counted under pending.
            TaskStatus::Pending | TaskStatus::Review => acc.pending += 1,
        }

        let (efficiency, time_delta) = score_task(task, now);
        acc.total_efficiency += efficiency;
        acc.total_time += time_delta;
        acc.count += 1;
    }

    let mut rows: Vec<EfficiencyRow> = order
        .into_iter()
        .map(|name| {
            // count >= 1: an accumulator only exists once a task was seen.
            let acc = &stats[&name];
            let count = acc.count as f64;
            EfficiencyRow {
                name,
                completed: acc.completed,
                in_progress: acc.in_progress,
                pending: acc.pending,
                avg_time_days: round1(acc.total_time / count),
                avg_efficiency: round1(acc.total_efficiency / count),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.avg_efficiency
            .partial_cmp(&a.avg_efficiency)
            .unwrap_or(Ordering::Equal)
    });
    rows
}
