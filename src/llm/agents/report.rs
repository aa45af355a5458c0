use chrono::{DateTime, Utc};

use crate::date_util::{round1, strip_code_fences};
use crate::efficiency::EfficiencyRow;
use crate::error::{Error, Result};
use crate::llm::Summarizer;
use crate::storage::repository;
use crate::storage::Database;

const PROMPT_VERSION: &str = "report-v1";

/// Narrative summary for an efficiency report. Remote summaries are cached
/// per (report date, prompt version); the local formatter is cheap enough
/// to skip the cache.
pub async fn summarize_report(
    db: &Database,
    summarizer: &Summarizer,
    rows: &[EfficiencyRow],
    now: DateTime<Utc>,
    force: bool,
) -> Result<String> {
    let agent = match summarizer {
        Summarizer::Remote(agent) => agent,
        Summarizer::Local => return Ok(local_summary(rows)),
    };

    let report_date = now.format("%Y-%m-%d").to_string();

    if !force {
        let key = report_date.clone();
        let cached = db
            .reader()
            .call(move |conn| repository::get_report_summary(conn, &key, PROMPT_VERSION))
            .await?;
        if let Some(summary) = cached {
            return Ok(summary);
        }
    }

    let rows_json = serde_json::to_string_pretty(rows).unwrap_or_default();
    let prompt = format!(
        r#"You are reviewing a team's task efficiency report for {report_date}.
Each row is one assignee: task counts by status, average days early/late on
completed tasks, and an average efficiency score from 0 to 100.

{rows_json}

Write a short plain-text summary (3-5 sentences) for a manager: overall team
health, who stands out, and who may need support. No markdown, no headings."#
    );

    let response = agent.run(&prompt).await.map_err(|e| Error::Llm(e.to_string()))?;
    let text = response.text();
    let summary = strip_code_fences(text.trim()).to_string();

    let key = report_date.clone();
    let stored = summary.clone();
    db.writer()
        .call(move |conn| repository::store_report_summary(conn, &key, PROMPT_VERSION, &stored, now))
        .await?;

    Ok(summary)
}

/// Deterministic summary built straight from the report rows. Also serves
/// as the chat fallback when no model is reachable.
pub fn local_summary(rows: &[EfficiencyRow]) -> String {
    if rows.is_empty() {
        return "No tasks to report yet.".to_string();
    }
    let avg = round1(rows.iter().map(|r| r.avg_efficiency).sum::<f64>() / rows.len() as f64);
    // Rows arrive sorted by efficiency, best first.
    let top = &rows[0];
    let low = &rows[rows.len() - 1];
    format!(
        "Team average efficiency is {avg}%. Top performer: {} ({}%). Lowest: {} ({}%).",
        top.name, top.avg_efficiency, low.name, low.avg_efficiency
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, eff: f64) -> EfficiencyRow {
        EfficiencyRow {
            name: name.to_string(),
            completed: 1,
            in_progress: 0,
            pending: 0,
            avg_time_days: 0.0,
            avg_efficiency: eff,
        }
    }

    #[test]
    fn test_local_summary_empty() {
        assert_eq!(local_summary(&[]), "No tasks to report yet.");
    }

    #[test]
    fn test_local_summary_names_top_and_lowest() {
        let rows = vec![row("Alice", 90.0), row("Bob", 55.0), row("Carol", 10.0)];
        let summary = local_summary(&rows);
        assert!(summary.contains("Team average efficiency is 51.7%"));
        assert!(summary.contains("Top performer: Alice (90%)"));
        assert!(summary.contains("Lowest: Carol (10%)"));
    }

    #[test]
    fn test_local_summary_single_row() {
        let rows = vec![row("Alice", 100.0)];
        let summary = local_summary(&rows);
        assert!(summary.contains("Team average efficiency is 100%"));
        assert!(summary.contains("Top performer: Alice (100%)"));
        assert!(summary.contains("Lowest: Alice (100%)"));
    }
}
