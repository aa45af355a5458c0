use chrono::{DateTime, Utc};

use crate::efficiency;
use crate::error::{Error, Result};
use crate::llm::agents::report::local_summary;
use crate::llm::Summarizer;
use crate::storage::repository;
use crate::storage::Database;

/// How many prior messages are replayed to the model.
const HISTORY_WINDOW: u32 = 10;

/// Handle one chat turn: persist the user's message in their most recent
/// conversation (creating one if needed), produce a reply, persist that
/// too, and return it. With no model available the reply is a stats answer
/// computed from the live task data.
pub async fn chat(
    db: &Database,
    summarizer: &Summarizer,
    user: Option<(i64, String)>,
    message: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    let message = message.trim().to_string();
    if message.is_empty() {
        return Err(Error::Validation("message must not be empty".into()));
    }

    let user_id = user.as_ref().map(|(id, _)| *id);
    let user_name = user.map(|(_, name)| name).unwrap_or_else(|| "Guest".to_string());

    let conversation_id = db
        .writer()
        .call(move |conn| {
            match repository::find_conversation(conn, user_id)? {
                Some(id) => Ok(id),
                None => repository::create_conversation(conn, user_id, &user_name, now),
            }
        })
        .await?;

    let user_message = message.clone();
    db.writer()
        .call(move |conn| {
            repository::append_message(conn, conversation_id, "user", &user_message, now)
        })
        .await?;

    let reply = match summarizer {
        Summarizer::Remote(agent) => {
            let history = db
                .reader()
                .call(move |conn| {
                    repository::recent_messages(conn, conversation_id, HISTORY_WINDOW)
                })
                .await?;
            let stats = stats_line(db, now).await?;
            let transcript: String = history
                .iter()
                .map(|(role, content)| format!("{role}: {content}\n"))
                .collect();

            let prompt = format!(
                r#"You are a task-management assistant. Current team stats: {stats}

Conversation so far:
{transcript}
Reply to the last user message in 1-3 sentences of plain text."#
            );
            let response = agent.run(&prompt).await.map_err(|e| Error::Llm(e.to_string()))?;
            response.text().trim().to_string()
        }
        Summarizer::Local => stats_line(db, now).await?,
    };

    let assistant_reply = reply.clone();
    db.writer()
        .call(move |conn| {
            repository::append_message(conn, conversation_id, "assistant", &assistant_reply, now)
        })
        .await?;

    Ok(reply)
}

async fn stats_line(db: &Database, now: DateTime<Utc>) -> Result<String> {
    let snapshots = db
        .reader()
        .call(|conn| repository::task_snapshots(conn))
        .await?;
    let rows = efficiency::aggregate(&snapshots, now);
    Ok(local_summary(&rows))
}
