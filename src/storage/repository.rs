use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::date_util::parse_rfc3339;
use crate::efficiency::{TaskSnapshot, TaskStatus};

// ── Row types ──────────────────────────────────────────────────────

/// Account role. Admins manage users and tasks and see the team report;
/// employees only touch their own tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "employee" => Some(Role::Employee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: String,
}

/// A task as listed/displayed. Dates stay in their stored RFC 3339 form;
/// `task_snapshots` produces the parsed view the aggregator consumes.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRow {
    pub task_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<i64>,
    pub assignee_name: Option<String>,
    pub status: TaskStatus,
    pub progress: u8,
    pub due_at: String,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationExport {
    pub conversation_id: i64,
    pub user_name: String,
    pub last_updated: String,
    pub messages: Vec<MessageRow>,
}

// ── Users ──────────────────────────────────────────────────────────

pub fn create_user(
    conn: &Connection,
    name: &str,
    email: &str,
    password_hash: &str,
    role: Role,
    now: DateTime<Utc>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO users (name, email, password_hash, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![name, email, password_hash, role.as_str(), now.to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

fn user_from_row(row: &rusqlite::Row<'_>) -> Result<User, rusqlite::Error> {
    let role_str: String = row.get(4)?;
    Ok(User {
        user_id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: Role::parse(&role_str).unwrap_or(Role::Employee),
        created_at: row.get(5)?,
    })
}

const USER_COLUMNS: &str = "user_id, name, email, password_hash, role, created_at";

pub fn find_user_by_email(
    conn: &Connection,
    email: &str,
) -> Result<Option<User>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        params![email],
        user_from_row,
    )
    .optional()
}

pub fn get_user(conn: &Connection, user_id: i64) -> Result<Option<User>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
        params![user_id],
        user_from_row,
    )
    .optional()
}

pub fn list_users(conn: &Connection, role: Option<Role>) -> Result<Vec<User>, rusqlite::Error> {
    let (sql, bind) = match role {
        Some(r) => (
            format!("SELECT {USER_COLUMNS} FROM users WHERE role = ?1 ORDER BY user_id"),
            Some(r.as_str()),
        ),
        None => (
            format!("SELECT {USER_COLUMNS} FROM users ORDER BY user_id"),
            None,
        ),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = match bind {
        Some(r) => stmt.query_map(params![r], user_from_row)?,
        None => stmt.query_map([], user_from_row)?,
    };
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn delete_user(conn: &Connection, user_id: i64) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM users WHERE user_id = ?1", params![user_id])?;
    Ok(n > 0)
}

/// Update the authoritative user record. The session only ever holds the
/// user id, so this is the single path a profile edit takes.
pub fn update_user_profile(
    conn: &Connection,
    user_id: i64,
    name: Option<&str>,
    email: Option<&str>,
    password_hash: Option<&str>,
) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "UPDATE users SET
            name = COALESCE(?2, name),
            email = COALESCE(?3, email),
            password_hash = COALESCE(?4, password_hash)
         WHERE user_id = ?1",
        params![user_id, name, email, password_hash],
    )?;
    Ok(n > 0)
}

// ── Tasks ──────────────────────────────────────────────────────────

pub fn insert_task(
    conn: &Connection,
    title: &str,
    description: Option<&str>,
    assignee_id: Option<i64>,
    due_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO tasks (title, description, assignee_id, due_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            title,
            description,
            assignee_id,
            due_at.to_rfc3339(),
            now.to_rfc3339()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

const TASK_SELECT: &str = "SELECT t.task_id, t.title, t.description, t.assignee_id, u.name,
            t.status, t.progress, t.due_at, t.created_at, t.completed_at
     FROM tasks t
     LEFT JOIN users u ON u.user_id = t.assignee_id";

fn task_from_row(row: &rusqlite::Row<'_>) -> Result<Option<TaskRow>, rusqlite::Error> {
    let status_str: String = row.get(5)?;
    let progress: i64 = row.get(6)?;
    // Rows with a status outside the known set are skipped rather than
    // failing the whole listing.
    let Ok(status) = TaskStatus::parse(&status_str) else {
        return Ok(None);
    };
    Ok(Some(TaskRow {
        task_id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        assignee_id: row.get(3)?,
        assignee_name: row.get(4)?,
        status,
        progress: progress.clamp(0, 100) as u8,
        due_at: row.get(7)?,
        created_at: row.get(8)?,
        completed_at: row.get(9)?,
    }))
}

pub fn get_task(conn: &Connection, task_id: i64) -> Result<Option<TaskRow>, rusqlite::Error> {
    let row = conn
        .query_row(
            &format!("{TASK_SELECT} WHERE t.task_id = ?1"),
            params![task_id],
            task_from_row,
        )
        .optional()?;
    Ok(row.flatten())
}

/// List tasks, optionally filtered to one assignee, ordered by due date.
pub fn list_tasks(
    conn: &Connection,
    assignee_id: Option<i64>,
) -> Result<Vec<TaskRow>, rusqlite::Error> {
    let (sql, bind) = match assignee_id {
        Some(id) => (
            format!("{TASK_SELECT} WHERE t.assignee_id = ?1 ORDER BY t.due_at, t.task_id"),
            Some(id),
        ),
        None => (format!("{TASK_SELECT} ORDER BY t.due_at, t.task_id"), None),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = match bind {
        Some(id) => stmt.query_map(params![id], task_from_row)?,
        None => stmt.query_map([], task_from_row)?,
    };
    Ok(rows.filter_map(|r| r.ok()).flatten().collect())
}

pub fn update_task_fields(
    conn: &Connection,
    task_id: i64,
    title: Option<&str>,
    description: Option<&str>,
    due_at: Option<DateTime<Utc>>,
    assignee_id: Option<i64>,
) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "UPDATE tasks SET
            title = COALESCE(?2, title),
            description = COALESCE(?3, description),
            due_at = COALESCE(?4, due_at),
            assignee_id = COALESCE(?5, assignee_id)
         WHERE task_id = ?1",
        params![
            task_id,
            title,
            description,
            due_at.map(|d| d.to_rfc3339()),
            assignee_id
        ],
    )?;
    Ok(n > 0)
}

pub fn set_task_status(
    conn: &Connection,
    task_id: i64,
    status: TaskStatus,
    completed_at: Option<DateTime<Utc>>,
) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "UPDATE tasks SET status = ?2, completed_at = ?3 WHERE task_id = ?1",
        params![
            task_id,
            status.as_str(),
            completed_at.map(|d| d.to_rfc3339())
        ],
    )?;
    Ok(n > 0)
}

pub fn set_task_progress(
    conn: &Connection,
    task_id: i64,
    progress: u8,
    status: TaskStatus,
    completed_at: Option<DateTime<Utc>>,
) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "UPDATE tasks SET progress = ?2, status = ?3, completed_at = ?4 WHERE task_id = ?1",
        params![
            task_id,
            progress,
            status.as_str(),
            completed_at.map(|d| d.to_rfc3339())
        ],
    )?;
    Ok(n > 0)
}

pub fn delete_task(conn: &Connection, task_id: i64) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM tasks WHERE task_id = ?1", params![task_id])?;
    Ok(n > 0)
}

/// Fetch every task joined to its assignee's display name, in insertion
/// order, as the aggregator's input. Unparseable dates degrade to a zero
/// contribution instead of failing the fetch.
pub fn task_snapshots(conn: &Connection) -> Result<Vec<TaskSnapshot>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT t.status, t.due_at, t.created_at, t.completed_at, t.progress, u.name
         FROM tasks t
         LEFT JOIN users u ON u.user_id = t.assignee_id
         ORDER BY t.task_id",
    )?;
    let rows = stmt.query_map([], |row| {
        let status_str: String = row.get(0)?;
        let due_at: String = row.get(1)?;
        let created_at: String = row.get(2)?;
        let completed_at: Option<String> = row.get(3)?;
        let progress: i64 = row.get(4)?;
        let assignee: Option<String> = row.get(5)?;
        Ok((status_str, due_at, created_at, completed_at, progress, assignee))
    })?;

    let mut snapshots = Vec::new();
    for row in rows.filter_map(|r| r.ok()) {
        let (status_str, due_at, created_at, completed_at, progress, assignee) = row;
        let Ok(status) = TaskStatus::parse(&status_str) else {
            continue;
        };
        snapshots.push(TaskSnapshot {
            status,
            due_at: parse_rfc3339(&due_at),
            created_at: parse_rfc3339(&created_at).unwrap_or(DateTime::UNIX_EPOCH),
            completed_at: completed_at.as_deref().and_then(parse_rfc3339),
            progress: progress.clamp(0, 100) as u8,
            assignee,
        });
    }
    Ok(snapshots)
}

// ── Conversations ──────────────────────────────────────────────────

/// Most recent conversation for a user (or the most recent guest
/// conversation when no user is given).
pub fn find_conversation(
    conn: &Connection,
    user_id: Option<i64>,
) -> Result<Option<i64>, rusqlite::Error> {
    let sql = match user_id {
        Some(_) => {
            "SELECT conversation_id FROM conversations
             WHERE user_id = ?1 ORDER BY last_updated DESC LIMIT 1"
        }
        None => {
            "SELECT conversation_id FROM conversations
             WHERE user_id IS NULL ORDER BY last_updated DESC LIMIT 1"
        }
    };
    match user_id {
        Some(id) => conn.query_row(sql, params![id], |row| row.get(0)).optional(),
        None => conn.query_row(sql, [], |row| row.get(0)).optional(),
    }
}

pub fn create_conversation(
    conn: &Connection,
    user_id: Option<i64>,
    user_name: &str,
    now: DateTime<Utc>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO conversations (user_id, user_name, last_updated)
         VALUES (?1, ?2, ?3)",
        params![user_id, user_name, now.to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn append_message(
    conn: &Connection,
    conversation_id: i64,
    role: &str,
    content: &str,
    now: DateTime<Utc>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO messages (conversation_id, role, content, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![conversation_id, role, content, now.to_rfc3339()],
    )?;
    conn.execute(
        "UPDATE conversations SET last_updated = ?2 WHERE conversation_id = ?1",
        params![conversation_id, now.to_rfc3339()],
    )?;
    Ok(())
}

/// Last `limit` messages in chronological order.
pub fn recent_messages(
    conn: &Connection,
    conversation_id: i64,
    limit: u32,
) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT role, content FROM messages
         WHERE conversation_id = ?1 ORDER BY message_id DESC LIMIT ?2",
    )?;
    let mut rows: Vec<(String, String)> = stmt
        .query_map(params![conversation_id, limit], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .filter_map(|r| r.ok())
        .collect();
    rows.reverse();
    Ok(rows)
}

pub fn export_conversation(
    conn: &Connection,
    conversation_id: i64,
) -> Result<Option<ConversationExport>, rusqlite::Error> {
    let header: Option<(String, String)> = conn
        .query_row(
            "SELECT user_name, last_updated FROM conversations WHERE conversation_id = ?1",
            params![conversation_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((user_name, last_updated)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT role, content, created_at FROM messages
         WHERE conversation_id = ?1 ORDER BY message_id",
    )?;
    let messages: Vec<MessageRow> = stmt
        .query_map(params![conversation_id], |row| {
            Ok(MessageRow {
                role: row.get(0)?,
                content: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(Some(ConversationExport {
        conversation_id,
        user_name,
        last_updated,
        messages,
    }))
}

pub fn delete_conversation(
    conn: &Connection,
    conversation_id: i64,
) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "DELETE FROM conversations WHERE conversation_id = ?1",
        params![conversation_id],
    )?;
    Ok(n > 0)
}

/// Delete conversations idle since before `cutoff`. Messages cascade.
pub fn prune_conversations(
    conn: &Connection,
    cutoff: DateTime<Utc>,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM conversations WHERE last_updated < ?1",
        params![cutoff.to_rfc3339()],
    )
}

// ── Report summary cache ───────────────────────────────────────────

pub fn get_report_summary(
    conn: &Connection,
    report_date: &str,
    prompt_version: &str,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT summary FROM report_summaries
         WHERE report_date = ?1 AND prompt_version = ?2",
        params![report_date, prompt_version],
        |row| row.get(0),
    )
    .optional()
}

pub fn store_report_summary(
    conn: &Connection,
    report_date: &str,
    prompt_version: &str,
    summary: &str,
    now: DateTime<Utc>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO report_summaries
         (report_date, prompt_version, summary, generated_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![report_date, prompt_version, summary, now.to_rfc3339()],
    )?;
    Ok(())
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_config(conn: &Connection, key: &str) -> Result<(), rusqlite::Error> {
    conn.execute("DELETE FROM app_config WHERE key = ?1", params![key])?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_user_crud() {
        let db = Database::open_memory().await.unwrap();

        let id = db
            .writer()
            .call(|conn| {
                create_user(conn, "Alice", "alice@example.com", "salt$hash", Role::Admin, now())
            })
            .await
            .unwrap();

        let user = db
            .reader()
            .call(move |conn| get_user(conn, id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(user.role, Role::Admin);

        let by_email = db
            .reader()
            .call(|conn| find_user_by_email(conn, "alice@example.com"))
            .await
            .unwrap();
        assert!(by_email.is_some());

        let updated = db
            .writer()
            .call(move |conn| {
                update_user_profile(conn, id, Some("Alice B"), None, None)
            })
            .await
            .unwrap();
        assert!(updated);

        let user = db
            .reader()
            .call(move |conn| get_user(conn, id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.name, "Alice B");
        assert_eq!(user.email, "alice@example.com");

        let deleted = db
            .writer()
            .call(move |conn| delete_user(conn, id))
            .await
            .unwrap();
        assert!(deleted);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                create_user(conn, "A", "dup@example.com", "h", Role::Employee, now())?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        let result = db
            .writer()
            .call(|conn| create_user(conn, "B", "dup@example.com", "h", Role::Employee, now()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_task_crud_and_snapshots() {
        let db = Database::open_memory().await.unwrap();
        let due = now() + Duration::days(10);

        let (user_id, task_id) = db
            .writer()
            .call(move |conn| {
                let uid = create_user(conn, "Bob", "bob@example.com", "h", Role::Employee, now())?;
                let tid = insert_task(conn, "Ship report", Some("weekly"), Some(uid), due, now())?;
                Ok::<(i64, i64), rusqlite::Error>((uid, tid))
            })
            .await
            .unwrap();

        let task = db
            .reader()
            .call(move |conn| get_task(conn, task_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.assignee_name.as_deref(), Some("Bob"));
        assert_eq!(task.progress, 0);

        db.writer()
            .call(move |conn| {
                set_task_progress(conn, task_id, 50, TaskStatus::InProgress, None)?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let mine = db
            .reader()
            .call(move |conn| list_tasks(conn, Some(user_id)))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].status, TaskStatus::InProgress);

        let snapshots = db
            .reader()
            .call(|conn| task_snapshots(conn))
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].assignee.as_deref(), Some("Bob"));
        assert_eq!(snapshots[0].progress, 50);
        assert!(snapshots[0].due_at.is_some());

        let deleted = db
            .writer()
            .call(move |conn| delete_task(conn, task_id))
            .await
            .unwrap();
        assert!(deleted);
    }

    #[tokio::test]
    async fn test_deleting_user_unassigns_tasks() {
        let db = Database::open_memory().await.unwrap();
        let due = now() + Duration::days(5);

        let task_id = db
            .writer()
            .call(move |conn| {
                let uid = create_user(conn, "Eve", "eve@example.com", "h", Role::Employee, now())?;
                let tid = insert_task(conn, "Orphan me", None, Some(uid), due, now())?;
                delete_user(conn, uid)?;
                Ok::<i64, rusqlite::Error>(tid)
            })
            .await
            .unwrap();

        let task = db
            .reader()
            .call(move |conn| get_task(conn, task_id))
            .await
            .unwrap()
            .unwrap();
        assert!(task.assignee_id.is_none());

        // Snapshot groups under the sentinel via a missing name.
        let snapshots = db
            .reader()
            .call(|conn| task_snapshots(conn))
            .await
            .unwrap();
        assert!(snapshots[0].assignee.is_none());
    }

    #[tokio::test]
    async fn test_conversation_lifecycle() {
        let db = Database::open_memory().await.unwrap();

        let conv_id = db
            .writer()
            .call(|conn| {
                let id = create_conversation(conn, None, "Guest", now())?;
                append_message(conn, id, "user", "hello", now())?;
                append_message(conn, id, "assistant", "hi there", now() + Duration::seconds(1))?;
                Ok::<i64, rusqlite::Error>(id)
            })
            .await
            .unwrap();

        let found = db
            .reader()
            .call(|conn| find_conversation(conn, None))
            .await
            .unwrap();
        assert_eq!(found, Some(conv_id));

        let history = db
            .reader()
            .call(move |conn| recent_messages(conn, conv_id, 10))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ("user".to_string(), "hello".to_string()));
        assert_eq!(history[1].0, "assistant");

        let export = db
            .reader()
            .call(move |conn| export_conversation(conn, conv_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(export.messages.len(), 2);
        assert_eq!(export.user_name, "Guest");

        let deleted = db
            .writer()
            .call(move |conn| delete_conversation(conn, conv_id))
            .await
            .unwrap();
        assert!(deleted);

        // Messages cascade with the conversation.
        let export = db
            .reader()
            .call(move |conn| export_conversation(conn, conv_id))
            .await
            .unwrap();
        assert!(export.is_none());
    }

    #[tokio::test]
    async fn test_recent_messages_window() {
        let db = Database::open_memory().await.unwrap();

        let conv_id = db
            .writer()
            .call(|conn| {
                let id = create_conversation(conn, None, "Guest", now())?;
                for i in 0..15 {
                    append_message(conn, id, "user", &format!("msg {i}"), now())?;
                }
                Ok::<i64, rusqlite::Error>(id)
            })
            .await
            .unwrap();

        let history = db
            .reader()
            .call(move |conn| recent_messages(conn, conv_id, 10))
            .await
            .unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].1, "msg 5");
        assert_eq!(history[9].1, "msg 14");
    }

    #[tokio::test]
    async fn test_prune_conversations() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let old = create_conversation(conn, None, "Guest", now() - Duration::days(60))?;
                append_message(conn, old, "user", "stale", now() - Duration::days(60))?;
                let fresh = create_conversation(conn, None, "Guest", now())?;
                append_message(conn, fresh, "user", "recent", now())?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let pruned = db
            .writer()
            .call(|conn| prune_conversations(conn, now() - Duration::days(30)))
            .await
            .unwrap();
        assert_eq!(pruned, 1);

        let remaining: i64 = db
            .reader()
            .call(|conn| {
                Ok::<i64, rusqlite::Error>(conn.query_row(
                    "SELECT COUNT(*) FROM conversations",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn test_report_summary_cache() {
        let db = Database::open_memory().await.unwrap();

        let miss = db
            .reader()
            .call(|conn| get_report_summary(conn, "2025-06-01", "report-v1"))
            .await
            .unwrap();
        assert!(miss.is_none());

        db.writer()
            .call(|conn| {
                store_report_summary(conn, "2025-06-01", "report-v1", "all good", now())
            })
            .await
            .unwrap();

        let hit = db
            .reader()
            .call(|conn| get_report_summary(conn, "2025-06-01", "report-v1"))
            .await
            .unwrap();
        assert_eq!(hit.as_deref(), Some("all good"));

        // Different prompt version misses.
        let other = db
            .reader()
            .call(|conn| get_report_summary(conn, "2025-06-01", "report-v2"))
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "session_user_id", "7")?;
                set_config(conn, "llm_provider", "bedrock")?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let value = db
            .reader()
            .call(|conn| get_config(conn, "session_user_id"))
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("7"));

        let all = db.reader().call(|conn| list_config(conn)).await.unwrap();
        assert_eq!(all.len(), 2);

        db.writer()
            .call(|conn| delete_config(conn, "session_user_id"))
            .await
            .unwrap();
        let value = db
            .reader()
            .call(|conn| get_config(conn, "session_user_id"))
            .await
            .unwrap();
        assert!(value.is_none());
    }
}
