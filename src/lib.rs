pub mod auth;
pub mod date_util;
pub mod efficiency;
pub mod error;
pub mod llm;
pub mod storage;

pub use efficiency::{EfficiencyRow, TaskSnapshot, TaskStatus, UNASSIGNED};
pub use error::{Error, Result};
pub use llm::Summarizer;
pub use storage::Database;

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::{ConversationExport, Role, TaskRow, User};

use chrono::{DateTime, Duration, Utc};
use storage::repository;

const SESSION_KEY: &str = "session_user_id";

/// Main entry point for TaskPulse.
pub struct TaskPulse {
    db: Database,
}

impl TaskPulse {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Accounts and session ───────────────────────────────────────

    /// Create an account and log it in. Inputs are trimmed; the email is
    /// stored lowercased so logins are case-insensitive.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let name = name.trim().to_string();
        let email = email.trim().to_lowercase();
        if name.is_empty() {
            return Err(Error::Validation("name must not be empty".into()));
        }
        if !email.contains('@') {
            return Err(Error::Validation(format!("invalid email: {email}")));
        }
        if password.len() < 6 {
            return Err(Error::Validation(
                "password must be at least 6 characters".into(),
            ));
        }

        let password_hash = auth::hash_password(password);
        let user_id = self
            .db
            .writer()
            .call({
                let name = name.clone();
                let email = email.clone();
                move |conn| {
                    let existing =
                        repository::find_user_by_email(conn, &email).map_err(|e| e.to_string())?;
                    if existing.is_some() {
                        return Err(format!("email already registered: {email}"));
                    }
                    let id = repository::create_user(conn, &name, &email, &password_hash, role, now)
                        .map_err(|e| e.to_string())?;
                    repository::set_config(conn, SESSION_KEY, &id.to_string())
                        .map_err(|e| e.to_string())?;
                    Ok::<i64, String>(id)
                }
            })
            .await
            .map_err(|e| Error::Validation(e.to_string()))?;

        self.fetch_user(user_id).await
    }

    /// Verify credentials and store the session. A missing account and a
    /// wrong password report the same error.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let email = email.trim().to_lowercase();
        let user = self
            .db
            .reader()
            .call(move |conn| repository::find_user_by_email(conn, &email))
            .await?;

        let user = match user {
            Some(u) if auth::verify_password(password, &u.password_hash) => u,
            _ => return Err(Error::Auth("invalid email or password".into())),
        };

        let id = user.user_id;
        self.db
            .writer()
            .call(move |conn| repository::set_config(conn, SESSION_KEY, &id.to_string()))
            .await?;
        Ok(user)
    }

    pub async fn logout(&self) -> Result<()> {
        self.db
            .writer()
            .call(|conn| repository::delete_config(conn, SESSION_KEY))
            .await?;
        Ok(())
    }

    /// The logged-in user, re-read from the user store every time. A stale
    /// session pointing at a deleted account yields None.
    pub async fn current_user(&self) -> Result<Option<User>> {
        let session = self
            .db
            .reader()
            .call(|conn| repository::get_config(conn, SESSION_KEY))
            .await?;
        let Some(id) = session.and_then(|s| s.parse::<i64>().ok()) else {
            return Ok(None);
        };
        self.db
            .reader()
            .call(move |conn| repository::get_user(conn, id))
            .await
            .map_err(Into::into)
    }

    /// Update the logged-in user's own profile. Absent fields are left
    /// unchanged; the same validation as registration applies.
    pub async fn update_profile(
        &self,
        name: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<User> {
        let user = self.require_session().await?;

        let name = match name.map(str::trim) {
            Some("") => return Err(Error::Validation("name must not be empty".into())),
            other => other.map(|s| s.to_string()),
        };
        let email = match email.map(|e| e.trim().to_lowercase()) {
            Some(e) if !e.contains('@') => {
                return Err(Error::Validation(format!("invalid email: {e}")))
            }
            other => other,
        };
        let password_hash = match password {
            Some(p) if p.len() < 6 => {
                return Err(Error::Validation(
                    "password must be at least 6 characters".into(),
                ))
            }
            Some(p) => Some(auth::hash_password(p)),
            None => None,
        };

        let id = user.user_id;
        self.db
            .writer()
            .call(move |conn| {
                repository::update_user_profile(
                    conn,
                    id,
                    name.as_deref(),
                    email.as_deref(),
                    password_hash.as_deref(),
                )
            })
            .await?;
        self.fetch_user(id).await
    }

    pub async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        self.require_admin().await?;
        self.db
            .reader()
            .call(move |conn| repository::list_users(conn, role))
            .await
            .map_err(Into::into)
    }

    /// Delete an account. Tasks assigned to it become unassigned; an admin
    /// deleting their own account is also logged out.
    pub async fn delete_user(&self, user_id: i64) -> Result<()> {
        let admin = self.require_admin().await?;
        let deleted = self
            .db
            .writer()
            .call(move |conn| {
                let deleted = repository::delete_user(conn, user_id)?;
                if deleted && user_id == admin.user_id {
                    repository::delete_config(conn, SESSION_KEY)?;
                }
                Ok::<bool, rusqlite::Error>(deleted)
            })
            .await?;
        if !deleted {
            return Err(Error::NotFound(format!("no user with id {user_id}")));
        }
        Ok(())
    }

    // ── Tasks ──────────────────────────────────────────────────────

    pub async fn add_task(
        &self,
        title: &str,
        description: Option<&str>,
        assignee_id: Option<i64>,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<TaskRow> {
        self.require_admin().await?;
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Validation("title must not be empty".into()));
        }

        let description = description.map(|s| s.to_string());
        let task_id = self
            .db
            .writer()
            .call(move |conn| {
                if let Some(id) = assignee_id {
                    let assignee =
                        repository::get_user(conn, id).map_err(|e| e.to_string())?;
                    if assignee.is_none() {
                        return Err(format!("no user with id {id}"));
                    }
                }
                repository::insert_task(
                    conn,
                    &title,
                    description.as_deref(),
                    assignee_id,
                    due_at,
                    now,
                )
                .map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| Error::Validation(e.to_string()))?;

        self.fetch_task(task_id).await
    }

    /// Admins see every task; employees see their own.
    pub async fn list_tasks(&self) -> Result<Vec<TaskRow>> {
        let user = self.require_session().await?;
        let filter = match user.role {
            Role::Admin => None,
            Role::Employee => Some(user.user_id),
        };
        self.db
            .reader()
            .call(move |conn| repository::list_tasks(conn, filter))
            .await
            .map_err(Into::into)
    }

    pub async fn get_task(&self, task_id: i64) -> Result<TaskRow> {
        let user = self.require_session().await?;
        let task = self.fetch_task(task_id).await?;
        if user.role != Role::Admin && task.assignee_id != Some(user.user_id) {
            return Err(Error::Forbidden("not your task".into()));
        }
        Ok(task)
    }

    pub async fn update_task(
        &self,
        task_id: i64,
        title: Option<&str>,
        description: Option<&str>,
        due_at: Option<DateTime<Utc>>,
        assignee_id: Option<i64>,
    ) -> Result<TaskRow> {
        self.require_admin().await?;
        if let Some(t) = title {
            if t.trim().is_empty() {
                return Err(Error::Validation("title must not be empty".into()));
            }
        }
        let title = title.map(|s| s.trim().to_string());
        let description = description.map(|s| s.to_string());
        let updated = self
            .db
            .writer()
            .call(move |conn| {
                repository::update_task_fields(
                    conn,
                    task_id,
                    title.as_deref(),
                    description.as_deref(),
                    due_at,
                    assignee_id,
                )
            })
            .await?;
        if !updated {
            return Err(Error::NotFound(format!("no task with id {task_id}")));
        }
        self.fetch_task(task_id).await
    }

    /// Set a task's status directly. Entering Completed stamps the
    /// completion time; leaving it clears the stamp. Progress is untouched.
    pub async fn set_task_status(
        &self,
        task_id: i64,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<TaskRow> {
        let task = self.require_task_access(task_id).await?;
        let completed_at = match status {
            TaskStatus::Completed => task
                .completed_at
                .as_deref()
                .and_then(crate::date_util::parse_rfc3339)
                .or(Some(now)),
            _ => None,
        };
        self.db
            .writer()
            .call(move |conn| repository::set_task_status(conn, task_id, status, completed_at))
            .await?;
        self.fetch_task(task_id).await
    }

    /// Set progress and derive status from it: 100 completes the task and
    /// stamps the time, 1-99 moves it in progress, 0 resets it to pending.
    /// Leaving Completed always clears the completion time.
    pub async fn set_task_progress(
        &self,
        task_id: i64,
        progress: u8,
        now: DateTime<Utc>,
    ) -> Result<TaskRow> {
        if progress > 100 {
            return Err(Error::Validation(format!(
                "progress must be 0-100, got {progress}"
            )));
        }
        let task = self.require_task_access(task_id).await?;

        let (status, completed_at) = match progress {
            100 => {
                let stamp = task
                    .completed_at
                    .as_deref()
                    .and_then(crate::date_util::parse_rfc3339)
                    .or(Some(now));
                (TaskStatus::Completed, stamp)
            }
            1..=99 => (TaskStatus::InProgress, None),
            0 => (TaskStatus::Pending, None),
            _ => unreachable!(),
        };

        self.db
            .writer()
            .call(move |conn| {
                repository::set_task_progress(conn, task_id, progress, status, completed_at)
            })
            .await?;
        self.fetch_task(task_id).await
    }

    pub async fn delete_task(&self, task_id: i64) -> Result<()> {
        self.require_admin().await?;
        let deleted = self
            .db
            .writer()
            .call(move |conn| repository::delete_task(conn, task_id))
            .await?;
        if !deleted {
            return Err(Error::NotFound(format!("no task with id {task_id}")));
        }
        Ok(())
    }

    // ── Efficiency report ──────────────────────────────────────────

    /// Per-assignee efficiency rows, best first. Admin only.
    pub async fn efficiency_report(&self, now: DateTime<Utc>) -> Result<Vec<EfficiencyRow>> {
        self.require_admin().await?;
        let snapshots = self
            .db
            .reader()
            .call(|conn| repository::task_snapshots(conn))
            .await?;
        Ok(efficiency::aggregate(&snapshots, now))
    }

    /// Narrative summary to accompany the report rows.
    pub async fn summarize_report(
        &self,
        summarizer: &Summarizer,
        rows: &[EfficiencyRow],
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<String> {
        llm::agents::report::summarize_report(&self.db, summarizer, rows, now, force).await
    }

    // ── Chat ───────────────────────────────────────────────────────

    pub async fn chat(
        &self,
        summarizer: &Summarizer,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let user = self
            .current_user()
            .await?
            .map(|u| (u.user_id, u.name));
        llm::agents::chat::chat(&self.db, summarizer, user, message, now).await
    }

    /// Export the current user's (or guest) most recent conversation.
    pub async fn export_chat(&self) -> Result<Option<ConversationExport>> {
        let user_id = self.current_user().await?.map(|u| u.user_id);
        self.db
            .reader()
            .call(move |conn| {
                let Some(id) = repository::find_conversation(conn, user_id)? else {
                    return Ok(None);
                };
                repository::export_conversation(conn, id)
            })
            .await
            .map_err(Into::into)
    }

    /// Delete the current user's (or guest) most recent conversation.
    pub async fn clear_chat(&self) -> Result<bool> {
        let user_id = self.current_user().await?.map(|u| u.user_id);
        self.db
            .writer()
            .call(move |conn| {
                let Some(id) = repository::find_conversation(conn, user_id)? else {
                    return Ok(false);
                };
                repository::delete_conversation(conn, id)
            })
            .await
            .map_err(Into::into)
    }

    /// Delete conversations idle for more than `days` days.
    pub async fn prune_chats(&self, days: i64, now: DateTime<Utc>) -> Result<usize> {
        self.require_admin().await?;
        let cutoff = now - Duration::days(days);
        self.db
            .writer()
            .call(move |conn| repository::prune_conversations(conn, cutoff))
            .await
            .map_err(Into::into)
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Internal helpers ───────────────────────────────────────────

    async fn require_session(&self) -> Result<User> {
        self.current_user()
            .await?
            .ok_or_else(|| Error::Auth("not logged in".into()))
    }

    async fn require_admin(&self) -> Result<User> {
        let user = self.require_session().await?;
        if user.role != Role::Admin {
            return Err(Error::Forbidden("admin access required".into()));
        }
        Ok(user)
    }

    async fn require_task_access(&self, task_id: i64) -> Result<TaskRow> {
        let user = self.require_session().await?;
        let task = self.fetch_task(task_id).await?;
        if user.role != Role::Admin && task.assignee_id != Some(user.user_id) {
            return Err(Error::Forbidden("not your task".into()));
        }
        Ok(task)
    }

    async fn fetch_user(&self, user_id: i64) -> Result<User> {
        self.db
            .reader()
            .call(move |conn| repository::get_user(conn, user_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("no user with id {user_id}")))
    }

    async fn fetch_task(&self, task_id: i64) -> Result<TaskRow> {
        self.db
            .reader()
            .call(move |conn| repository::get_task(conn, task_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("no task with id {task_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    async fn app() -> TaskPulse {
        TaskPulse::new(Database::open_memory().await.unwrap())
    }

    async fn register_admin(app: &TaskPulse) -> User {
        app.register("Admin", "admin@example.com", "secret1", Role::Admin, now())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_login_logout() {
        let app = app().await;

        let user = register_admin(&app).await;
        assert_eq!(user.email, "admin@example.com");
        assert!(app.current_user().await.unwrap().is_some());

        app.logout().await.unwrap();
        assert!(app.current_user().await.unwrap().is_none());

        let user = app.login("Admin@Example.com", "secret1").await.unwrap();
        assert_eq!(user.user_id, 1);

        let err = app.login("admin@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        let err = app.login("nobody@example.com", "secret1").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let app = app().await;
        assert!(matches!(
            app.register("", "a@b.com", "secret1", Role::Employee, now()).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            app.register("A", "not-an-email", "secret1", Role::Employee, now()).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            app.register("A", "a@b.com", "short", Role::Employee, now()).await,
            Err(Error::Validation(_))
        ));

        register_admin(&app).await;
        let err = app
            .register("Dup", "admin@example.com", "secret1", Role::Employee, now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_stale_session_yields_no_user() {
        let app = app().await;
        let user = register_admin(&app).await;
        app.delete_user(user.user_id).await.unwrap();
        assert!(app.current_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_update_reflected_immediately() {
        let app = app().await;
        register_admin(&app).await;

        let updated = app
            .update_profile(Some("New Name"), None, Some("newsecret"))
            .await
            .unwrap();
        assert_eq!(updated.name, "New Name");

        app.logout().await.unwrap();
        assert!(app.login("admin@example.com", "secret1").await.is_err());
        app.login("admin@example.com", "newsecret").await.unwrap();
        let current = app.current_user().await.unwrap().unwrap();
        assert_eq!(current.name, "New Name");
    }

    #[tokio::test]
    async fn test_employee_cannot_manage_tasks() {
        let app = app().await;
        app.register("Emp", "emp@example.com", "secret1", Role::Employee, now())
            .await
            .unwrap();

        let err = app
            .add_task("T", None, None, now() + Duration::days(1), now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let err = app.efficiency_report(now()).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let err = app.list_users(None).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_employee_sees_only_own_tasks() {
        let app = app().await;
        let admin = register_admin(&app).await;
        app.logout().await.unwrap();
        let emp = app
            .register("Emp", "emp@example.com", "secret1", Role::Employee, now())
            .await
            .unwrap();

        app.login("admin@example.com", "secret1").await.unwrap();
        app.add_task("Mine", None, Some(emp.user_id), now() + Duration::days(1), now())
            .await
            .unwrap();
        app.add_task("Admins", None, Some(admin.user_id), now() + Duration::days(1), now())
            .await
            .unwrap();
        assert_eq!(app.list_tasks().await.unwrap().len(), 2);

        app.login("emp@example.com", "secret1").await.unwrap();
        let tasks = app.list_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Mine");

        let admins_task_id = 2;
        let err = app
            .set_task_progress(admins_task_id, 50, now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_progress_drives_status_transitions() {
        let app = app().await;
        register_admin(&app).await;
        let task = app
            .add_task("T", None, None, now() + Duration::days(5), now())
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        let task = app.set_task_progress(task.task_id, 40, now()).await.unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.completed_at.is_none());

        let task = app.set_task_progress(task.task_id, 100, now()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());

        // Dropping back below 100 clears the completion stamp.
        let task = app.set_task_progress(task.task_id, 60, now()).await.unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.completed_at.is_none());

        let task = app.set_task_progress(task.task_id, 0, now()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        let err = app
            .set_task_progress(task.task_id, 101, now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_completing_twice_keeps_first_stamp() {
        let app = app().await;
        register_admin(&app).await;
        let task = app
            .add_task("T", None, None, now() + Duration::days(5), now())
            .await
            .unwrap();

        let first = app
            .set_task_status(task.task_id, TaskStatus::Completed, now())
            .await
            .unwrap();
        let second = app
            .set_task_status(task.task_id, TaskStatus::Completed, now() + Duration::hours(4))
            .await
            .unwrap();
        assert_eq!(first.completed_at, second.completed_at);

        let reopened = app
            .set_task_status(task.task_id, TaskStatus::Review, now() + Duration::hours(5))
            .await
            .unwrap();
        assert!(reopened.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_efficiency_report_end_to_end() {
        let app = app().await;
        register_admin(&app).await;
        app.logout().await.unwrap();
        let alice = app
            .register("Alice", "alice@example.com", "secret1", Role::Employee, now())
            .await
            .unwrap();
        app.login("admin@example.com", "secret1").await.unwrap();

        // Completed on time and an unassigned task pending before its due date.
        let t1 = app
            .add_task("Done", None, Some(alice.user_id), now() + Duration::days(1), now())
            .await
            .unwrap();
        app.set_task_progress(t1.task_id, 100, now()).await.unwrap();
        app.add_task("Backlog", None, None, now() + Duration::days(3), now())
            .await
            .unwrap();

        let rows = app.efficiency_report(now()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Alice");
        assert_eq!(rows[0].avg_efficiency, 100.0);
        assert_eq!(rows[1].name, UNASSIGNED);
        assert_eq!(rows[1].avg_efficiency, 10.0);
    }

    #[tokio::test]
    async fn test_chat_export_and_clear() {
        let app = app().await;
        register_admin(&app).await;

        app.chat(&Summarizer::Local, "hello", now()).await.unwrap();

        let export = app.export_chat().await.unwrap().unwrap();
        assert_eq!(export.messages.len(), 2);
        assert_eq!(export.user_name, "Admin");

        assert!(app.clear_chat().await.unwrap());
        assert!(app.export_chat().await.unwrap().is_none());
        assert!(!app.clear_chat().await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_chats_is_admin_only() {
        let app = app().await;
        app.register("Emp", "emp@example.com", "secret1", Role::Employee, now())
            .await
            .unwrap();
        let err = app.prune_chats(30, now()).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }
}
