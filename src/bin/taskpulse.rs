use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};

use taskpulse::{Role, Summarizer, TaskPulse, TaskStatus};

#[derive(Parser)]
#[command(name = "taskpulse", about = "Team task tracker with efficiency reports")]
struct Cli {
    /// Database path (default: ~/.taskpulse/taskpulse.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and log in
    Register {
        name: String,
        email: String,
        password: String,
        /// Account role: admin or employee
        #[arg(long, default_value = "employee")]
        role: String,
    },
    /// Log in with email and password
    Login { email: String, password: String },
    /// Log out
    Logout,
    /// Show the logged-in user
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update your own profile
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Manage accounts (admin)
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Per-assignee efficiency report (admin)
    Report {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Skip the narrative summary
        #[arg(long)]
        no_summary: bool,
        /// Force summary regeneration (ignore cache)
        #[arg(long)]
        force: bool,
    },
    /// Chat with the task assistant
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show database status
    Status,
}

#[derive(Subcommand)]
enum UserAction {
    /// List accounts
    List {
        /// Filter by role: admin or employee
        #[arg(long)]
        role: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an account (its tasks become unassigned)
    Delete { user_id: i64 },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a task (admin)
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Assignee user id
        #[arg(long)]
        assignee: Option<i64>,
        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: String,
    },
    /// List tasks (admins see all, employees their own)
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a task's fields (admin)
    Update {
        task_id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: Option<String>,
        /// Assignee user id
        #[arg(long)]
        assignee: Option<i64>,
    },
    /// Set a task's status
    Status {
        task_id: i64,
        /// One of: Pending, "In Progress", Review, Completed
        status: String,
    },
    /// Set a task's progress (0-100); status follows
    Progress { task_id: i64, progress: u8 },
    /// Delete a task (admin)
    Delete { task_id: i64 },
}

#[derive(Subcommand)]
enum ChatAction {
    /// Send a message and print the reply
    Send { message: String },
    /// Export your conversation as JSON
    Export,
    /// Delete your conversation
    Clear,
    /// Delete conversations idle longer than N days (admin)
    Prune {
        #[arg(long, default_value = "30")]
        days: i64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

fn parse_due(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("invalid date: {s} (use YYYY-MM-DD or RFC 3339)"))?;
    Ok(Utc
        .from_utc_datetime(&date.and_hms_opt(23, 59, 59).unwrap_or_default()))
}

fn parse_role(s: &str) -> anyhow::Result<Role> {
    Role::parse(s).ok_or_else(|| anyhow::anyhow!("invalid role: {s} (use admin or employee)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => taskpulse::Database::open_at(path).await?,
        None => taskpulse::Database::open().await?,
    };
    let app = TaskPulse::new(db);
    let now = Utc::now();

    match cli.command {
        Commands::Register {
            name,
            email,
            password,
            role,
        } => {
            let role = parse_role(&role)?;
            let user = app.register(&name, &email, &password, role, now).await?;
            println!("Registered and logged in as {} ({})", user.name, user.email);
        }
        Commands::Login { email, password } => {
            let user = app.login(&email, &password).await?;
            println!("Logged in as {} [{}]", user.name, user.role.as_str());
        }
        Commands::Logout => {
            app.logout().await?;
            println!("Logged out.");
        }
        Commands::Whoami { json } => match app.current_user().await? {
            Some(user) if json => println!("{}", serde_json::to_string_pretty(&user)?),
            Some(user) => println!(
                "{} <{}> [{}] (id {})",
                user.name,
                user.email,
                user.role.as_str(),
                user.user_id
            ),
            None => println!("Not logged in."),
        },
        Commands::Profile {
            name,
            email,
            password,
        } => {
            let user = app
                .update_profile(name.as_deref(), email.as_deref(), password.as_deref())
                .await?;
            println!("Profile updated: {} <{}>", user.name, user.email);
        }
        Commands::User { action } => handle_user(&app, action).await?,
        Commands::Task { action } => handle_task(&app, action, now).await?,
        Commands::Report {
            json,
            no_summary,
            force,
        } => handle_report(&app, json, no_summary, force, now).await?,
        Commands::Chat { action } => handle_chat(&app, action, now).await?,
        Commands::Config { action } => handle_config(&app, action).await?,
        Commands::Status => print_status(&app).await?,
    }

    Ok(())
}

async fn handle_user(app: &TaskPulse, action: UserAction) -> anyhow::Result<()> {
    match action {
        UserAction::List { role, json } => {
            let role = role.as_deref().map(parse_role).transpose()?;
            let users = app.list_users(role).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&users)?);
            } else if users.is_empty() {
                println!("No accounts.");
            } else {
                for u in &users {
                    println!("{:>4}  {} <{}> [{}]", u.user_id, u.name, u.email, u.role.as_str());
                }
            }
        }
        UserAction::Delete { user_id } => {
            app.delete_user(user_id).await?;
            println!("Deleted user {user_id}.");
        }
    }
    Ok(())
}

async fn handle_task(
    app: &TaskPulse,
    action: TaskAction,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    match action {
        TaskAction::Add {
            title,
            description,
            assignee,
            due,
        } => {
            let due_at = parse_due(&due)?;
            let task = app
                .add_task(&title, description.as_deref(), assignee, due_at, now)
                .await?;
            println!("Created task {}: {}", task.task_id, task.title);
        }
        TaskAction::List { json } => {
            let tasks = app.list_tasks().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("No tasks.");
            } else {
                for t in &tasks {
                    print_task_line(t);
                }
                println!("\n{} tasks", tasks.len());
            }
        }
        TaskAction::Update {
            task_id,
            title,
            description,
            due,
            assignee,
        } => {
            let due_at = due.as_deref().map(parse_due).transpose()?;
            let task = app
                .update_task(
                    task_id,
                    title.as_deref(),
                    description.as_deref(),
                    due_at,
                    assignee,
                )
                .await?;
            print_task_line(&task);
        }
        TaskAction::Status { task_id, status } => {
            let status = TaskStatus::parse(&status)?;
            let task = app.set_task_status(task_id, status, now).await?;
            print_task_line(&task);
        }
        TaskAction::Progress { task_id, progress } => {
            let task = app.set_task_progress(task_id, progress, now).await?;
            print_task_line(&task);
        }
        TaskAction::Delete { task_id } => {
            app.delete_task(task_id).await?;
            println!("Deleted task {task_id}.");
        }
    }
    Ok(())
}

fn print_task_line(t: &taskpulse::TaskRow) {
    let assignee = t.assignee_name.as_deref().unwrap_or("unassigned");
    println!(
        "[{}] {} ({}) - {assignee} | {}% | due: {}",
        t.status, t.title, t.task_id, t.progress, t.due_at
    );
}

async fn handle_report(
    app: &TaskPulse,
    json: bool,
    no_summary: bool,
    force: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let rows = app.efficiency_report(now).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("No tasks to report.");
    } else {
        println!(
            "{:<20} {:>9} {:>11} {:>7} {:>10} {:>11}",
            "Assignee", "Completed", "In Progress", "Pending", "Avg Days", "Efficiency"
        );
        for r in &rows {
            println!(
                "{:<20} {:>9} {:>11} {:>7} {:>10.1} {:>10.1}%",
                r.name, r.completed, r.in_progress, r.pending, r.avg_time_days, r.avg_efficiency
            );
        }
    }

    if !no_summary {
        let summarizer = Summarizer::from_config(app.db()).await?;
        let summary = app.summarize_report(&summarizer, &rows, now, force).await?;
        println!("\n{summary}");
    }

    Ok(())
}

async fn handle_chat(
    app: &TaskPulse,
    action: ChatAction,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    match action {
        ChatAction::Send { message } => {
            let summarizer = Summarizer::from_config(app.db()).await?;
            let reply = app.chat(&summarizer, &message, now).await?;
            println!("{reply}");
        }
        ChatAction::Export => match app.export_chat().await? {
            Some(export) => println!("{}", serde_json::to_string_pretty(&export)?),
            None => println!("No conversation to export."),
        },
        ChatAction::Clear => {
            if app.clear_chat().await? {
                println!("Conversation deleted.");
            } else {
                println!("No conversation to delete.");
            }
        }
        ChatAction::Prune { days } => {
            let pruned = app.prune_chats(days, now).await?;
            println!("Pruned {pruned} conversations.");
        }
    }
    Ok(())
}

async fn handle_config(app: &TaskPulse, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match app.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            app.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = app.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(app: &TaskPulse) -> anyhow::Result<()> {
    let stats = app
        .db()
        .reader()
        .call(|conn| {
            let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            let tasks: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
            let completed: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE status = 'Completed'",
                [],
                |row| row.get(0),
            )?;
            let conversations: i64 =
                conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
            Ok::<_, rusqlite::Error>((users, tasks, completed, conversations))
        })
        .await?;

    let (users, tasks, completed, conversations) = stats;
    println!("TaskPulse Status");
    println!("  Users:         {users}");
    println!("  Tasks:         {tasks} ({completed} completed)");
    println!("  Conversations: {conversations}");
    match app.current_user().await? {
        Some(user) => println!("  Session:       {} [{}]", user.name, user.role.as_str()),
        None => println!("  Session:       none"),
    }
    Ok(())
}
