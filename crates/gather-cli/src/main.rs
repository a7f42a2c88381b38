//! Gather CLI - organize social events from the command line
//!
//! Offline-first: events are saved locally, mutations are queued, and
//! `gather sync` replays the queue against the remote API when one is
//! configured.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use gather_core::api::{
    ApiClient, ApiError, HttpTransport, ReqwestTransport, SessionIdentity, TokenStore,
};
use gather_core::kv::open_kv_store;
use gather_core::models::PendingOp;
use gather_core::store::EventStore;
use gather_core::sync::SyncQueue;
use gather_core::util::normalize_text_option;
use gather_core::{Event, EventFilter, EventId};
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "gather")]
#[command(about = "Organize social events from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Optional path to the local data file
    #[arg(long, value_name = "PATH")]
    data_path: Option<PathBuf>,

    /// Quick capture: gather "Pizza night" (starts now)
    #[arg(trailing_var_arg = true)]
    event: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new event
    #[command(alias = "new")]
    Add {
        /// Event title
        title: Vec<String>,
        /// Start time (RFC 3339 or "YYYY-MM-DD HH:MM", UTC); defaults to now
        #[arg(long, value_name = "WHEN")]
        at: Option<String>,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
        /// Optional place name
        #[arg(long, value_name = "NAME")]
        location: Option<String>,
        /// Maximum number of attendees (0 = unlimited)
        #[arg(long, default_value = "0")]
        capacity: u32,
    },
    /// List stored events
    List {
        /// Which events to show
        #[arg(long, value_enum, default_value_t = FilterMode::Upcoming)]
        filter: FilterMode,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one event by id or invitation code
    Show {
        /// Event ID or invitation code
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an event
    Delete {
        /// Event ID or invitation code
        id: String,
    },
    /// Join an event as an attendee
    Join {
        /// Event ID or invitation code
        id: String,
    },
    /// Leave an event you joined
    Leave {
        /// Event ID or invitation code
        id: String,
    },
    /// List who joined an event (requires a configured remote)
    Attendees {
        /// Event ID or invitation code
        id: String,
    },
    /// Replay queued offline mutations and pull the remote event list
    Sync,
    /// Authenticate against the remote API
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Login with email/password and store the session locally
    Login {
        /// Account email
        #[arg(long, value_name = "EMAIL")]
        email: String,
        /// Account password
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show the stored session
    Status,
    /// Clear the stored session
    Logout,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum FilterMode {
    All,
    Upcoming,
    Past,
    Today,
}

impl From<FilterMode> for EventFilter {
    fn from(mode: FilterMode) -> Self {
        match mode {
            FilterMode::All => Self::All,
            FilterMode::Upcoming => Self::Upcoming,
            FilterMode::Past => Self::Past,
            FilterMode::Today => Self::Today,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] gather_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("No event title provided")]
    EmptyTitle,
    #[error("Unrecognized start time: {0} (expected RFC 3339 or \"YYYY-MM-DD HH:MM\")")]
    InvalidStartTime(String),
    #[error("Event not found for id/code: {0}")]
    EventNotFound(String),
    #[error("Sync is not configured. Set GATHER_API_URL to enable `gather sync` and `gather auth`.")]
    SyncNotConfigured,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gather=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let data_path = resolve_data_path(cli.data_path);

    match cli.command {
        Some(Commands::Add {
            title,
            at,
            description,
            location,
            capacity,
        }) => {
            let draft = EventDraft {
                at,
                description,
                location,
                capacity,
            };
            run_add(&title, draft, &data_path).await?;
        }
        Some(Commands::List { filter, json }) => run_list(filter, json, &data_path)?,
        Some(Commands::Show { id, json }) => run_show(&id, json, &data_path)?,
        Some(Commands::Delete { id }) => run_delete(&id, &data_path).await?,
        Some(Commands::Join { id }) => run_join(&id, &data_path).await?,
        Some(Commands::Leave { id }) => run_leave(&id, &data_path).await?,
        Some(Commands::Attendees { id }) => run_attendees(&id, &data_path).await?,
        Some(Commands::Sync) => run_sync(&data_path).await?,
        Some(Commands::Auth { command }) => run_auth(command, &data_path).await?,
        None => {
            // Quick capture mode: gather "Pizza night"
            if cli.event.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&cli.event, EventDraft::default(), &data_path).await?;
            }
        }
    }

    Ok(())
}

struct AppContext {
    store: EventStore,
    queue: SyncQueue,
    tokens: TokenStore,
}

fn open_context(data_path: &Path) -> AppContext {
    if let Some(parent) = data_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let kv = open_kv_store(data_path);
    let tokens = TokenStore::new(Arc::clone(&kv));
    let store = EventStore::new(Arc::clone(&kv))
        .with_identity(Arc::new(SessionIdentity::new(tokens.clone())));
    let queue = SyncQueue::new(kv);
    AppContext {
        store,
        queue,
        tokens,
    }
}

#[derive(Default)]
struct EventDraft {
    at: Option<String>,
    description: Option<String>,
    location: Option<String>,
    capacity: u32,
}

async fn run_add(
    title_parts: &[String],
    draft: EventDraft,
    data_path: &Path,
) -> Result<(), CliError> {
    let title =
        normalize_text_option(Some(title_parts.join(" "))).ok_or(CliError::EmptyTitle)?;
    let starts_at = match draft.at.as_deref() {
        Some(raw) => parse_start_time(raw)?,
        None => Utc::now().timestamp_millis(),
    };

    let mut event = Event::new(title, starts_at);
    if let Some(description) = normalize_text_option(draft.description) {
        event.description = description;
    }
    if let Some(name) = normalize_text_option(draft.location) {
        event.location.name = name;
    }
    event.capacity = draft.capacity;

    let context = open_context(data_path);
    let saved = context.store.save(event)?;
    let op = PendingOp::CreateEvent {
        event: saved.clone(),
    };
    if let Dispatch::Applied(Some(remote)) = dispatch_or_queue(&context, op).await? {
        // Remote wins on read; keep the server's copy of what we created
        context.store.merge_remote(std::slice::from_ref(&remote))?;
    }

    println!("{}  code {}", saved.id, saved.invitation_code);
    Ok(())
}

#[derive(Debug, Serialize)]
struct EventListItem {
    id: String,
    title: String,
    starts_at: i64,
    when: String,
    location: String,
    invitation_code: String,
    organizer: Option<String>,
}

fn run_list(filter: FilterMode, as_json: bool, data_path: &Path) -> Result<(), CliError> {
    let context = open_context(data_path);
    let mut events = context.store.filtered(filter.into())?;
    events.sort_by_key(|event| event.starts_at);

    if as_json {
        let items = events
            .iter()
            .map(event_to_list_item)
            .collect::<Vec<EventListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if events.is_empty() {
        println!("No events");
    } else {
        for line in format_event_lines(&events) {
            println!("{line}");
        }
    }

    Ok(())
}

fn run_show(id: &str, as_json: bool, data_path: &Path) -> Result<(), CliError> {
    let context = open_context(data_path);
    let event = resolve_event(&context.store, id)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&event)?);
    } else {
        println!("{}", format_event_details(&event));
    }
    Ok(())
}

async fn run_delete(id: &str, data_path: &Path) -> Result<(), CliError> {
    let context = open_context(data_path);
    let event = resolve_event(&context.store, id)?;

    context.store.delete(&event.id)?;
    dispatch_or_queue(&context, PendingOp::DeleteEvent { id: event.id }).await?;
    println!("{}", event.id);
    Ok(())
}

async fn run_join(id: &str, data_path: &Path) -> Result<(), CliError> {
    let context = open_context(data_path);
    let event = resolve_event(&context.store, id)?;

    match dispatch_or_queue(&context, PendingOp::JoinEvent { id: event.id }).await? {
        Dispatch::Applied(_) => println!("Joined {}", event.title),
        Dispatch::Queued => println!("Join queued for {}", event.title),
    }
    Ok(())
}

async fn run_leave(id: &str, data_path: &Path) -> Result<(), CliError> {
    let context = open_context(data_path);
    let event = resolve_event(&context.store, id)?;

    match dispatch_or_queue(&context, PendingOp::LeaveEvent { id: event.id }).await? {
        Dispatch::Applied(_) => println!("Left {}", event.title),
        Dispatch::Queued => println!("Leave queued for {}", event.title),
    }
    Ok(())
}

async fn run_attendees(id: &str, data_path: &Path) -> Result<(), CliError> {
    let context = open_context(data_path);
    let event = resolve_event(&context.store, id)?;
    let api = open_api_client(&context)?;

    let attendees = api.participants(&event.id).await?;
    if attendees.is_empty() {
        println!("Nobody has joined {} yet", event.title);
    } else {
        for user in attendees {
            println!("{}", user.email.as_deref().unwrap_or(&user.id));
        }
    }
    Ok(())
}

async fn run_sync(data_path: &Path) -> Result<(), CliError> {
    let context = open_context(data_path);
    let api = open_api_client(&context)?;

    let report = context.queue.drain(&api).await?;
    if report.aborted_offline {
        println!(
            "Offline; replayed {} items, {} still queued",
            report.replayed,
            context.queue.len()?
        );
        return Ok(());
    }

    // Remote wins on read: pull the server's list and overwrite local copies
    let remote = api.list_events().await?;
    let pulled = context.store.merge_remote(&remote)?;

    println!(
        "Replayed {}, kept {}, dropped {}; pulled {pulled} events",
        report.replayed, report.kept, report.dropped
    );
    Ok(())
}

async fn run_auth(command: AuthCommands, data_path: &Path) -> Result<(), CliError> {
    let context = open_context(data_path);

    match command {
        AuthCommands::Login { email, password } => {
            let api = open_api_client(&context)?;
            let user = api.login(&email, &password).await?;
            println!("Logged in as {}", user.email.as_deref().unwrap_or(&user.id));
        }
        AuthCommands::Status => match context.tokens.current_user()? {
            Some(user) => println!(
                "Logged in as {} ({})",
                user.email.as_deref().unwrap_or("unknown"),
                user.id
            ),
            None => println!("Not logged in"),
        },
        AuthCommands::Logout => {
            match open_api_client(&context) {
                Ok(api) => {
                    // Best-effort remote revocation; tokens are cleared either way
                    if let Err(error) = api.logout().await {
                        tracing::warn!("Remote logout failed: {error}");
                    }
                }
                Err(_) => context.tokens.clear()?,
            }
            println!("Logged out");
        }
    }
    Ok(())
}

fn open_api_client(context: &AppContext) -> Result<ApiClient<ReqwestTransport>, CliError> {
    let base_url = env::var("GATHER_API_URL").map_err(|_| CliError::SyncNotConfigured)?;
    let transport = ReqwestTransport::new()
        .map_err(|error| CliError::Api(ApiError::Network(error.to_string())))?;
    Ok(ApiClient::new(&base_url, transport, context.tokens.clone())?)
}

/// Outcome of sending a mutation to the remote API
#[derive(Debug)]
enum Dispatch {
    /// The remote accepted it; creates and updates echo the stored event
    Applied(Option<Event>),
    /// No remote reachable; queued for the next `gather sync`
    Queued,
}

async fn dispatch_or_queue(context: &AppContext, op: PendingOp) -> Result<Dispatch, CliError> {
    match open_api_client(context) {
        Ok(api) => dispatch(&api, &context.queue, op).await,
        // No remote configured: stay local and queue for later
        Err(_) => {
            context.queue.enqueue(op)?;
            Ok(Dispatch::Queued)
        }
    }
}

/// Write the mutation through when the remote answers; queue it only on
/// a connectivity failure. HTTP rejections surface to the caller.
async fn dispatch<T: HttpTransport>(
    api: &ApiClient<T>,
    queue: &SyncQueue,
    op: PendingOp,
) -> Result<Dispatch, CliError> {
    let attempt = match &op {
        PendingOp::CreateEvent { event } => api.create_event(event).await.map(Some),
        PendingOp::UpdateEvent { event } => api.update_event(event).await.map(Some),
        PendingOp::DeleteEvent { id } => api.delete_event(id).await.map(|()| None),
        PendingOp::JoinEvent { id } => api.join_event(id).await.map(|()| None),
        PendingOp::LeaveEvent { id } => api.leave_event(id).await.map(|()| None),
    };
    match attempt {
        Ok(remote) => Ok(Dispatch::Applied(remote)),
        Err(ApiError::Network(reason)) => {
            tracing::debug!("Remote unreachable, queueing mutation: {reason}");
            queue.enqueue(op)?;
            Ok(Dispatch::Queued)
        }
        Err(error) => Err(error.into()),
    }
}

fn resolve_event(store: &EventStore, query: &str) -> Result<Event, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(CliError::EventNotFound(query.to_string()));
    }

    if let Ok(id) = trimmed.parse::<EventId>() {
        if let Some(event) = store.get(&id)? {
            return Ok(event);
        }
    }

    // Fall back to invitation code lookup, case-insensitively
    let code = trimmed.to_ascii_uppercase();
    if let Some(event) = store.find_by_code(&code)? {
        return Ok(event);
    }

    Err(CliError::EventNotFound(trimmed.to_string()))
}

fn format_event_lines(events: &[Event]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    events
        .iter()
        .map(|event| {
            let id = event.id.to_string();
            let short_id = id.chars().take(8).collect::<String>();
            let title = title_preview(event, 32);
            let when = format_relative_time(event.starts_at, now_ms);
            format!(
                "{short_id:<8}  {title:<32}  {when:<12}  {}",
                event.invitation_code
            )
        })
        .collect()
}

fn event_to_list_item(event: &Event) -> EventListItem {
    let now_ms = Utc::now().timestamp_millis();
    EventListItem {
        id: event.id.to_string(),
        title: event.title.clone(),
        starts_at: event.starts_at,
        when: format_relative_time(event.starts_at, now_ms),
        location: event.location.name.clone(),
        invitation_code: event.invitation_code.clone(),
        organizer: event.organizer.clone(),
    }
}

fn format_event_details(event: &Event) -> String {
    let mut lines = vec![
        event.title.clone(),
        format!("  id         {}", event.id),
        format!("  code       {}", event.invitation_code),
        format!("  starts     {}", format_timestamp(event.starts_at)),
    ];
    if let Some(ends_at) = event.ends_at {
        lines.push(format!("  ends       {}", format_timestamp(ends_at)));
    }
    if !event.location.name.is_empty() {
        lines.push(format!("  where      {}", event.location.name));
    }
    if event.capacity > 0 {
        lines.push(format!("  capacity   {}", event.capacity));
    }
    if let Some(organizer) = &event.organizer {
        lines.push(format!("  organizer  {organizer}"));
    }
    if !event.description.is_empty() {
        lines.push(format!("  {}", event.description));
    }
    lines.join("\n")
}

fn title_preview(event: &Event, max_chars: usize) -> String {
    let collapsed = event.title.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |instant| instant.format("%Y-%m-%d %H:%M UTC").to_string(),
    )
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = timestamp_ms - now_ms;
    let (magnitude, past) = if diff >= 0 { (diff, false) } else { (-diff, true) };
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    let rendered = if magnitude < minute {
        return "now".to_string();
    } else if magnitude < hour {
        format!("{}m", magnitude / minute)
    } else if magnitude < day {
        format!("{}h", magnitude / hour)
    } else if magnitude < week {
        format!("{}d", magnitude / day)
    } else if magnitude < month {
        format!("{}w", magnitude / week)
    } else if magnitude < year {
        format!("{}mo", magnitude / month)
    } else {
        format!("{}y", magnitude / year)
    };

    if past {
        format!("{rendered} ago")
    } else {
        format!("in {rendered}")
    }
}

fn parse_start_time(raw: &str) -> Result<i64, CliError> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed.and_utc().timestamp_millis());
        }
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(start_of_day) = parsed.and_hms_opt(0, 0, 0) {
            return Ok(start_of_day.and_utc().timestamp_millis());
        }
    }
    Err(CliError::InvalidStartTime(trimmed.to_string()))
}

fn resolve_data_path(cli_data_path: Option<PathBuf>) -> PathBuf {
    cli_data_path
        .or_else(|| env::var_os("GATHER_DATA_PATH").map(PathBuf::from))
        .unwrap_or_else(default_data_path)
}

fn default_data_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gather")
        .join("gather.db")
}
