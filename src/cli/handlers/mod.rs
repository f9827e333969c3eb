mod init;
pub use init::cmd_init;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::io::history_io;
use crate::io::lock::{DEFAULT_WAIT as LOCK_WAIT, ProjectLock};
use crate::io::project_io::{self, ProjectPaths};
use crate::model::config::CanopyConfig;
use crate::model::task::{ROOT_PARENT, Task, TaskPatch};
use crate::ops::task_ops::{MutationEngine, NewTask};
use crate::ops::undo::HistoryManager;
use crate::store::{JsonFileStore, TaskStore};
use crate::util::dates::{parse_local_date, resolve_due_input, today_local};
use crate::util::text::parse_text_and_tags;
use crate::view::{SectionFilter, StatusFilter, ViewQuery, build_view};

type CmdResult = Result<(), Box<dyn Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// The directory to start project discovery from: `-C` or the cwd
pub fn start_dir(project_dir: Option<&str>) -> Result<PathBuf, Box<dyn Error>> {
    match project_dir {
        Some(dir) => Ok(std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?),
        None => Ok(std::env::current_dir()?),
    }
}

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let start = start_dir(cli.project_dir.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli.command, start, json))
}

async fn run(command: Commands, start: PathBuf, json: bool) -> CmdResult {
    let write = !matches!(
        command,
        Commands::List(_) | Commands::Tags | Commands::History | Commands::Config(_)
    );
    let session = Session::open(&start, write, json)?;
    let result = execute(&session, command).await;

    // Saved on failure too: a partly applied undo has already left both stacks.
    if write && let Err(e) = session.save_history() {
        if result.is_ok() {
            return Err(e);
        }
        tracing::warn!(error = %e, "could not save history");
    }
    result
}

async fn execute(session: &Session, command: Commands) -> CmdResult {
    let json = session.json;
    match command {
        // Init is handled in main.rs before project discovery
        Commands::Init => cmd_init(&session.paths.root, json)?,

        // Read commands
        Commands::List(args) => cmd_list(session, args).await?,
        Commands::Tags => cmd_tags(session).await?,
        Commands::History => cmd_history(session)?,
        Commands::Config(args) => cmd_config(session, args)?,

        // Write commands
        Commands::Add(args) => cmd_add(session, args).await?,
        Commands::Edit(args) => cmd_edit(session, args).await?,
        Commands::Done(args) => cmd_set_completed(session, args, true).await?,
        Commands::Undone(args) => cmd_set_completed(session, args, false).await?,
        Commands::Focus(args) => cmd_set_focused(session, args, true).await?,
        Commands::Unfocus(args) => cmd_set_focused(session, args, false).await?,
        Commands::Due(args) => cmd_due(session, args).await?,
        Commands::Tag(args) => cmd_tag(session, args).await?,
        Commands::Rm(args) => cmd_rm(session, args).await?,
        Commands::Mv(args) => cmd_mv(session, args).await?,
        Commands::MvSection(args) => cmd_mv_section(session, args).await?,
        Commands::MvFocus(args) => cmd_mv_focus(session, args).await?,
        Commands::Undo => cmd_undo(session, false).await?,
        Commands::Redo => cmd_undo(session, true).await?,
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Everything a command needs: the project files, the store, and the
/// engine with its history reloaded from disk.
struct Session {
    paths: ProjectPaths,
    config: CanopyConfig,
    engine: MutationEngine,
    json: bool,
    _lock: Option<ProjectLock>,
}

impl Session {
    fn open(start: &std::path::Path, write: bool, json: bool) -> Result<Self, Box<dyn Error>> {
        let paths = project_io::discover_project(start)?;
        let lock = if write {
            Some(ProjectLock::acquire(&paths, LOCK_WAIT)?)
        } else {
            None
        };
        let (config, _doc) = config_io::read_config(&paths)?;
        let store = JsonFileStore::open(&paths.tasks())?;
        let snapshot = history_io::load_history(&paths)?;
        let history = HistoryManager::from_snapshot(snapshot, config.history.effective_limit());
        tracing::debug!(root = %paths.root.display(), write, "opened project");

        let store: Arc<dyn TaskStore> = Arc::new(store);
        Ok(Session {
            paths,
            config,
            engine: MutationEngine::new(store, Arc::new(history)),
            json,
            _lock: lock,
        })
    }

    fn save_history(&self) -> Result<(), Box<dyn Error>> {
        history_io::save_history(&self.paths, self.engine.history().snapshot())?;
        Ok(())
    }

    /// Find a task by exact id, then by unique prefix, then by unique
    /// suffix (the short id shown in listings). Case-insensitive.
    async fn resolve(&self, raw: &str) -> Result<Task, Box<dyn Error>> {
        let tasks = self.engine.list_tasks().await?;
        resolve_task(tasks, raw)
    }

    fn today(&self) -> NaiveDate {
        today_local()
    }

    /// Print the outcome of a single-task mutation
    fn report(&self, changed: bool, task: Option<&Task>) -> CmdResult {
        if self.json {
            let out = MutationJson {
                changed,
                task,
                history: self.engine.history().status(),
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else if let Some(task) = task {
            println!("{}", format_task_line(task, self.today()));
        } else if !changed {
            println!("no change");
        }
        Ok(())
    }
}

fn resolve_task(tasks: Vec<Task>, raw: &str) -> Result<Task, Box<dyn Error>> {
    let needle = raw.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return Err("task id cannot be empty".into());
    }
    let lower = |t: &Task| t.id.to_ascii_lowercase();
    if let Some(task) = tasks.iter().find(|t| lower(t) == needle) {
        return Ok(task.clone());
    }
    let matchers: [fn(&str, &str) -> bool; 2] = [
        |id, n| id.starts_with(n),
        |id, n| id.ends_with(n),
    ];
    for matcher in matchers {
        let hits: Vec<&Task> = tasks.iter().filter(|t| matcher(&lower(t), &needle)).collect();
        match hits.as_slice() {
            [one] => return Ok((*one).clone()),
            [] => continue,
            _ => return Err(format!("ambiguous task id '{}' ({} matches)", raw, hits.len()).into()),
        }
    }
    Err(format!("task not found: {}", raw).into())
}

fn parse_due(raw: &str, today: NaiveDate) -> Result<Option<String>, Box<dyn Error>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" | "clear" | "" => Ok(None),
        _ => resolve_due_input(raw, today)
            .map(Some)
            .ok_or_else(|| format!("invalid date '{}' (expected YYYY-MM-DD, today, tomorrow, yesterday or +N)", raw).into()),
    }
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

async fn cmd_list(session: &Session, args: ListArgs) -> CmdResult {
    let view_config = &session.config.view;
    let section = match args.section.as_deref().or(view_config.default_section.as_deref()) {
        Some(s) => s.parse::<SectionFilter>()?,
        None => SectionFilter::All,
    };
    let status = match args.status.as_deref().or(view_config.default_status.as_deref()) {
        Some(s) => s.parse::<StatusFilter>()?,
        None => StatusFilter::All,
    };
    let today = match args.today.as_deref() {
        Some(raw) => parse_local_date(raw).ok_or_else(|| format!("invalid date '{}'", raw))?,
        None => session.today(),
    };

    // Roots of undated trees keep input order, so hand them over by sibling order
    let mut tasks = session.engine.list_tasks().await?;
    tasks.sort_by_key(|t| (t.order, t.created_at));
    let query = ViewQuery {
        section,
        status,
        search: args.search,
    };
    let view = build_view(&tasks, &query, today);

    if session.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        for line in format_view(&view, today, session.config.display.width) {
            println!("{}", line);
        }
    }
    Ok(())
}

async fn cmd_tags(session: &Session) -> CmdResult {
    let tags = session.engine.get_all_tags().await;
    if session.json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
    } else {
        for tag in tags {
            println!("#{}", tag);
        }
    }
    Ok(())
}

fn cmd_history(session: &Session) -> CmdResult {
    let snapshot = session.engine.history().snapshot();
    if session.json {
        println!("{}", serde_json::to_string_pretty(&history_to_json(&snapshot))?);
    } else {
        for line in format_history(&snapshot) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_config(session: &Session, args: ConfigArgs) -> CmdResult {
    match (args.key, args.value) {
        (None, _) => {
            if session.json {
                println!("{}", serde_json::to_string_pretty(&session.config)?);
            } else {
                print!("{}", toml::to_string(&session.config)?);
            }
        }
        (Some(key), None) => {
            if !config_io::CONFIG_KEYS.contains(&key.as_str()) {
                return Err(project_io::ProjectError::UnknownConfigKey(key).into());
            }
            let value = toml::Value::try_from(&session.config)?;
            let found = key
                .split('.')
                .try_fold(&value, |v, part| v.get(part));
            match found {
                Some(toml::Value::String(s)) => println!("{}", s),
                Some(v) => println!("{}", v),
                None => println!("(unset)"),
            }
        }
        (Some(key), Some(value)) => {
            let _lock = ProjectLock::acquire(&session.paths, LOCK_WAIT)?;
            let (_config, mut doc) = config_io::read_config(&session.paths)?;
            config_io::set_value(&mut doc, &key, &value)?;
            config_io::write_config(&session.paths, &doc)?;
            tracing::info!(key = %key, value = %value, "config updated");
            if !session.json {
                println!("{} = {}", key, value);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

async fn cmd_add(session: &Session, args: AddArgs) -> CmdResult {
    let (text, mut tags) = parse_text_and_tags(&args.text);
    for tag in args.tags {
        let tag = tag.trim_start_matches('#').to_string();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    let mut new = NewTask::new(text).tags(tags);
    let parent = match &args.parent {
        Some(raw) => Some(session.resolve(raw).await?.id),
        None => None,
    };
    if let Some(raw) = &args.after {
        let sibling = session.resolve(raw).await?;
        if let Some(parent) = &parent
            && *parent != sibling.parent_id
        {
            return Err(format!("--after task {} is not a child of --parent {}", sibling.id, parent).into());
        }
        new = new.after(sibling.order);
        if !sibling.is_top_level() {
            new = new.under(sibling.parent_id);
        }
    }
    if let Some(parent) = parent {
        new = new.under(parent);
    }
    if let Some(raw) = &args.due
        && let Some(date) = parse_due(raw, session.today())?
    {
        new = new.due(date);
    }
    if let Some(note) = args.note {
        new = new.notes(note);
    }

    let task = session.engine.add_task(new).await?;
    if session.json {
        session.report(true, Some(&task))?;
    } else {
        println!("{}", task.id);
    }
    Ok(())
}

async fn cmd_edit(session: &Session, args: EditArgs) -> CmdResult {
    let task = session.resolve(&args.id).await?;
    let patch = TaskPatch {
        text: args.text,
        notes: if args.clear_note {
            Some(None)
        } else {
            args.note.map(Some)
        },
        ..Default::default()
    };
    if patch.is_empty() {
        return Err("nothing to change (use --text, --note or --clear-note)".into());
    }
    let updated = session.engine.update_task(&task.id, patch).await?;
    session.report(updated.is_some(), updated.as_ref())
}

async fn cmd_set_completed(session: &Session, args: IdArgs, completed: bool) -> CmdResult {
    let task = session.resolve(&args.id).await?;
    if task.completed == completed {
        return session.report(false, Some(&task));
    }
    let updated = session.engine.toggle_task_completion(&task.id, completed).await?;
    session.report(updated.is_some(), updated.as_ref())
}

async fn cmd_set_focused(session: &Session, args: IdArgs, focused: bool) -> CmdResult {
    let task = session.resolve(&args.id).await?;
    if task.is_focused == focused {
        return session.report(false, Some(&task));
    }
    let updated = session.engine.toggle_focus(&task.id, focused).await?;
    session.report(updated.is_some(), updated.as_ref())
}

async fn cmd_due(session: &Session, args: DueArgs) -> CmdResult {
    let task = session.resolve(&args.id).await?;
    let due = parse_due(&args.date, session.today())?;
    if task.due_date == due {
        return session.report(false, Some(&task));
    }
    let updated = session.engine.set_due_date(&task.id, due).await?;
    session.report(updated.is_some(), updated.as_ref())
}

async fn cmd_tag(session: &Session, args: TagArgs) -> CmdResult {
    let task = session.resolve(&args.id).await?;
    let updated = match args.action.as_str() {
        "add" => session.engine.add_tag(&task.id, &args.tag).await?,
        "rm" | "remove" => session.engine.remove_tag(&task.id, &args.tag).await?,
        other => return Err(format!("unknown tag action '{}' (expected: add, rm)", other).into()),
    };
    let changed = updated.as_ref().is_some_and(|t| t.tags != task.tags);
    session.report(changed, updated.as_ref())
}

async fn cmd_rm(session: &Session, args: IdArgs) -> CmdResult {
    let task = session.resolve(&args.id).await?;
    let deleted = session.engine.delete_task(&task.id).await?;
    if session.json {
        let out = DeleteJson {
            deleted,
            history: session.engine.history().status(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("deleted {} task{}", deleted, if deleted == 1 { "" } else { "s" });
    }
    Ok(())
}

async fn cmd_mv(session: &Session, args: MvArgs) -> CmdResult {
    let task = session.resolve(&args.id).await?;
    let parent = if args.root {
        ROOT_PARENT.to_string()
    } else if let Some(raw) = &args.parent {
        session.resolve(raw).await?.id
    } else {
        task.parent_id.clone()
    };
    let changed = session
        .engine
        .reorder_siblings(&task.id, &parent, args.position)
        .await?;
    let moved = session.engine.store().get(&task.id).await?;
    session.report(changed, moved.as_ref())
}

async fn cmd_mv_section(session: &Session, args: MvSectionArgs) -> CmdResult {
    let task = session.resolve(&args.id).await?;
    let changed = match &args.to {
        Some(raw) => {
            let target = parse_due(raw, session.today())?;
            session
                .engine
                .move_to_section(&task.id, target.as_deref(), args.position)
                .await?
        }
        None => {
            session
                .engine
                .reorder_in_section(&task.id, task.due_date.as_deref(), args.position)
                .await?
        }
    };
    let moved = session.engine.store().get(&task.id).await?;
    session.report(changed, moved.as_ref())
}

async fn cmd_mv_focus(session: &Session, args: MvFocusArgs) -> CmdResult {
    let task = session.resolve(&args.id).await?;
    if !task.is_focused {
        return Err(format!("task {} is not in the focus queue", task.id).into());
    }
    let changed = session
        .engine
        .reorder_in_focus(&task.id, args.position)
        .await?;
    let moved = session.engine.store().get(&task.id).await?;
    session.report(changed, moved.as_ref())
}

async fn cmd_undo(session: &Session, redo: bool) -> CmdResult {
    let history = session.engine.history();
    let pending = if redo {
        history.peek_redo()
    } else {
        history.peek_undo()
    };
    let applied = if redo {
        session.engine.redo().await?
    } else {
        session.engine.undo().await?
    };
    let description = pending.filter(|_| applied).map(|op| op.describe());

    if session.json {
        let out = UndoJson {
            applied,
            operation: description,
            history: history.status(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        match description {
            Some(d) => println!("{}: {}", if redo { "redid" } else { "undid" }, d),
            None => println!("nothing to {}", if redo { "redo" } else { "undo" }),
        }
        println!("{}", format_status(history.status()));
    }
    Ok(())
}
