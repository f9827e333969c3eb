use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "canopy", about = concat!("canopy v", env!("CARGO_PKG_VERSION"), " - a task tree with dates, focus and undo"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different project directory
    #[arg(short = 'C', long = "project-dir", global = true)]
    pub project_dir: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new canopy project in the current directory
    Init,
    /// Add a task (inline #tags are extracted from the text)
    Add(AddArgs),
    /// Change a task's text or notes
    Edit(EditArgs),
    /// Mark a task completed
    Done(IdArgs),
    /// Mark a task not completed
    Undone(IdArgs),
    /// Add a task to the focus queue
    Focus(IdArgs),
    /// Remove a task from the focus queue
    Unfocus(IdArgs),
    /// Set or clear a due date
    Due(DueArgs),
    /// Add or remove a tag
    Tag(TagArgs),
    /// Delete a task and all of its subtasks
    Rm(IdArgs),
    /// Move a task among siblings, optionally under a new parent
    Mv(MvArgs),
    /// Move a task within a date section, optionally to another date
    MvSection(MvSectionArgs),
    /// Move a task within the focus queue
    MvFocus(MvFocusArgs),
    /// Show tasks as a tree
    List(ListArgs),
    /// List every tag in use
    Tags,
    /// Revert the last change
    Undo,
    /// Re-apply the last undone change
    Redo,
    /// Show the undo and redo stacks
    History,
    /// Show or change configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct IdArgs {
    /// Task ID (a unique prefix is enough)
    pub id: String,
}

#[derive(Args)]
pub struct AddArgs {
    /// Task text
    pub text: String,
    /// Parent task ID
    #[arg(long)]
    pub parent: Option<String>,
    /// Insert directly after this sibling task ID
    #[arg(long)]
    pub after: Option<String>,
    /// Due date (YYYY-MM-DD, today, tomorrow, yesterday, +N)
    #[arg(long)]
    pub due: Option<String>,
    /// Notes
    #[arg(long)]
    pub note: Option<String>,
    /// Tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Args)]
pub struct EditArgs {
    /// Task ID
    pub id: String,
    /// New text
    #[arg(long)]
    pub text: Option<String>,
    /// New notes
    #[arg(long, conflicts_with = "clear_note")]
    pub note: Option<String>,
    /// Remove the notes
    #[arg(long)]
    pub clear_note: bool,
}

#[derive(Args)]
pub struct DueArgs {
    /// Task ID
    pub id: String,
    /// Due date (YYYY-MM-DD, today, tomorrow, yesterday, +N), or "none"
    pub date: String,
}

#[derive(Args)]
pub struct TagArgs {
    /// Task ID
    pub id: String,
    /// Action: "add" or "rm"
    pub action: String,
    /// Tag name
    pub tag: String,
}

#[derive(Args)]
pub struct MvArgs {
    /// Task ID
    pub id: String,
    /// Position among the siblings (0-indexed)
    pub position: usize,
    /// Reparent under the given task ID
    #[arg(long, conflicts_with = "root")]
    pub parent: Option<String>,
    /// Promote to top-level
    #[arg(long)]
    pub root: bool,
}

#[derive(Args)]
pub struct MvSectionArgs {
    /// Task ID
    pub id: String,
    /// Position within the section (0-indexed)
    pub position: usize,
    /// Move into another date section (date, or "none")
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Args)]
pub struct MvFocusArgs {
    /// Task ID
    pub id: String,
    /// Position in the focus queue (0-indexed)
    pub position: usize,
}

#[derive(Args)]
pub struct ListArgs {
    /// Section: all, today, upcoming, past, no-date, focus, YYYY-MM, YYYY, START..END
    pub section: Option<String>,
    /// Filter by status (all, completed, incomplete)
    #[arg(long)]
    pub status: Option<String>,
    /// Case-insensitive search over text, notes and tags
    #[arg(long, short)]
    pub search: Option<String>,
    /// Evaluate date sections as of this date instead of today
    #[arg(long, hide = true)]
    pub today: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Dotted key (e.g. history.limit)
    pub key: Option<String>,
    /// New value; omit to print the current one
    pub value: Option<String>,
}
