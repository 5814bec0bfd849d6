use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use smartdo_ai::{PipelineOptions, DEFAULT_PRIORITIZE_LIMIT};
use smartdo_core::{
    SourceType, TaskId, TaskPayload, TaskStatus, CORRECTIONS_LIMIT, DEFAULT_CATEGORY,
    POPULAR_CATEGORIES_LIMIT,
};
use tracing_subscriber::EnvFilter;

mod app;
mod auth;
mod config;
mod state;
mod store;
mod task_cmd;

use app::App;
use store::JsonStore;

#[derive(Parser, Debug)]
#[command(name = "smartdo", version, about = "AI task analysis from the terminal")]
struct Cli {
    /// Debug logging on stderr (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct PayloadArgs {
    #[arg(long)]
    title: String,

    #[arg(long, default_value = "")]
    description: String,

    #[arg(long, default_value = DEFAULT_CATEGORY)]
    category: String,
}

impl PayloadArgs {
    fn into_payload(self) -> TaskPayload {
        TaskPayload::new(self.title, self.description, self.category)
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Write the suggestions back onto the task
    #[arg(long)]
    auto_apply: bool,

    /// Active task count for deadline suggestions (default: pending tasks)
    #[arg(long)]
    workload: Option<u32>,
}

impl RunArgs {
    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            auto_apply: self.auto_apply,
            current_workload: self.workload,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score a task's priority (0-10, level 1-4)
    Priority(PayloadArgs),

    /// Suggest a deadline
    Deadline {
        #[command(flatten)]
        task: PayloadArgs,

        #[arg(long)]
        workload: Option<u32>,
    },

    /// Rewrite a description with context-aware detail
    Enhance(PayloadArgs),

    /// Suggest category tags
    Categories(PayloadArgs),

    /// Run all four analyses on a stored task
    Pipeline {
        task_id: TaskId,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Run the pipeline over several stored tasks (Ctrl-C stops scheduling)
    Batch {
        #[arg(required = true)]
        task_ids: Vec<TaskId>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Rank tasks by analysed priority (default: all open tasks)
    Prioritize {
        task_ids: Vec<TaskId>,

        #[arg(long, default_value_t = DEFAULT_PRIORITIZE_LIMIT)]
        limit: usize,
    },

    /// Summarise how much of the task list the AI has touched
    Analytics,

    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    Context {
        #[command(subcommand)]
        command: ContextCommand,
    },

    Category {
        #[command(subcommand)]
        command: CategoryCommand,
    },

    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    Add {
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        category: Option<String>,
    },
    List {
        /// pending, in_progress or completed
        #[arg(long)]
        status: Option<TaskStatus>,
    },
}

#[derive(Subcommand, Debug)]
enum ContextCommand {
    Add {
        /// whatsapp, email, notes or manual
        #[arg(long, default_value = "manual")]
        source: SourceType,

        content: String,
    },
    List {
        #[arg(long, default_value_t = smartdo_core::RECENT_CONTEXT_LIMIT)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    List,

    /// Most used categories first
    Popular {
        #[arg(long, default_value_t = POPULAR_CATEGORIES_LIMIT)]
        limit: usize,
    },

    /// Count one more use of a category
    Use { name: String },

    /// Record that suggested tags were replaced (pairs --old/--new in order)
    Correct {
        task_id: TaskId,

        #[arg(long = "old")]
        old_tags: Vec<String>,

        #[arg(long = "new", required = true)]
        new_tags: Vec<String>,
    },

    /// Most common corrections
    Corrections {
        #[arg(long, default_value_t = CORRECTIONS_LIMIT)]
        limit: usize,

        /// Only pairs corrected at least this many times
        #[arg(long)]
        min_count: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Drop every cached analysis
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write ~/.smartdo/config.toml with defaults
    Init,
    Show,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Store an OpenAI API key in ~/.smartdo/auth.json
    PasteOpenaiApiKey,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "smartdo=debug" } else { "smartdo=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Priority(task) => {
            let app = App::load()?;
            app.finish(app.priority(task.into_payload()).await)?
        }
        Command::Deadline { task, workload } => {
            let app = App::load()?;
            app.finish(app.deadline(task.into_payload(), workload).await)?
        }
        Command::Enhance(task) => {
            let app = App::load()?;
            app.finish(app.enhance(task.into_payload()).await)?
        }
        Command::Categories(task) => {
            let app = App::load()?;
            app.finish(app.categories(task.into_payload()).await)?
        }
        Command::Pipeline { task_id, run } => {
            let app = App::load()?;
            app.finish(app.pipeline(task_id, run.options()).await)?
        }
        Command::Batch { task_ids, run } => {
            let app = App::load()?;
            app.finish(app.batch(&task_ids, run.options()).await)?
        }
        Command::Prioritize { task_ids, limit } => {
            let app = App::load()?;
            app.finish(app.prioritize(&task_ids, limit).await)?
        }

        Command::Task { command } => {
            let store = open_store()?;
            match command {
                TaskCommand::Add {
                    title,
                    description,
                    category,
                } => task_cmd::add_task(&store, &title, &description, category.as_deref()).await?,
                TaskCommand::List { status } => task_cmd::list_tasks(&store, status).await?,
            }
        }

        Command::Context { command } => {
            let store = open_store()?;
            match command {
                ContextCommand::Add { source, content } => {
                    task_cmd::add_context(&store, source, &content).await?
                }
                ContextCommand::List { limit } => task_cmd::list_context(&store, limit).await?,
            }
        }

        Command::Analytics => task_cmd::analytics(&open_store()?).await?,

        Command::Category { command } => {
            let store = open_store()?;
            match command {
                CategoryCommand::List => task_cmd::list_categories(&store)?,
                CategoryCommand::Popular { limit } => {
                    task_cmd::popular_categories(&store, limit).await?
                }
                CategoryCommand::Use { name } => task_cmd::use_category(&store, &name).await?,
                CategoryCommand::Correct {
                    task_id,
                    old_tags,
                    new_tags,
                } => task_cmd::correct_categories(&store, task_id, &old_tags, &new_tags).await?,
                CategoryCommand::Corrections { limit, min_count } => {
                    task_cmd::list_corrections(&store, limit, min_count).await?
                }
            }
        }

        Command::Cache { command } => match command {
            CacheCommand::Clear => {
                let path = state::cache_path()?;
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                println!("Cleared {}", path.display());
            }
        },

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                let cfg = config::load_config()?;
                print!("{}", toml::to_string_pretty(&cfg)?);
            }
        },

        Command::Auth { command } => match command {
            AuthCommand::PasteOpenaiApiKey => auth::openai_paste_api_key()?,
        },
    }

    Ok(())
}

fn open_store() -> Result<JsonStore> {
    Ok(JsonStore::open(state::store_path()?)?)
}
