use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use jobboard::guard::GuardDecision;
use jobboard::identity::FederatedCredential;
use jobboard::jobs::{JobQuery, SortOrder};
use jobboard::model::{CATEGORIES, JobDraft};
use jobboard::navigation::PersistentHistory;
use jobboard::routes::Route;
use jobboard::storage::FileStorage;
use jobboard::{ClientConfig, JobBoard};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    App(#[from] jobboard::Error),
    #[error("sign in required; run `jobboard-cli login` and you will be returned to {0}")]
    LoginRequired(String),
    #[error("invalid JSON output: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "jobboard-cli", about = "Job marketplace client")]
struct Cli {
    #[arg(long, env = "JOBBOARD_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "JOBBOARD_PROFILE_DIR")]
    profile_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        photo_url: String,
        #[arg(long, env = "JOBBOARD_PASSWORD")]
        password: String,
    },
    Login {
        email: String,
        #[arg(long, env = "JOBBOARD_PASSWORD")]
        password: String,
    },
    /// Sign in with an ID token issued by a federated provider.
    LoginFederated {
        #[arg(long, default_value = "google.com")]
        provider: String,
        #[arg(long, env = "JOBBOARD_ID_TOKEN")]
        id_token: String,
    },
    Logout,
    Whoami,
    /// Update the signed-in user's display name and photo.
    Profile {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        photo_url: String,
    },
    Jobs(JobsCommand),
    Tasks(TasksCommand),
}

#[derive(Args, Debug)]
struct JobsCommand {
    #[command(subcommand)]
    command: JobsSubcommand,
}

#[derive(Subcommand, Debug)]
enum JobsSubcommand {
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "desc", help = "desc (newest first) or asc")]
        order: SortOrder,
    },
    Latest,
    Show {
        id: String,
    },
    Add(DraftArgs),
    Update {
        id: String,
        #[command(flatten)]
        draft: DraftArgs,
    },
    Delete {
        id: String,
    },
    Mine,
    Categories,
}

#[derive(Args, Debug)]
struct DraftArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    category: String,
    #[arg(long)]
    summary: String,
    #[arg(long, default_value = "")]
    cover_image: String,
}

impl From<DraftArgs> for JobDraft {
    fn from(args: DraftArgs) -> Self {
        Self { title: args.title, category: args.category, summary: args.summary, cover_image: args.cover_image }
    }
}

#[derive(Args, Debug)]
struct TasksCommand {
    #[command(subcommand)]
    command: TasksSubcommand,
}

#[derive(Subcommand, Debug)]
enum TasksSubcommand {
    Accept { job_id: String },
    List,
    /// Mark a task done or cancelled.
    Release { job_id: String },
    Bids,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url);
    }
    if let Some(dir) = cli.profile_dir {
        config = config.with_profile_dir(dir);
    }

    let storage = Arc::new(FileStorage::open(&config.profile_dir)?);
    let navigator = Arc::new(PersistentHistory::new("/", storage));
    let board = JobBoard::launch(&config, navigator.clone()).await?;

    let result = run(&board, cli.command).await;
    board.shutdown();
    tracing::debug!(location = %navigator.history().current(), "finished");
    result
}

async fn run(board: &JobBoard, command: Command) -> Result<(), CliError> {
    match command {
        Command::Register { name, email, photo_url, password } => {
            let identity = board.register(&name, &email, &photo_url, &password).await?;
            print_json(&identity)
        }
        Command::Login { email, password } => {
            let landed = board.login(&email, &password).await?;
            println!("signed in as {email}; continue at {landed}");
            Ok(())
        }
        Command::LoginFederated { provider, id_token } => {
            let credential = FederatedCredential { provider_id: provider, id_token };
            let landed = board.login_federated(&credential).await?;
            println!("signed in; continue at {landed}");
            Ok(())
        }
        Command::Logout => {
            board.logout().await?;
            println!("signed out");
            Ok(())
        }
        Command::Whoami => match board.session().identity() {
            Some(identity) => print_json(&identity),
            None => {
                println!("anonymous");
                Ok(())
            }
        },
        Command::Profile { name, photo_url } => {
            let identity = board.session().update_profile(&name, &photo_url).await?;
            print_json(&identity)
        }
        Command::Jobs(jobs) => run_jobs(board, jobs).await,
        Command::Tasks(tasks) => run_tasks(board, tasks).await,
    }
}

async fn run_jobs(board: &JobBoard, jobs: JobsCommand) -> Result<(), CliError> {
    match jobs.command {
        JobsSubcommand::List { category, order } => {
            let query = JobQuery { category, order };
            print_json(&board.all_jobs(&query).await?)
        }
        JobsSubcommand::Latest => print_json(&board.latest_jobs().await?),
        JobsSubcommand::Show { id } => {
            require(board, &Route::JobDetails(id.clone())).await?;
            print_json(&board.job_details(&id).await?)
        }
        JobsSubcommand::Add(draft) => {
            require(board, &Route::AddJob).await?;
            print_json(&board.add_job(draft.into()).await?)
        }
        JobsSubcommand::Update { id, draft } => {
            require(board, &Route::UpdateJob(id.clone())).await?;
            print_json(&board.update_job(&id, &draft.into()).await?)
        }
        JobsSubcommand::Delete { id } => {
            require(board, &Route::MyPostedJobs).await?;
            print_json(&board.delete_job(&id).await?)
        }
        JobsSubcommand::Mine => {
            require(board, &Route::MyPostedJobs).await?;
            print_json(&board.my_posted_jobs().await?)
        }
        JobsSubcommand::Categories => {
            for category in CATEGORIES {
                println!("{category}");
            }
            Ok(())
        }
    }
}

async fn run_tasks(board: &JobBoard, tasks: TasksCommand) -> Result<(), CliError> {
    match tasks.command {
        TasksSubcommand::Accept { job_id } => {
            require(board, &Route::JobDetails(job_id.clone())).await?;
            print_json(&board.accept_job(&job_id).await?)
        }
        TasksSubcommand::List => {
            require(board, &Route::MyAcceptedTasks).await?;
            print_json(&board.my_tasks())
        }
        TasksSubcommand::Release { job_id } => {
            require(board, &Route::MyAcceptedTasks).await?;
            let released = board.release_task(&job_id)?;
            println!("{}", if released { "released" } else { "not accepted" });
            Ok(())
        }
        TasksSubcommand::Bids => {
            require(board, &Route::MyAcceptedTasks).await?;
            print_json(&board.my_bids().await?)
        }
    }
}

/// Run the route guard for `route`; an anonymous visit becomes a login prompt.
async fn require(board: &JobBoard, route: &Route) -> Result<(), CliError> {
    match board.open(&route.path()).await {
        GuardDecision::Render(_) => Ok(()),
        GuardDecision::Redirect { from, .. } => Err(CliError::LoginRequired(from)),
        GuardDecision::Loading => Err(CliError::LoginRequired(route.path())),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn jobs_list_parses_sort_order() {
        let cli = Cli::try_parse_from(["jobboard-cli", "jobs", "list", "--order", "asc", "--category", "Web Development"])
            .unwrap();
        let Command::Jobs(JobsCommand { command: JobsSubcommand::List { category, order } }) = cli.command else {
            panic!("expected jobs list");
        };
        assert_eq!(order, SortOrder::Oldest);
        assert_eq!(category.as_deref(), Some("Web Development"));
    }

    #[test]
    fn update_flattens_draft_fields() {
        let cli = Cli::try_parse_from([
            "jobboard-cli", "jobs", "update", "j1", "--title", "T", "--category", "Content Writing", "--summary", "S",
        ])
        .unwrap();
        let Command::Jobs(JobsCommand { command: JobsSubcommand::Update { id, draft } }) = cli.command else {
            panic!("expected jobs update");
        };
        let draft: JobDraft = draft.into();
        assert_eq!(id, "j1");
        assert!(draft.missing_fields().is_empty());
    }
}
