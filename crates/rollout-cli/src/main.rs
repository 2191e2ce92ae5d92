mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, Target};
use rollout_core::RolloutError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rollout",
    about = "Build, ship and drive a node fleet from named deployment tasks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from rollout.yaml or .git/)
    #[arg(long, global = true, env = "ROLLOUT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Use the roles of a named environment instead of the top-level ones
    #[arg(long, global = true, env = "ROLLOUT_ENV")]
    env: Option<String>,

    /// Only target hosts of these roles (repeatable)
    #[arg(long = "role", global = true)]
    roles: Vec<String>,

    /// Only target these hosts, by name or address (repeatable)
    #[arg(long = "host", global = true)]
    hosts: Vec<String>,

    /// Log progress at info level
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter rollout.yaml
    Init {
        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Run a task against its role's hosts
    Run {
        /// Task name, e.g. deploy:update
        task: String,
        /// Abort the whole run on the first failing command
        #[arg(long)]
        hard_fail: bool,
    },

    /// List registered tasks
    Tasks,

    /// Show the steps of one task
    Show { task: String },

    /// Print the call graph a task would walk, without running it
    Plan {
        task: String,
        #[arg(long)]
        hard_fail: bool,
    },

    /// List roles and their hosts
    Roles,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// `rollout <task>` is shorthand for `rollout run <task>`
    #[command(external_subcommand)]
    External(Vec<String>),
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let target = Target {
        env: cli.env,
        roles: cli.roles,
        hosts: cli.hosts,
    };

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref()),
        Commands::Run { task, hard_fail } => {
            cmd::run::run(&root, &target, &task, hard_fail, cli.json)
        }
        Commands::Tasks => cmd::tasks::list(&root, &target, cli.json),
        Commands::Show { task } => cmd::tasks::show(&root, &target, &task, cli.json),
        Commands::Plan { task, hard_fail } => {
            cmd::tasks::plan(&root, &target, &task, hard_fail, cli.json)
        }
        Commands::Roles => cmd::roles::list(&root, &target, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::External(args) => cmd::run::run_external(&root, &target, &args, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        let code = e
            .chain()
            .find_map(|c| c.downcast_ref::<RolloutError>())
            .map(RolloutError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
