//! dfsftp binary
//!
//! ## Usage
//!
//! ```bash
//! # Validate config and users, provision home directories
//! dfsftp -u users.properties check
//!
//! # Drive one session from stdin
//! dfsftp -u users.properties --store local --root /srv/dfs shell --user alice
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use dfsftp_kernel::ViewFactory;
use dfsftp_server::{Overrides, ServerConfig, Shell, StoreKind, UserFile};

/// Jailed per-user view over a distributed store.
#[derive(Parser, Debug)]
#[command(name = "dfsftp")]
#[command(about = "Jailed per-user filesystem view over a distributed store")]
struct Args {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server port
    #[arg(short, long)]
    port: Option<u32>,

    /// User definition file
    #[arg(short = 'u', long = "userconf")]
    user_conf: Option<PathBuf>,

    /// Maximum number of threads in the thread pool
    #[arg(short = 't', long = "maxthreads")]
    max_threads: Option<u32>,

    /// Maximum number of simultaneous user logins
    #[arg(short = 'l', long = "maxlogins")]
    max_logins: Option<u32>,

    /// Backing store
    #[arg(long, value_enum)]
    store: Option<StoreKind>,

    /// Root directory for the local store
    #[arg(long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate configuration and users, creating missing home directories
    Check,
    /// Run a session for one user, reading commands from stdin
    Shell {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the shell
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    config.apply(Overrides {
        port: args.port,
        user_conf: args.user_conf,
        max_threads: args.max_threads,
        max_logins: args.max_logins,
        store: args.store,
        root: args.root,
    })?;
    config
        .validate()
        .context("Usage: dfsftp -p port -u userconf [-t threads] [-l logins] <command>")?;

    let limits = config.limits();
    tracing::info!(
        port = config.port,
        anonymous_login_enabled = limits.anonymous_login_enabled,
        login_failure_delay_ms = limits.login_failure_delay_ms,
        max_logins = limits.max_logins,
        max_anonymous_logins = limits.max_anonymous_logins,
        max_login_failures = limits.max_login_failures,
        max_threads = limits.max_threads,
        store = ?config.store.kind,
        "connection configuration"
    );

    let user_conf = config.user_conf()?;
    let users = UserFile::load(user_conf)
        .with_context(|| format!("Failed to load users from {}", user_conf.display()))?;
    let factory = ViewFactory::with_config(config.connector()?, config.view.clone());

    match args.command {
        Command::Check => check(&factory, &users).await,
        Command::Shell { user } => shell(&factory, &users, &user).await,
    }
}

async fn check(factory: &ViewFactory, users: &UserFile) -> Result<()> {
    let view_config = factory.config();
    tracing::info!(
        create_home = view_config.create_home,
        home_mode = %format!("{:o}", view_config.home_mode),
        use_store_principal = view_config.use_store_principal,
        "checking users"
    );
    let mut count = 0;
    for record in users.enabled() {
        let view = factory
            .create(record.identity()?)
            .await
            .with_context(|| format!("Failed to open a session for {}", record.name))?;
        println!("{} -> {}", record.name, view.current_dir());
        view.dispose();
        count += 1;
    }
    let disabled = users.len() - count;
    tracing::info!(enabled = count, disabled, "users checked");
    Ok(())
}

async fn shell(factory: &ViewFactory, users: &UserFile, name: &str) -> Result<()> {
    let identity = users.identity(name)?;
    let view = factory
        .create(identity)
        .await
        .with_context(|| format!("Failed to open a session for {name}"))?;

    let shell = Shell::new(view);
    let session = shell.view();
    tracing::info!(
        user = %session.identity().name(),
        cwd = %session.current_dir(),
        "shell ready, type help for commands"
    );

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();
    shell.run(input, &mut output).await
}
