//! Command line interface for operating the GUOBA service. Supports
//! initialization, user and session management, GOOD data ingest, and
//! serving the HTTP application.

mod config;
mod model;
mod pages;
mod server;
mod store;
mod validate;

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::bail;
use clap::{Parser, Subcommand};
use config::Settings;
use store::Store;

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "guoba",
    author,
    version,
    about = "Artifact-data collection service for The GUOBA Project"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the directory tree at `STORE_ROOT`.
    Init,
    /// Launch the HTTP service.
    Serve,
    /// Manage user records.
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage login sessions.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Ingest GOOD data files as submissions to an experiment.
    Ingest {
        /// Experiment the submissions belong to.
        #[arg(long)]
        experiment: u64,
        /// Submitting user id.
        #[arg(long)]
        user: String,
        /// Paths to GOOD JSON files to ingest.
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Print all experiments with creators and submission counts.
    Experiments,
}

/// Operations available under `guoba user`.
#[derive(Subcommand)]
enum UserAction {
    /// Add or update a user record.
    Add {
        /// Discord user id.
        #[arg(long)]
        id: String,
        /// Display username.
        #[arg(long)]
        name: String,
        /// Discriminator shown after the username.
        #[arg(long, default_value = "0")]
        tag: String,
        /// Avatar hash on the Discord CDN.
        #[arg(long, default_value = "")]
        avatar: String,
        /// Grant the admin flag.
        #[arg(long)]
        admin: bool,
    },
    /// List all user records.
    List,
}

/// Operations available under `guoba session`.
#[derive(Subcommand)]
enum SessionAction {
    /// Mint a session token for a user and print it.
    Issue {
        /// User the session belongs to.
        #[arg(long)]
        user: String,
    },
    /// Revoke a previously issued token.
    Revoke { token: String },
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    let cfg = Settings::from_env(&cli.env)?;
    let store = Store::new(cfg.store_root.clone());
    match cli.command {
        Commands::Init => {
            // Create the on-disk directory structure.
            store.init()?;
        }
        Commands::Serve => {
            // Initialize storage then start the HTTP server.
            store.init()?;
            let addr: SocketAddr = cfg.bind_http.as_str().parse()?;
            server::serve_http(addr, store, cfg, std::future::pending()).await?;
        }
        Commands::User { action } => match action {
            UserAction::Add {
                id,
                name,
                tag,
                avatar,
                admin,
            } => {
                store.init()?;
                store.put_user(&model::User {
                    id: id.clone(),
                    username: name,
                    tag,
                    avatar,
                    admin,
                    good_id: None,
                })?;
                println!("[store] saved user {id}");
            }
            UserAction::List => {
                for user in store.users()? {
                    let flag = if user.admin { " (admin)" } else { "" };
                    println!("{} {}#{}{}", user.id, user.username, user.tag, flag);
                }
            }
        },
        Commands::Session { action } => match action {
            SessionAction::Issue { user } => {
                let token = store.create_session(&user)?;
                println!("{token}");
            }
            SessionAction::Revoke { token } => {
                if !store.revoke_session(&token)? {
                    bail!("no such session");
                }
            }
        },
        Commands::Ingest {
            experiment,
            user,
            files,
        } => {
            // Load each GOOD file and store it as a submission.
            for f in files {
                let data = fs::read_to_string(&f)?;
                let good: model::GoodData = serde_json::from_str(&data)?;
                let submission = store.ingest_good(experiment, &user, good)?;
                println!("[store] stored submission {}", submission.id);
            }
        }
        Commands::Experiments => {
            for info in store.experiments()? {
                let e = &info.experiment;
                println!(
                    "#{} {} (/experiments/{}) by {}#{}: character {}, {} submissions, public={} active={}",
                    e.id,
                    e.name,
                    e.slug,
                    info.creator.username,
                    info.creator.tag,
                    e.character,
                    info.data_count,
                    e.public,
                    e.active
                );
            }
        }
    }
    Ok(())
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let base_dir = match env_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    let store_root = base_dir.join("guoba-data");
    let mut content = String::new();
    content.push_str(&format!("STORE_ROOT={}\n", display_path(&store_root)));
    content.push_str("BIND_HTTP=127.0.0.1:7878\n");
    content.push_str("GUOBA_ACTIVE=1\n");
    content.push_str("VERBOSE=0\n");
    fs::write(env_path, content)?;
    Ok(())
}

fn display_path(path: &PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
