//! CLI tool for managing the admin accounts of the web interface
//!
//! # Usage
//!
//! ```bash
//! # Add an admin, the password is read from stdin if omitted
//! mailwebadmin-user --config /etc/mailwebadmin add root
//!
//! # List all admins
//! mailwebadmin-user --config /etc/mailwebadmin list
//!
//! # Delete an admin and end all of its sessions
//! mailwebadmin-user --config /etc/mailwebadmin delete root
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mailwebadmin::config::Config;
use mailwebadmin::security::{AdminUsers, SessionController};
use mailwebadmin::storage;
use mailwebadmin::utils::validate::{admin_name_valid, password_valid};
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mailwebadmin-user")]
#[command(about = "Manage mailwebadmin admin accounts", long_about = None)]
struct Cli {
    /// Directory containing mailconf
    #[arg(short, long, default_value = "config")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new admin
    Add {
        /// Admin username
        username: String,
        /// Admin password, read from stdin if omitted
        password: Option<String>,
    },
    /// List all admins
    List,
    /// Delete an admin
    Delete {
        /// Admin username
        username: String,
    },
}

fn read_password() -> anyhow::Result<String> {
    eprintln!("Password:");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let pool = storage::connect(&config.database).await?;

    let admins = AdminUsers::new(pool.clone());
    let sessions = SessionController::new(pool, config.session_lifespan);
    admins.init().await?;
    sessions.init().await?;

    match cli.command {
        Commands::Add { username, password } => {
            admin_name_valid(&username)?;
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            password_valid(&password)?;

            let id = admins.insert(&username, &password).await?;
            println!("✓ Admin {} added with id {}", username, id);
        }
        Commands::List => {
            let users = admins.list_users().await?;

            if users.is_empty() {
                println!("No admins found.");
            } else {
                for user in &users {
                    println!("{}", user);
                }
                println!("\nTotal: {} admin(s)", users.len());
            }
        }
        Commands::Delete { username } => {
            let Some(id) = admins.user_id(&username).await? else {
                bail!("Admin {} does not exist", username);
            };

            admins.delete(&username).await?;
            let removed = sessions.delete_entries_for_user(id).await?;
            println!("✓ Admin {} deleted, {} session(s) ended", username, removed);
        }
    }

    Ok(())
}
