//! Smart Print CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations (schema + session store)
//! sp-cli migrate
//!
//! # Create a customer, or reset the password of an existing account
//! sp-cli user create -e jane@example.com -f Jane -l Doe -p 'correct horse'
//!
//! # Create an administrator
//! sp-cli user create -e admin@example.com -f Site -l Admin -p 'correct horse' --admin
//!
//! # Purge expired one-time codes now
//! sp-cli otp sweep
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `user create` - Seed user accounts
//! - `otp sweep` - Delete expired one-time codes

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "sp-cli")]
#[command(author, version, about = "Smart Print CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage one-time codes
    Otp {
        #[command(subcommand)]
        action: OtpAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create an account, or replace the password if it already exists
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// First name
        #[arg(short, long)]
        first_name: String,

        /// Last name
        #[arg(short, long)]
        last_name: String,

        /// Password
        #[arg(short, long)]
        password: String,

        /// Create an administrator instead of a customer
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
enum OtpAction {
    /// Delete every expired one-time code
    Sweep,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                first_name,
                last_name,
                password,
                admin,
            } => {
                commands::user::create(commands::user::SeedUser {
                    email,
                    first_name,
                    last_name,
                    password,
                    is_admin: admin,
                })
                .await?;
            }
        },
        Commands::Otp { action } => match action {
            OtpAction::Sweep => {
                commands::otp::sweep().await?;
            }
        },
    }
    Ok(())
}
