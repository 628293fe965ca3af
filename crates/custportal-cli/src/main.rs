//! custportal - command-line front end for the customer management service.
//!
//! Signs in against the service, keeps the bearer token in the configured
//! store, and lists and edits customers from behind the dashboard guard.

mod app;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use custportal_core::models::{CustomerUpdateRequest, Gender};
use custportal_core::{Config, TokenStoreKind};

use app::{App, NewCustomer};

/// Log file name prefix when logging to a directory
const LOG_FILE_PREFIX: &str = "custportal.log";

#[derive(Debug, Parser)]
#[command(name = "custportal", version, about = "Manage customers from the command line")]
struct Cli {
    /// Base URL of the customer service (overrides config and environment)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Keep the session in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Write logs to a daily-rolled file in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and open the dashboard
    SignIn {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Register a new account and sign in with it
    SignUp {
        #[command(flatten)]
        customer: CustomerArgs,
    },
    /// Forget the stored session
    SignOut,
    /// Show who is signed in and when the session expires
    Status,
    /// Navigate to a path (`/`, `/sign-up`, `/dashboard`)
    Open { path: String },
    /// Work with customers
    Customers {
        #[command(subcommand)]
        action: CustomerCommand,
    },
}

#[derive(Debug, Subcommand)]
enum CustomerCommand {
    /// List all customers
    List,
    /// Show one customer
    Show { id: i64 },
    /// Create a customer
    Create {
        #[command(flatten)]
        customer: CustomerArgs,
    },
    /// Update a customer's name, email or age
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        age: Option<u32>,
    },
    /// Delete a customer
    Delete { id: i64 },
    /// Upload a profile image
    UploadImage { id: i64, file: PathBuf },
    /// Print the profile image URL
    ImageUrl { id: i64 },
}

#[derive(Debug, clap::Args)]
struct CustomerArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    age: u32,
    /// MALE or FEMALE
    #[arg(long)]
    gender: Gender,
}

impl From<CustomerArgs> for NewCustomer {
    fn from(args: CustomerArgs) -> Self {
        NewCustomer {
            name: args.name,
            email: args.email,
            age: args.age,
            gender: args.gender,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    config.apply_env()?;

    if let Some(ref url) = cli.api_url {
        config.api_base_url = url.clone();
    }
    if cli.ephemeral {
        config.token_store = TokenStoreKind::Memory;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let mut app = App::new(config)?;

    match cli.command {
        Command::SignIn { username } => app.sign_in(username).await,
        Command::SignUp { customer } => app.sign_up(customer.into()).await,
        Command::SignOut => {
            app.sign_out();
            Ok(())
        }
        Command::Status => {
            app.status();
            Ok(())
        }
        Command::Open { path } => app.open(&path).await,
        Command::Customers { action } => match action {
            CustomerCommand::List => app.list_customers().await,
            CustomerCommand::Show { id } => app.show_customer(id).await,
            CustomerCommand::Create { customer } => app.create_customer(customer.into()).await,
            CustomerCommand::Update {
                id,
                name,
                email,
                age,
            } => {
                app.update_customer(id, CustomerUpdateRequest { name, email, age })
                    .await
            }
            CustomerCommand::Delete { id } => app.delete_customer(id).await,
            CustomerCommand::UploadImage { id, file } => app.upload_image(id, &file).await,
            CustomerCommand::ImageUrl { id } => {
                app.image_url(id);
                Ok(())
            }
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());
    info!("custportal starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
