mod commands;
mod config;
mod error;
mod prompt;
mod render;

use std::{path::PathBuf, process::ExitCode};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::config::Overrides;

#[derive(Parser, Debug)]
#[command(name = "turtle")]
#[command(about = "Operator console for the fund dashboard API")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session token.
    Login {
        #[arg(long)]
        identifier: String,
    },
    /// End the session on the server and locally.
    Logout,
    /// Show the logged-in investor.
    Whoami,
    ChangePassword,
    /// Latest NAV snapshot.
    Nav,
    History {
        #[arg(long)]
        limit: Option<u32>,
    },
    Holdings {
        /// Holdings for a past trading day instead of the latest snapshot.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Cash(Cash),
    Investors(Investors),
    /// Preview screenshots, then confirm or discard the recognised holdings.
    Upload(UploadArgs),
    /// Pull holdings from the broker account.
    RefreshBroker,
    /// Recompute NAV from the stored holdings of a day.
    Recalculate {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show where the route guard sends the current session for a path.
    Route { path: String },
}

#[derive(Args, Debug)]
struct Cash {
    #[command(subcommand)]
    command: CashCommand,
}

#[derive(Subcommand, Debug)]
enum CashCommand {
    Show,
    Set { amount: f64 },
}

#[derive(Args, Debug)]
struct Investors {
    #[command(subcommand)]
    command: InvestorCommand,
}

#[derive(Subcommand, Debug)]
enum InvestorCommand {
    List,
    Create(InvestorArgs),
    Update {
        id: i64,
        #[command(flatten)]
        fields: InvestorArgs,
    },
    Delete {
        id: i64,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct InvestorArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    identifier: Option<String>,
    #[arg(long)]
    initial_investment: Option<f64>,
    #[arg(long)]
    shares: Option<f64>,
    #[arg(long)]
    admin: bool,
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// Trading day the screenshots describe.
    #[arg(long)]
    date: NaiveDate,
    /// Confirm without asking.
    #[arg(long)]
    yes: bool,
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match config::load(&cli.overrides) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "turtle={level},turtle_client={level}",
            level = settings.level
        ))
        .with_writer(std::io::stderr)
        .init();

    match commands::run(&settings, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!("command failed: {err:?}");
            eprintln!("{}", err.user_message());
            ExitCode::FAILURE
        }
    }
}
