use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::Path;
use std::time::Duration;
use stockwatch::cli::show::ShowOptions;
use stockwatch::core::log::init_logging;
use stockwatch::core::watchlist::{SortKey, ViewOptions};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    /// Highest rating first
    Rating,
    /// Best return since the watch date first
    Return,
    /// Best three-month return first
    #[value(name = "3m")]
    ThreeMonth,
}

impl From<SortArg> for SortKey {
    fn from(sort: SortArg) -> SortKey {
        match sort {
            SortArg::Rating => SortKey::Rating,
            SortArg::Return => SortKey::ReturnSinceWatch,
            SortArg::ThreeMonth => SortKey::ThreeMonthReturn,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Remember a GitHub token and the repository holding the watchlist
    Login {
        #[arg(long)]
        token: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        repo: String,
    },
    /// Forget the stored token and repository
    Logout,
    /// Search tickers by symbol or company name
    Search { query: String },
    /// Add a ticker to the watchlist
    Add {
        ticker: String,
        /// Watch date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        since: Option<NaiveDate>,
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Remove a ticker from the watchlist
    Remove { ticker: String },
    /// Rate a ticker from 1 to 5 stars; 0 or the current rating again clears it
    Rate {
        ticker: String,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=5))]
        rating: u8,
    },
    /// Add or remove labels
    Label {
        ticker: String,
        #[arg(long)]
        add: Vec<String>,
        #[arg(long)]
        remove: Vec<String>,
    },
    /// Replace the notes of a ticker
    Note { ticker: String, text: String },
    /// Change the watch date of a ticker
    Since { ticker: String, date: NaiveDate },
    /// Display the watchlist with live quotes
    Show {
        /// Include unrated items
        #[arg(long)]
        all: bool,
        /// Only items with any of these labels
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long, value_enum, default_value = "rating")]
        sort: SortArg,
        /// Refresh every SECS seconds until Ctrl-C
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
        /// Save refreshed values after a SECS countdown
        #[arg(long, value_name = "SECS")]
        autosave: Option<u64>,
    },
}

impl From<Commands> for stockwatch::AppCommand {
    fn from(cmd: Commands) -> stockwatch::AppCommand {
        use stockwatch::AppCommand;
        match cmd {
            Commands::Login { token, owner, repo } => AppCommand::Login { token, owner, repo },
            Commands::Logout => AppCommand::Logout,
            Commands::Search { query } => AppCommand::Search { query },
            Commands::Add {
                ticker,
                since,
                labels,
                note,
            } => AppCommand::Add {
                ticker,
                since,
                labels,
                note,
            },
            Commands::Remove { ticker } => AppCommand::Remove { ticker },
            Commands::Rate { ticker, rating } => AppCommand::Rate { ticker, rating },
            Commands::Label {
                ticker,
                add,
                remove,
            } => AppCommand::Label {
                ticker,
                add,
                remove,
            },
            Commands::Note { ticker, text } => AppCommand::Note { ticker, text },
            Commands::Since { ticker, date } => AppCommand::Since { ticker, date },
            Commands::Show {
                all,
                labels,
                sort,
                watch,
                autosave,
            } => AppCommand::Show(ShowOptions {
                all,
                view: ViewOptions {
                    sort: sort.into(),
                    labels,
                },
                watch: watch.filter(|s| *s > 0).map(Duration::from_secs),
                autosave: autosave.map(Duration::from_secs),
            }),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => stockwatch::cli::setup::setup(cli.config_path.as_deref().map(Path::new)),
        Some(cmd) => stockwatch::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_rate_accepts_zero_to_clear() {
        let cli = Cli::try_parse_from(["stockwatch", "rate", "AAPL", "0"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Rate { rating: 0, .. })
        ));
        assert!(Cli::try_parse_from(["stockwatch", "rate", "AAPL", "6"]).is_err());

        let help = Cli::command()
            .find_subcommand("rate")
            .and_then(|rate| rate.get_about())
            .map(|about| about.to_string())
            .unwrap_or_default();
        assert!(help.contains("0"), "Help text: {help}");
    }
}
