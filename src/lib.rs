pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::cli::edit::Editor;
use crate::cli::show::ShowOptions;
use crate::core::config::AppConfig;
use crate::core::quote::{QuoteKey, QuoteProvider};
use crate::core::refresh::RefreshSettings;
use crate::core::session::Session;
use crate::providers::MemoryCache;
use crate::providers::github::GitHubClient;
use crate::providers::relay::FallbackTransport;
use crate::providers::yahoo_finance::YahooQuoteProvider;
use anyhow::Result;
use chrono::NaiveDate;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    Login {
        token: String,
        owner: String,
        repo: String,
    },
    Logout,
    Search {
        query: String,
    },
    Add {
        ticker: String,
        since: Option<NaiveDate>,
        labels: Vec<String>,
        note: Option<String>,
    },
    Remove {
        ticker: String,
    },
    Rate {
        ticker: String,
        rating: u8,
    },
    Label {
        ticker: String,
        add: Vec<String>,
        remove: Vec<String>,
    },
    Note {
        ticker: String,
        text: String,
    },
    Since {
        ticker: String,
        date: NaiveDate,
    },
    Show(ShowOptions),
}

/// Long-lived clients shared by all commands.
struct Services {
    github: GitHubClient,
    quotes: Arc<dyn QuoteProvider>,
    refresh: RefreshSettings,
}

impl Services {
    fn from_config(config: &AppConfig) -> Result<Self> {
        let data_dir = config.default_data_path()?;
        let session = Session::new(store::open_session_store(&data_dir));
        let github = GitHubClient::new(&config.github, session)?;

        let transport = FallbackTransport::from_config(
            config.providers.direct,
            &config.providers.relays,
            Duration::from_secs(config.providers.timeout_secs),
        )?;
        let quotes = YahooQuoteProvider::new(
            &config.providers.yahoo.base_url,
            Arc::new(transport),
            Arc::new(MemoryCache::<QuoteKey, Value>::new()),
            config.cache_ttl.clone(),
        );

        Ok(Services {
            github,
            quotes: Arc::new(quotes),
            refresh: RefreshSettings::from(&config.refresh),
        })
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("stockwatch starting...");

    let config = AppConfig::load(config_path.map(PathBuf::from).as_ref())?;
    debug!("Loaded config: {config:#?}");

    let services = Services::from_config(&config)?;
    let editor = Editor::new(&services.github, services.quotes.as_ref(), &services.refresh);

    match command {
        AppCommand::Login { token, owner, repo } => {
            cli::auth::login(&services.github, &token, &owner, &repo).await
        }
        AppCommand::Logout => cli::auth::logout(&services.github),
        AppCommand::Search { query } => cli::search::run(services.quotes.as_ref(), &query).await,
        AppCommand::Add {
            ticker,
            since,
            labels,
            note,
        } => editor.add(&ticker, since, &labels, note.as_deref()).await,
        AppCommand::Remove { ticker } => editor.remove(&ticker).await,
        AppCommand::Rate { ticker, rating } => editor.rate(&ticker, rating).await,
        AppCommand::Label {
            ticker,
            add,
            remove,
        } => editor.label(&ticker, &add, &remove).await,
        AppCommand::Note { ticker, text } => editor.note(&ticker, &text).await,
        AppCommand::Since { ticker, date } => editor.since(&ticker, date).await,
        AppCommand::Show(options) => {
            cli::show::run(
                &services.github,
                services.quotes.as_ref(),
                &services.refresh,
                &options,
            )
            .await
        }
    }
}
