use super::{load_watchlist, refresh_with_progress, ui};
use crate::core::autosave::{AutosaveOutcome, AutosaveTimer};
use crate::core::document;
use crate::core::persist::{DocumentStore, RemoteDocument};
use crate::core::quote::QuoteProvider;
use crate::core::refresh::RefreshSettings;
use crate::core::watchlist::{ItemId, TrackedItem, ViewOptions, Watchlist};
use anyhow::Result;
use chrono::{Local, NaiveDate};
use comfy_table::{Cell, Table};
use console::Term;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const AUTOSAVE_MESSAGE: &str = "Update watchlist quotes";

#[derive(Debug, Clone, Default)]
pub struct ShowOptions {
    /// Also list unrated items.
    pub all: bool,
    pub view: ViewOptions,
    /// Refresh again after this interval until interrupted.
    pub watch: Option<Duration>,
    /// Countdown before saving refreshed values back.
    pub autosave: Option<Duration>,
}

pub async fn run(
    store: &dyn DocumentStore,
    quotes: &dyn QuoteProvider,
    settings: &RefreshSettings,
    options: &ShowOptions,
) -> Result<()> {
    let term = Term::stdout();
    let mut round = 0;
    loop {
        let (list, remote) = load_watchlist(store).await?;
        let list = Mutex::new(list);
        let summary = refresh_with_progress(&list, quotes, settings).await;
        debug!("Refresh round {}: {:?}", round, summary);
        let list = list.into_inner();

        if round > 0 {
            let _ = term.clear_screen();
        }
        display(&list, options, Local::now().date_naive());

        if let Some(countdown) = options.autosave {
            let content = document::render(&list);
            if needs_save(&remote, &list, &content)
                && let Err(e) = autosave(store, &content, countdown).await
            {
                if options.watch.is_none() {
                    return Err(e);
                }
                warn!("Autosave failed: {:#}", e);
                println!("{}", ui::style_text(&format!("Autosave failed: {e:#}"), ui::StyleType::Error));
            }
        }

        let Some(interval) = options.watch else {
            break;
        };
        println!(
            "{}",
            ui::style_text(
                &format!("Refreshing every {}s; Ctrl-C to stop", interval.as_secs()),
                ui::StyleType::Subtle
            )
        );
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        round += 1;
    }
    Ok(())
}

/// An absent document is only created once there is something to store.
fn needs_save(remote: &RemoteDocument, list: &Watchlist, content: &str) -> bool {
    if !remote.exists {
        return !list.is_empty();
    }
    remote.content.as_deref() != Some(content)
}

async fn autosave(store: &dyn DocumentStore, content: &str, countdown: Duration) -> Result<()> {
    let term = Term::stderr();
    let ticker_term = term.clone();
    let mut timer = AutosaveTimer::start(countdown, Duration::from_secs(1), move |left| {
        let _ = ticker_term.clear_line();
        let _ = ticker_term.write_str(&format!(
            "Autosaving in {}s (Ctrl-C to cancel)",
            left.as_secs_f64().ceil() as u64
        ));
    });

    let finished = tokio::select! {
        outcome = timer.wait() => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    let outcome = match finished {
        Some(outcome) => outcome,
        None => {
            timer.cancel();
            timer.wait().await
        }
    };
    let _ = term.clear_line();

    match outcome {
        AutosaveOutcome::Cancelled => {
            println!("{}", ui::style_text("Autosave cancelled", ui::StyleType::Subtle));
            Ok(())
        }
        AutosaveOutcome::Fired => {
            let version = store.save(content, AUTOSAVE_MESSAGE).await?;
            println!(
                "{} {}",
                ui::style_text("Saved:", ui::StyleType::Success),
                ui::style_text(&version.chars().take(7).collect::<String>(), ui::StyleType::Subtle)
            );
            Ok(())
        }
    }
}

fn display(list: &Watchlist, options: &ShowOptions, today: NaiveDate) {
    let view = list.view(&options.view);
    if view.rated.is_empty() && view.unrated.is_empty() {
        if list.is_empty() {
            println!("The watchlist is empty; add a ticker with `stockwatch add <TICKER>`");
        } else {
            let known = list.all_labels().into_iter().collect::<Vec<_>>().join(", ");
            println!("No items carry the selected labels (known labels: {known})");
        }
        return;
    }

    if !view.rated.is_empty() {
        println!("{}", build_table(&view.rated, today));
    }

    if view.unrated.is_empty() {
        return;
    }
    if options.all {
        println!("\n{}", ui::style_text("Unrated", ui::StyleType::Title));
        println!("{}", build_table(&view.unrated, today));
    } else {
        println!(
            "{}",
            ui::style_text(
                &format!(
                    "{} unrated item(s) hidden; use --all to show them",
                    view.unrated.len()
                ),
                ui::StyleType::Subtle
            )
        );
    }
}

fn build_table(rows: &[(ItemId, &TrackedItem)], today: NaiveDate) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("#"),
        ui::header_cell("Rating"),
        ui::header_cell("Ticker"),
        ui::header_cell("Name"),
        ui::header_cell("Since"),
        ui::header_cell("Labels"),
        ui::header_cell("Notes"),
        ui::header_cell("Price"),
        ui::header_cell("Return"),
        ui::header_cell("3M"),
    ]);

    for (id, item) in rows {
        table.add_row(vec![
            Cell::new(id),
            ui::rating_cell(item.rating()),
            Cell::new(&item.ticker),
            Cell::new(&item.display_name),
            Cell::new(format!(
                "{} ({})",
                item.watch_since,
                ui::time_ago(item.watch_since, today)
            )),
            Cell::new(item.labels().collect::<Vec<_>>().join(", ")),
            Cell::new(ui::shorten_note(&item.notes)),
            ui::derived_cell(&item.quote.last_price, ui::price_cell),
            ui::derived_cell(&item.quote.return_since_watch, ui::change_cell),
            ui::derived_cell(&item.quote.return_3m, ui::change_cell),
        ]);
    }
    table
}
