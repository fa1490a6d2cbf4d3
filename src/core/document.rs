//! Markdown table form of the watchlist, as stored in the remote repository.
//!
//! Market-derived columns are written for people browsing the repository and
//! ignored on parse; they are recomputed after every load.

use crate::core::watchlist::{Derived, TrackedItem, Watchlist};
use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use rust_decimal::Decimal;

const TITLE: &str = "# Watchlist";
const HEADERS: [&str; 9] = [
    "Rating",
    "Ticker",
    "Name",
    "Since",
    "Labels",
    "Notes",
    "Price",
    "Return (%)",
    "3M (%)",
];
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Rating,
    Ticker,
    Name,
    Since,
    Labels,
    Notes,
    Ignored,
}

impl Column {
    fn from_header(header: &str) -> Self {
        match header.trim().to_lowercase().as_str() {
            "rating" | "stars" => Column::Rating,
            "ticker" | "symbol" => Column::Ticker,
            "name" => Column::Name,
            "since" | "date" | "watch since" => Column::Since,
            "labels" | "label" => Column::Labels,
            "notes" | "note" => Column::Notes,
            _ => Column::Ignored,
        }
    }
}

pub fn render(watchlist: &Watchlist) -> String {
    let mut out = format!("{TITLE}\n\n");
    out.push_str(&format!("| {} |\n", HEADERS.join(" | ")));
    out.push_str(&format!("|{}\n", "---|".repeat(HEADERS.len())));

    for (_, item) in watchlist.iter() {
        let labels = item.labels().collect::<Vec<_>>().join(", ");
        let cells = [
            item.rating().to_string(),
            escape_cell(&item.ticker),
            escape_cell(&item.display_name),
            item.watch_since.format(DATE_FORMAT).to_string(),
            escape_cell(&labels),
            escape_cell(&item.notes),
            format_derived(&item.quote.last_price, |p| format!("{p:.2}")),
            format_derived(&item.quote.return_since_watch, format_pct),
            format_derived(&item.quote.return_3m, format_pct),
        ];
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

/// Parses a rendered document. Blank or table-less content yields no items.
pub fn parse(content: &str) -> Result<Vec<TrackedItem>> {
    let mut columns: Option<Vec<Column>> = None;
    let mut items = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if !line.starts_with('|') {
            continue;
        }
        let cells = split_row(line);

        let Some(layout) = &columns else {
            let layout: Vec<Column> = cells.iter().map(|c| Column::from_header(c)).collect();
            if !layout.contains(&Column::Ticker) {
                bail!("Line {line_no}: table header has no Ticker column");
            }
            columns = Some(layout);
            continue;
        };

        if is_separator(&cells) {
            continue;
        }

        if let Some(item) = parse_row(layout, &cells)
            .with_context(|| format!("Failed to parse watchlist row on line {line_no}"))?
        {
            items.push(item);
        }
    }

    Ok(items)
}

fn parse_row(layout: &[Column], cells: &[String]) -> Result<Option<TrackedItem>> {
    let cell = |column: Column| -> &str {
        layout
            .iter()
            .position(|c| *c == column)
            .and_then(|i| cells.get(i))
            .map(|s| s.as_str())
            .unwrap_or("")
    };

    let ticker = cell(Column::Ticker).trim();
    if ticker.is_empty() {
        return Ok(None);
    }

    let since_raw = cell(Column::Since).trim();
    let since = NaiveDate::parse_from_str(since_raw, DATE_FORMAT)
        .map_err(|e| anyhow!("Invalid date '{}' for {}: {}", since_raw, ticker, e))?;

    let mut item = TrackedItem::new(ticker, cell(Column::Name), since);

    let rating_raw = cell(Column::Rating).trim();
    if !rating_raw.is_empty() {
        let rating: u8 = rating_raw
            .parse()
            .map_err(|_| anyhow!("Invalid rating '{}' for {}", rating_raw, ticker))?;
        item.set_rating(rating);
    }

    for label in cell(Column::Labels).split(',') {
        item.add_label(label);
    }
    item.notes = cell(Column::Notes).trim().to_string();

    Ok(Some(item))
}

fn format_derived<T: Copy>(value: &Derived<T>, format: impl Fn(T) -> String) -> String {
    value.value().map_or_else(|| "N/A".to_string(), format)
}

fn format_pct(value: Decimal) -> String {
    format!("{value:.2}")
}

/// Line breaks become `<br>`; a literal `<` is escaped so user text that
/// contains `<br>` is not read back as a line break.
fn escape_cell(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace('<', "\\<")
        .replace("\r\n", "\n")
        .replace('\n', "<br>")
}

/// Splits a table row on unescaped pipes and unescapes each cell.
fn split_row(line: &str) -> Vec<String> {
    let mut rest = line.strip_prefix('|').unwrap_or(line);
    let mut cells = Vec::new();
    let mut current = String::new();

    while let Some(c) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix("<br>") {
            current.push('\n');
            rest = after;
            continue;
        }
        rest = &rest[c.len_utf8()..];
        match c {
            '\\' => match rest.chars().next() {
                Some(next) => {
                    current.push(next);
                    rest = &rest[next.len_utf8()..];
                }
                None => current.push('\\'),
            },
            '|' => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    // trailing text after the last pipe only counts if the row was not closed
    if !current.trim().is_empty() {
        cells.push(current);
    }

    cells
        .into_iter()
        .map(|cell| cell.trim_matches(' ').to_string())
        .collect()
}

fn is_separator(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells.iter().all(|c| {
            let c = c.trim();
            !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':')
        })
}
