use super::ui;
use crate::core::quote::QuoteProvider;
use anyhow::Result;

pub async fn run(quotes: &dyn QuoteProvider, query: &str) -> Result<()> {
    let results = quotes.search_tickers(query).await;
    if results.is_empty() {
        println!("No tickers match '{}'", query.trim());
        return Ok(());
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Symbol"), ui::header_cell("Name")]);
    for result in &results {
        table.add_row(vec![result.symbol.as_str(), result.name.as_str()]);
    }
    println!("{table}");
    Ok(())
}
