use super::ui;
use crate::core::persist::DocumentStore;
use crate::providers::github::GitHubClient;
use anyhow::{Context, Result};

/// Stores the credential, then checks it by loading the document once.
pub async fn login(github: &GitHubClient, token: &str, owner: &str, repo: &str) -> Result<()> {
    github.authenticate(token, owner, repo)?;

    let document = match github.load().await {
        Ok(document) => document,
        Err(e) => {
            github.logout()?;
            return Err(e).with_context(|| format!("Could not access {owner}/{repo}"));
        }
    };

    println!(
        "{} {}/{}",
        ui::style_text("Logged in to", ui::StyleType::Success),
        owner,
        repo
    );
    if !document.exists {
        println!(
            "{}",
            ui::style_text(
                "No watchlist there yet; it will be created on the first change",
                ui::StyleType::Subtle
            )
        );
    }
    Ok(())
}

pub fn logout(github: &GitHubClient) -> Result<()> {
    github.logout()?;
    println!("Logged out; credentials removed from this device");
    Ok(())
}
