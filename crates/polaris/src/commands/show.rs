use super::format_regions;
use crate::session::Session;
use colored::Colorize;
use polaris_cloud::{AccountIdentity, CloudAccount, FeatureStatus};

pub async fn handle_show(session: &Session, identity: &AccountIdentity) -> anyhow::Result<()> {
    let account = session.orchestrator().account(identity).await?;

    println!("{}", account.name.bold());
    println!("  Account ID:  {}", account.native_id.cyan());
    println!("  Platform ID: {}", account.id.to_string().dimmed());
    println!();

    if account.features.is_empty() {
        println!("{}", "No features".dimmed());
        return Ok(());
    }
    println!(
        "{}",
        format!("{:<36} {:<20} {:<30} {}", "FEATURE", "STATUS", "STACK", "REGIONS").bold()
    );
    println!("{}", "─".repeat(110).dimmed());
    for state in &account.features {
        let status = format!("{:<20}", state.status.to_string());
        let status = match state.status {
            FeatureStatus::Connected => status.green(),
            FeatureStatus::Connecting => status.yellow(),
            _ => status.red(),
        };
        println!(
            "{:<36} {} {:<30} {}",
            state.feature.to_string().cyan(),
            status,
            state.stack_name().unwrap_or("-"),
            format_regions(&state.regions)
        );
    }
    Ok(())
}

pub async fn handle_list(session: &Session, filter: &str) -> anyhow::Result<()> {
    let accounts = session.orchestrator().accounts(filter).await?;
    if accounts.is_empty() {
        println!("{}", "No accounts".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!("{:<14} {:<30} {:<38} {}", "ACCOUNT", "NAME", "PLATFORM ID", "FEATURES").bold()
    );
    println!("{}", "─".repeat(110).dimmed());
    for account in &accounts {
        println!(
            "{:<14} {:<30} {:<38} {}",
            account.native_id.cyan(),
            account.name,
            account.id.to_string().dimmed(),
            feature_names(account)
        );
    }
    Ok(())
}

fn feature_names(account: &CloudAccount) -> String {
    account
        .features
        .iter()
        .map(|state| state.feature.name.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
