use super::format_regions;
use crate::session::Session;
use colored::Colorize;
use polaris_cloud::{AccountIdentity, Feature, Region};

pub async fn handle(
    session: &Session,
    identity: &AccountIdentity,
    feature: &Feature,
    regions: &[Region],
) -> anyhow::Result<()> {
    let account = session
        .orchestrator()
        .update_regions(identity, feature, regions)
        .await?;

    let regions = account
        .feature(feature)
        .map(|state| format_regions(&state.regions))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{} {} on {}: {}",
        "✓ Updated".green(),
        feature.name.to_string().cyan(),
        account.native_id.cyan(),
        regions
    );
    Ok(())
}
