pub mod add;
pub mod regions;
pub mod remove;
pub mod show;

use crate::AwsArgs;
use anyhow::{Context as _, bail};
use colored::Colorize;
use polaris_cloud::{AccountIdentity, Feature, FeatureName, PermissionGroup, Region};
use std::collections::BTreeSet;

/// Account named on the command line, falling back to the AWS profile.
pub fn identity(account: Option<&str>, aws: &AwsArgs) -> anyhow::Result<AccountIdentity> {
    match (account, aws.profile.as_deref()) {
        (Some(account), _) => Ok(AccountIdentity::parse(account)),
        (None, Some(profile)) => Ok(AccountIdentity::Profile(profile.to_string())),
        (None, None) => bail!("An account or --profile is required"),
    }
}

/// Parse `name[:group+group...]`, e.g. `cloud-native-protection:basic`.
pub fn parse_feature(arg: &str) -> anyhow::Result<Feature> {
    let (name, groups) = match arg.split_once(':') {
        Some((name, groups)) => (name, Some(groups)),
        None => (arg, None),
    };
    let name: FeatureName = name
        .parse()
        .with_context(|| format!("Unknown feature '{name}'"))?;

    let mut feature = Feature::new(name);
    for group in groups.into_iter().flat_map(|g| g.split('+')) {
        let group = group.trim();
        if group.is_empty() {
            continue;
        }
        let permission_group = PermissionGroup::from_remote(&group.replace('-', "_"))
            .with_context(|| format!("Unknown permission group '{group}'"))?;
        feature.permission_groups.insert(permission_group);
    }
    Ok(feature)
}

pub fn parse_features(args: &[String]) -> anyhow::Result<Vec<Feature>> {
    let mut features: Vec<Feature> = Vec::with_capacity(args.len());
    for arg in args {
        let feature = parse_feature(arg)?;
        if features.iter().any(|f| f.same_name(&feature)) {
            bail!("Feature {} given more than once", feature.name);
        }
        features.push(feature);
    }
    Ok(features)
}

pub(crate) fn format_regions(regions: &BTreeSet<Region>) -> String {
    if regions.is_empty() {
        return "-".to_string();
    }
    regions
        .iter()
        .map(Region::code)
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn print_features(label: &str, features: &[Feature]) {
    if features.is_empty() {
        return;
    }
    println!("  {}", label.bold());
    for feature in features {
        println!("    • {}", feature.to_string().cyan());
    }
}
