//! AWS collaborators for polaris-cloud
//!
//! - [`CloudFormationStacks`]: the customer stack, via CloudFormation
//! - [`StsIdentityResolver`]: profile to account ID, via STS
//!
//! Credentials come from the default AWS provider chain, optionally
//! narrowed to a named profile.
//!
//! # Example
//!
//! ```ignore
//! use polaris_cloud_aws::{CloudFormationStacks, load_config};
//!
//! let config = load_config(Some("production"), None).await;
//! let stacks = CloudFormationStacks::new(&config);
//! ```

pub mod cloudformation;
pub mod error;
pub mod sts;

pub use cloudformation::CloudFormationStacks;
pub use error::{AwsError, Result};
pub use sts::StsIdentityResolver;

/// Load the SDK configuration from the environment, a named profile and an
/// optional region override.
pub async fn load_config(profile: Option<&str>, region: Option<&str>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    let config = loader.load().await;
    tracing::debug!(
        profile = profile.unwrap_or("default"),
        region = ?config.region(),
        "Loaded AWS configuration"
    );
    config
}
