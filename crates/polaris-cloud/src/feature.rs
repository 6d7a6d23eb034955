//! Feature catalog
//!
//! Static knowledge about the features the SDK understands: their remote
//! names, permission groups, data-plane disable jobs and the ordering
//! constraints that apply when removing several features from one account.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Features recognized by this SDK. Remote feature names outside this set are
/// dropped when converting control plane responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureName {
    CloudDiscovery,
    CloudNativeArchival,
    CloudNativeDynamoDbProtection,
    CloudNativeProtection,
    CloudNativeS3Protection,
    Exocompute,
    KubernetesProtection,
    Outpost,
    RdsProtection,
    ServersAndApps,
}

impl FeatureName {
    pub const ALL: &'static [FeatureName] = &[
        FeatureName::CloudDiscovery,
        FeatureName::CloudNativeArchival,
        FeatureName::CloudNativeDynamoDbProtection,
        FeatureName::CloudNativeProtection,
        FeatureName::CloudNativeS3Protection,
        FeatureName::Exocompute,
        FeatureName::KubernetesProtection,
        FeatureName::Outpost,
        FeatureName::RdsProtection,
        FeatureName::ServersAndApps,
    ];

    /// Name used by the control plane
    pub fn remote_name(&self) -> &'static str {
        match self {
            FeatureName::CloudDiscovery => "CLOUD_DISCOVERY",
            FeatureName::CloudNativeArchival => "CLOUD_NATIVE_ARCHIVAL",
            FeatureName::CloudNativeDynamoDbProtection => "CLOUD_NATIVE_DYNAMODB_PROTECTION",
            FeatureName::CloudNativeProtection => "CLOUD_NATIVE_PROTECTION",
            FeatureName::CloudNativeS3Protection => "CLOUD_NATIVE_S3_PROTECTION",
            FeatureName::Exocompute => "EXOCOMPUTE",
            FeatureName::KubernetesProtection => "KUBERNETES_PROTECTION",
            FeatureName::Outpost => "OUTPOST",
            FeatureName::RdsProtection => "RDS_PROTECTION",
            FeatureName::ServersAndApps => "SERVERS_AND_APPS",
        }
    }

    pub fn from_remote(name: &str) -> Option<FeatureName> {
        FeatureName::ALL
            .iter()
            .copied()
            .find(|f| f.remote_name().eq_ignore_ascii_case(name))
    }

    /// Data-plane disable job for features that protect live data.
    pub fn disable_job(&self) -> Option<ProtectionJob> {
        match self {
            FeatureName::CloudNativeProtection => Some(ProtectionJob::Ec2),
            FeatureName::RdsProtection => Some(ProtectionJob::Rds),
            FeatureName::CloudNativeS3Protection => Some(ProtectionJob::S3),
            FeatureName::CloudNativeDynamoDbProtection => Some(ProtectionJob::DynamoDb),
            _ => None,
        }
    }

    pub fn class(&self) -> FeatureClass {
        match self {
            FeatureName::CloudDiscovery => FeatureClass::Discovery,
            FeatureName::Outpost => FeatureClass::Outpost,
            name if name.disable_job().is_some() => FeatureClass::Protection,
            _ => FeatureClass::Control,
        }
    }
}

impl std::fmt::Display for FeatureName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.remote_name())
    }
}

impl std::str::FromStr for FeatureName {
    type Err = crate::CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        FeatureName::from_remote(&normalized)
            .or_else(|| {
                // Accept CamelCase spellings such as `CloudNativeProtection`.
                FeatureName::ALL.iter().copied().find(|f| {
                    f.remote_name().replace('_', "").eq_ignore_ascii_case(&normalized)
                })
            })
            .ok_or_else(|| crate::CloudError::InvalidFeature(s.to_string()))
    }
}

/// How a feature behaves during removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureClass {
    /// Protects live data; removal starts a disable job first.
    Protection,
    /// No data-plane job; removal goes straight to prepare-deletion.
    Control,
    /// Provides the visibility other features rely on; removed last.
    Discovery,
    /// May live on a different native account than the rest of a request.
    Outpost,
}

/// Sub-feature targeted by a data-plane disable job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtectionJob {
    #[serde(rename = "EC2")]
    Ec2,
    #[serde(rename = "RDS")]
    Rds,
    #[serde(rename = "S3")]
    S3,
    #[serde(rename = "DYNAMODB")]
    DynamoDb,
}

impl ProtectionJob {
    pub fn remote_name(&self) -> &'static str {
        match self {
            ProtectionJob::Ec2 => "EC2",
            ProtectionJob::Rds => "RDS",
            ProtectionJob::S3 => "S3",
            ProtectionJob::DynamoDb => "DYNAMODB",
        }
    }
}

/// Permission group of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionGroup {
    Basic,
    CloudClusterEs,
    ExportAndRestore,
    FileLevelRecovery,
    PrivateEndpoint,
    RscManagedCluster,
    SnapshotPrivateAccess,
}

impl PermissionGroup {
    pub const ALL: &'static [PermissionGroup] = &[
        PermissionGroup::Basic,
        PermissionGroup::CloudClusterEs,
        PermissionGroup::ExportAndRestore,
        PermissionGroup::FileLevelRecovery,
        PermissionGroup::PrivateEndpoint,
        PermissionGroup::RscManagedCluster,
        PermissionGroup::SnapshotPrivateAccess,
    ];

    pub fn remote_name(&self) -> &'static str {
        match self {
            PermissionGroup::Basic => "BASIC",
            PermissionGroup::CloudClusterEs => "CLOUD_CLUSTER_ES",
            PermissionGroup::ExportAndRestore => "EXPORT_AND_RESTORE",
            PermissionGroup::FileLevelRecovery => "FILE_LEVEL_RECOVERY",
            PermissionGroup::PrivateEndpoint => "PRIVATE_ENDPOINT",
            PermissionGroup::RscManagedCluster => "RSC_MANAGED_CLUSTER",
            PermissionGroup::SnapshotPrivateAccess => "SNAPSHOT_PRIVATE_ACCESS",
        }
    }

    pub fn from_remote(name: &str) -> Option<PermissionGroup> {
        PermissionGroup::ALL
            .iter()
            .copied()
            .find(|g| g.remote_name().eq_ignore_ascii_case(name))
    }
}

/// A feature together with the permission groups it was requested with.
///
/// Two features are equal when both the name and the permission groups match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feature {
    pub name: FeatureName,
    #[serde(default)]
    pub permission_groups: BTreeSet<PermissionGroup>,
}

impl Feature {
    pub fn new(name: FeatureName) -> Self {
        Self {
            name,
            permission_groups: BTreeSet::new(),
        }
    }

    pub fn with_permission_groups(
        mut self,
        groups: impl IntoIterator<Item = PermissionGroup>,
    ) -> Self {
        self.permission_groups.extend(groups);
        self
    }

    /// Build a feature from a control plane response. Returns `None` for
    /// feature names outside the catalog; unknown permission groups are
    /// skipped for the same reason.
    pub fn from_remote<S: AsRef<str>>(name: &str, groups: &[S]) -> Option<Feature> {
        let name = FeatureName::from_remote(name)?;
        let permission_groups = groups
            .iter()
            .filter_map(|g| PermissionGroup::from_remote(g.as_ref()))
            .collect();
        Some(Feature {
            name,
            permission_groups,
        })
    }

    /// Whether this feature refers to the same catalog entry, ignoring
    /// permission groups.
    pub fn same_name(&self, other: &Feature) -> bool {
        self.name == other.name
    }

    pub fn class(&self) -> FeatureClass {
        self.name.class()
    }
}

impl From<FeatureName> for Feature {
    fn from(name: FeatureName) -> Self {
        Feature::new(name)
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.permission_groups.is_empty() {
            let groups: Vec<&str> = self
                .permission_groups
                .iter()
                .map(PermissionGroup::remote_name)
                .collect();
            write!(f, "({})", groups.join(","))?;
        }
        Ok(())
    }
}

/// Status of a feature as reported by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureStatus {
    Connecting,
    Connected,
    Disabled,
    MissingPermissions,
    Disconnected,
}

impl FeatureStatus {
    pub fn from_remote(status: &str) -> Option<FeatureStatus> {
        match status.to_ascii_uppercase().as_str() {
            "CONNECTING" => Some(FeatureStatus::Connecting),
            "CONNECTED" => Some(FeatureStatus::Connected),
            "DISABLED" => Some(FeatureStatus::Disabled),
            "MISSING_PERMISSIONS" => Some(FeatureStatus::MissingPermissions),
            "DISCONNECTED" => Some(FeatureStatus::Disconnected),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureStatus::Connecting => write!(f, "connecting"),
            FeatureStatus::Connected => write!(f, "connected"),
            FeatureStatus::Disabled => write!(f, "disabled"),
            FeatureStatus::MissingPermissions => write!(f, "missing permissions"),
            FeatureStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Order features for removal. The relative order of the input is kept,
/// except that the discovery feature always moves to the end.
pub fn order_for_removal(features: &[Feature]) -> Vec<Feature> {
    let (discovery, rest): (Vec<&Feature>, Vec<&Feature>) = features
        .iter()
        .partition(|f| f.class() == FeatureClass::Discovery);
    rest.into_iter().chain(discovery).cloned().collect()
}

/// Split a request into the outpost feature, which is onboarded against its
/// own native account, and everything else.
pub fn split_outpost(features: &[Feature]) -> (Option<Feature>, Vec<Feature>) {
    let outpost = features
        .iter()
        .find(|f| f.class() == FeatureClass::Outpost)
        .cloned();
    let rest = features
        .iter()
        .filter(|f| f.class() != FeatureClass::Outpost)
        .cloned()
        .collect();
    (outpost, rest)
}
