//! Read views of cloud accounts as reported by the control plane
//!
//! These values are never mutated locally. After every saga step that
//! changes remote state the orchestrator fetches a fresh copy.

use crate::feature::{Feature, FeatureStatus};
use crate::region::Region;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Cloud account registered with the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudAccount {
    /// Platform account ID
    pub id: Uuid,

    /// Native (AWS) account ID
    pub native_id: String,

    /// Display name, shared by all features of the account
    pub name: String,

    /// Features currently registered for the account
    pub features: Vec<FeatureState>,
}

impl CloudAccount {
    /// Look up a feature by name. Permission groups are not compared since
    /// the control plane reports the groups actually granted.
    pub fn feature(&self, feature: &Feature) -> Option<&FeatureState> {
        self.features
            .iter()
            .find(|f| f.feature.same_name(feature))
    }

    pub fn has_feature(&self, feature: &Feature) -> bool {
        self.feature(feature).is_some()
    }
}

/// State of one feature on an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureState {
    pub feature: Feature,
    pub regions: BTreeSet<Region>,
    pub role_arn: String,
    pub stack_arn: String,
    pub status: FeatureStatus,
}

impl FeatureState {
    pub fn is_connected(&self) -> bool {
        self.status == FeatureStatus::Connected
    }

    /// Whether there is nothing left to disable for this feature.
    pub fn is_inactive(&self) -> bool {
        matches!(
            self.status,
            FeatureStatus::Disabled | FeatureStatus::Connecting
        )
    }

    /// Name of the CloudFormation stack backing the feature, taken from the
    /// stack ARN (`arn:aws:cloudformation:<region>:<account>:stack/<name>/<id>`).
    pub fn stack_name(&self) -> Option<&str> {
        self.stack_arn
            .split_once(":stack/")
            .map(|(_, rest)| rest.split('/').next().unwrap_or(rest))
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureName, PermissionGroup};

    fn state(name: FeatureName, status: FeatureStatus) -> FeatureState {
        FeatureState {
            feature: Feature::new(name).with_permission_groups([PermissionGroup::Basic]),
            regions: [Region::UsEast2].into_iter().collect(),
            role_arn: String::new(),
            stack_arn: "arn:aws:cloudformation:us-east-2:123456789012:stack/rubrik-polaris/0a1b2c"
                .to_string(),
            status,
        }
    }

    #[test]
    fn test_feature_lookup_ignores_permission_groups() {
        let account = CloudAccount {
            id: Uuid::new_v4(),
            native_id: "123456789012".to_string(),
            name: "prod".to_string(),
            features: vec![state(FeatureName::Exocompute, FeatureStatus::Connected)],
        };

        assert!(account.has_feature(&Feature::new(FeatureName::Exocompute)));
        assert!(!account.has_feature(&Feature::new(FeatureName::CloudNativeProtection)));
    }

    #[test]
    fn test_stack_name_from_arn() {
        let s = state(FeatureName::Exocompute, FeatureStatus::Connected);
        assert_eq!(s.stack_name(), Some("rubrik-polaris"));

        let mut missing = s.clone();
        missing.stack_arn = String::new();
        assert_eq!(missing.stack_name(), None);
    }

    #[test]
    fn test_inactive_statuses() {
        assert!(state(FeatureName::Exocompute, FeatureStatus::Disabled).is_inactive());
        assert!(state(FeatureName::Exocompute, FeatureStatus::Connecting).is_inactive());
        assert!(!state(FeatureName::Exocompute, FeatureStatus::MissingPermissions).is_inactive());
    }
}
