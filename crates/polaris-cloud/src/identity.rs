//! Account identity resolution
//!
//! Turns a user supplied account reference into the native account ID the
//! control plane and the stack API operate on.

use crate::context::Context;
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Reference to a cloud account as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountIdentity {
    /// Native AWS account ID (12 decimal digits)
    NativeId(String),
    /// Platform (control plane) account ID
    PlatformId(Uuid),
    /// IAM role ARN, the account ID is taken from the ARN
    RoleArn(String),
    /// Named profile, resolved through an [`IdentityResolver`]
    Profile(String),
}

impl AccountIdentity {
    /// Interpret a free-form reference: a UUID is a platform ID, an ARN is a
    /// role, 12 digits is a native ID, anything else a profile name.
    pub fn parse(reference: &str) -> AccountIdentity {
        let reference = reference.trim();
        if let Ok(id) = Uuid::parse_str(reference) {
            AccountIdentity::PlatformId(id)
        } else if reference.starts_with("arn:") {
            AccountIdentity::RoleArn(reference.to_string())
        } else if !reference.is_empty() && reference.bytes().all(|b| b.is_ascii_digit()) {
            AccountIdentity::NativeId(reference.to_string())
        } else {
            AccountIdentity::Profile(reference.to_string())
        }
    }
}

impl std::fmt::Display for AccountIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountIdentity::NativeId(id) => write!(f, "account {id}"),
            AccountIdentity::PlatformId(id) => write!(f, "platform account {id}"),
            AccountIdentity::RoleArn(arn) => write!(f, "role {arn}"),
            AccountIdentity::Profile(profile) => write!(f, "profile {profile}"),
        }
    }
}

/// Resolved account identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub native_id: String,
    /// Set when the caller referenced the account by its platform ID.
    pub platform_id: Option<Uuid>,
}

impl ResolvedIdentity {
    pub fn is_platform_id(&self) -> bool {
        self.platform_id.is_some()
    }
}

/// Resolves identities that need the cloud provider, e.g. profiles.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Native account ID behind a named profile
    async fn native_id_for_profile(&self, profile: &str) -> Result<String>;
}

/// An identity borrowed for one saga invocation. Resolution happens on first
/// use and the result is kept until the value is dropped.
pub struct AccountRef<'a> {
    identity: &'a AccountIdentity,
    resolved: OnceCell<ResolvedIdentity>,
}

impl<'a> AccountRef<'a> {
    pub fn new(identity: &'a AccountIdentity) -> Self {
        Self {
            identity,
            resolved: OnceCell::new(),
        }
    }

    pub fn identity(&self) -> &AccountIdentity {
        self.identity
    }

    pub async fn resolve(&self, ctx: &Context) -> Result<&ResolvedIdentity> {
        self.resolved
            .get_or_try_init(|| resolve(ctx, self.identity))
            .await
    }
}

async fn resolve(ctx: &Context, identity: &AccountIdentity) -> Result<ResolvedIdentity> {
    match identity {
        AccountIdentity::NativeId(id) => Ok(ResolvedIdentity {
            native_id: validate_native_id(id)?.to_string(),
            platform_id: None,
        }),
        AccountIdentity::RoleArn(arn) => Ok(ResolvedIdentity {
            native_id: native_id_from_role_arn(arn)?.to_string(),
            platform_id: None,
        }),
        AccountIdentity::PlatformId(id) => {
            tracing::debug!(platform_id = %id, "Resolving platform account ID");
            let account = ctx
                .control_plane()
                .account_by_id(*id)
                .await?
                .ok_or_else(|| CloudError::NotFound(format!("platform account {id}")))?;
            Ok(ResolvedIdentity {
                native_id: validate_native_id(&account.native_id)?.to_string(),
                platform_id: Some(*id),
            })
        }
        AccountIdentity::Profile(profile) => {
            let resolver = ctx.identity_resolver().ok_or_else(|| {
                CloudError::InvalidIdentity(format!(
                    "profile {profile} cannot be resolved without an identity resolver"
                ))
            })?;
            let native_id = resolver.native_id_for_profile(profile).await?;
            Ok(ResolvedIdentity {
                native_id: validate_native_id(&native_id)?.to_string(),
                platform_id: None,
            })
        }
    }
}

/// Check that a native AWS account ID is exactly 12 decimal digits.
pub fn validate_native_id(id: &str) -> Result<&str> {
    if id.len() == 12 && id.bytes().all(|b| b.is_ascii_digit()) {
        Ok(id)
    } else {
        Err(CloudError::InvalidIdentity(format!(
            "invalid AWS account id: {id:?}"
        )))
    }
}

/// Extract the account ID from `arn:<partition>:iam::<account>:role/<name>`.
pub fn native_id_from_role_arn(arn: &str) -> Result<&str> {
    let invalid = || CloudError::InvalidIdentity(format!("invalid role ARN: {arn:?}"));

    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    if parts.len() != 6 || parts[0] != "arn" || parts[2] != "iam" || !parts[3].is_empty() {
        return Err(invalid());
    }
    if !matches!(parts[1], "aws" | "aws-cn" | "aws-us-gov") {
        return Err(invalid());
    }
    match parts[5].strip_prefix("role/") {
        Some(name) if !name.is_empty() => {}
        _ => return Err(invalid()),
    }
    validate_native_id(parts[4]).map_err(|_| invalid())
}
