//! CloudFormation stack API
//!
//! Implements [`StackApi`] over `aws-sdk-cloudformation`. CloudFormation
//! reports a missing stack and an empty update as `ValidationError`s; both
//! are turned into regular results here.

use crate::error::{AwsError, Result};
use async_trait::async_trait;
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudformation::types::{Capability, Parameter};
use polaris_cloud::{StackApi, StackSnapshot, StackSpec, StackStatus};

const SERVICE: &str = "CloudFormation";

/// CloudFormation stacks of one account and region
#[derive(Debug, Clone)]
pub struct CloudFormationStacks {
    client: Client,
}

impl CloudFormationStacks {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    pub async fn describe(&self, name: &str) -> Result<Option<StackSnapshot>> {
        let output = match self.client.describe_stacks().stack_name(name).send().await {
            Ok(output) => output,
            Err(err) if is_missing_stack(err.code(), err.message()) => {
                tracing::debug!(stack = %name, "Stack does not exist");
                return Ok(None);
            }
            Err(err) => return Err(sdk_error("DescribeStacks", &err)),
        };

        let Some(stack) = output.stacks().first() else {
            return Ok(None);
        };
        let stack_id = stack
            .stack_id()
            .ok_or(AwsError::MissingField {
                operation: "DescribeStacks",
                field: "StackId",
            })?
            .to_string();
        let status = stack
            .stack_status()
            .map(|status| StackStatus::from(status.as_str()))
            .ok_or(AwsError::MissingField {
                operation: "DescribeStacks",
                field: "StackStatus",
            })?;
        tracing::debug!(stack = %name, %status, "Described stack");
        Ok(Some(StackSnapshot { stack_id, status }))
    }

    pub async fn create(&self, spec: &StackSpec) -> Result<String> {
        let output = self
            .client
            .create_stack()
            .stack_name(&spec.name)
            .template_url(&spec.template_url)
            .set_parameters(parameters(spec))
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await
            .map_err(|err| sdk_error("CreateStack", &err))?;
        output
            .stack_id()
            .map(str::to_string)
            .ok_or(AwsError::MissingField {
                operation: "CreateStack",
                field: "StackId",
            })
    }

    pub async fn update(&self, spec: &StackSpec) -> Result<Option<String>> {
        let result = self
            .client
            .update_stack()
            .stack_name(&spec.name)
            .template_url(&spec.template_url)
            .set_parameters(parameters(spec))
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await;
        match result {
            Ok(output) => output
                .stack_id()
                .map(|id| Some(id.to_string()))
                .ok_or(AwsError::MissingField {
                    operation: "UpdateStack",
                    field: "StackId",
                }),
            Err(err) if is_no_update(err.message()) => Ok(None),
            Err(err) => Err(sdk_error("UpdateStack", &err)),
        }
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.client
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(|err| sdk_error("DeleteStack", &err))?;
        Ok(())
    }
}

#[async_trait]
impl StackApi for CloudFormationStacks {
    async fn describe_stack(&self, name: &str) -> polaris_cloud::Result<Option<StackSnapshot>> {
        Ok(self.describe(name).await?)
    }

    async fn create_stack(&self, spec: &StackSpec) -> polaris_cloud::Result<String> {
        Ok(self.create(spec).await?)
    }

    async fn update_stack(&self, spec: &StackSpec) -> polaris_cloud::Result<Option<String>> {
        Ok(self.update(spec).await?)
    }

    async fn delete_stack(&self, name: &str) -> polaris_cloud::Result<()> {
        Ok(self.delete(name).await?)
    }
}

fn parameters(spec: &StackSpec) -> Option<Vec<Parameter>> {
    if spec.parameters.is_empty() {
        return None;
    }
    Some(
        spec.parameters
            .iter()
            .map(|(key, value)| {
                Parameter::builder()
                    .parameter_key(key)
                    .parameter_value(value)
                    .build()
            })
            .collect(),
    )
}

fn sdk_error<E>(operation: &'static str, err: &E) -> AwsError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    AwsError::Sdk {
        service: SERVICE,
        operation,
        message: err
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| DisplayErrorContext(err).to_string()),
    }
}

fn is_missing_stack(code: Option<&str>, message: Option<&str>) -> bool {
    code == Some("ValidationError") && message.is_some_and(|m| m.contains("does not exist"))
}

fn is_no_update(message: Option<&str>) -> bool {
    message.is_some_and(|m| m.contains("No updates are to be performed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_stack_detection() {
        assert!(is_missing_stack(
            Some("ValidationError"),
            Some("Stack with id polaris does not exist")
        ));
        assert!(!is_missing_stack(
            Some("ValidationError"),
            Some("Template format error")
        ));
        assert!(!is_missing_stack(Some("Throttling"), Some("does not exist")));
        assert!(!is_missing_stack(None, None));
    }

    #[test]
    fn test_no_update_detection() {
        assert!(is_no_update(Some("No updates are to be performed.")));
        assert!(!is_no_update(Some("Stack is in UPDATE_IN_PROGRESS state")));
        assert!(!is_no_update(None));
    }

    #[test]
    fn test_parameters() {
        assert!(parameters(&StackSpec::new("polaris", "https://t")).is_none());

        let spec = StackSpec::new("polaris", "https://t").with_parameter("ExternalId", "abc");
        let params = parameters(&spec).unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].parameter_key(), Some("ExternalId"));
        assert_eq!(params[0].parameter_value(), Some("abc"));
    }
}
