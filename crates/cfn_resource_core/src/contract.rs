use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CUSTOM_RESOURCE_PREFIX: &str = "Custom::";
pub const GENERIC_CUSTOM_RESOURCE_TYPE: &str = "AWS::CloudFormation::CustomResource";

pub type Properties = Map<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "Create" => Some(Self::Create),
            "Update" => Some(Self::Update),
            "Delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

impl ResponseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle request exactly as CloudFormation delivers it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleRequest {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub resource_type: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<Properties>,
}

/// Correlation fields pulled out of a raw event without strict validation.
///
/// A request that fails [`parse_request`] still has to be answered, and the
/// answer can only be addressed with whatever these fields hold.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub response_url: Option<String>,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub request_type: Option<RequestType>,
    pub physical_resource_id: Option<String>,
}

impl RequestEnvelope {
    pub fn from_event(event: &Value) -> Self {
        let text = |key: &str| event.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            response_url: text("ResponseURL").filter(|url| !url.trim().is_empty()),
            stack_id: text("StackId").unwrap_or_default(),
            request_id: text("RequestId").unwrap_or_default(),
            logical_resource_id: text("LogicalResourceId").unwrap_or_default(),
            request_type: text("RequestType")
                .as_deref()
                .and_then(RequestType::from_wire),
            physical_resource_id: text("PhysicalResourceId").filter(|id| !id.trim().is_empty()),
        }
    }
}

impl From<&LifecycleRequest> for RequestEnvelope {
    fn from(request: &LifecycleRequest) -> Self {
        Self {
            response_url: Some(request.response_url.clone()),
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            request_type: Some(request.request_type),
            physical_resource_id: request.physical_resource_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("lifecycle request must be a JSON object")]
    NotAnObject,
    #[error("malformed lifecycle request: {0}")]
    Malformed(String),
    #[error("{request_type} request is missing PhysicalResourceId")]
    MissingPhysicalResourceId { request_type: RequestType },
    #[error("resource type '{resource_type}' is not handled by this function")]
    UnsupportedResourceType { resource_type: String },
}

impl ProtocolError {
    /// Whether a Delete rejected with this error may still be reported as
    /// SUCCESS under delete-failure hiding. A Delete without a physical id
    /// names no resource, so there is nothing to pretend was removed.
    pub fn is_hideable_on_delete(&self) -> bool {
        !matches!(
            self,
            Self::NotAnObject | Self::MissingPhysicalResourceId { .. }
        )
    }
}

pub fn parse_request(event: &Value) -> Result<LifecycleRequest, ProtocolError> {
    if !event.is_object() {
        return Err(ProtocolError::NotAnObject);
    }

    let request = LifecycleRequest::deserialize(event)
        .map_err(|error| ProtocolError::Malformed(error.to_string()))?;

    if request.response_url.trim().is_empty() {
        return Err(ProtocolError::Malformed(
            "ResponseURL cannot be empty".to_string(),
        ));
    }

    let has_physical_id = request
        .physical_resource_id
        .as_deref()
        .is_some_and(|id| !id.trim().is_empty());
    if request.request_type != RequestType::Create && !has_physical_id {
        return Err(ProtocolError::MissingPhysicalResourceId {
            request_type: request.request_type,
        });
    }

    Ok(request)
}

/// Prefix `Custom::` unless the name already carries it or is the generic type.
pub fn normalize_resource_type(resource_type: &str) -> String {
    let trimmed = resource_type.trim();
    if trimmed.starts_with(CUSTOM_RESOURCE_PREFIX) || trimmed == GENERIC_CUSTOM_RESOURCE_TYPE {
        trimmed.to_string()
    } else {
        format!("{CUSTOM_RESOURCE_PREFIX}{trimmed}")
    }
}

/// An empty accepted list means the function serves any resource type.
pub fn check_resource_type(
    request: &LifecycleRequest,
    accepted: &[String],
) -> Result<(), ProtocolError> {
    if accepted.is_empty() || accepted.iter().any(|value| value == &request.resource_type) {
        return Ok(());
    }
    Err(ProtocolError::UnsupportedResourceType {
        resource_type: request.resource_type.clone(),
    })
}
