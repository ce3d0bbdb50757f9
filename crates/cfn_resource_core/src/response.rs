use serde::{Deserialize, Serialize};

use crate::contract::{RequestEnvelope, ResponseStatus};
use crate::outputs::ResourceOutputs;

const FALLBACK_PHYSICAL_ID: &str = "unidentified-custom-resource";

/// Body PUT to the pre-signed response URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ResponsePayload {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub no_echo: bool,
    pub data: ResourceOutputs,
}

/// Everything the builder reads, borrowed from whichever state the
/// invocation reached before it had to answer.
#[derive(Debug, Clone, Copy)]
pub struct ResponseParts<'a> {
    pub envelope: &'a RequestEnvelope,
    pub physical_resource_id: Option<&'a str>,
    pub no_echo: bool,
    pub data: &'a ResourceOutputs,
    pub log_stream_name: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltResponse {
    pub payload: ResponsePayload,
    /// Set when the physical id was empty and a fallback was used instead.
    pub substituted_physical_id: Option<String>,
}

pub fn default_reason(log_stream_name: &str) -> String {
    format!("See the details in CloudWatch Log Stream: {log_stream_name}")
}

pub fn failure_reason(resource_name: &str, message: &str, log_stream_name: &str) -> String {
    format!(
        "Custom resource {resource_name} failed due to exception \"{message}\". {}",
        default_reason(log_stream_name)
    )
}

pub fn build_response(
    parts: ResponseParts<'_>,
    status: ResponseStatus,
    reason: Option<&str>,
) -> BuiltResponse {
    let requested_id = parts
        .physical_resource_id
        .filter(|id| !id.trim().is_empty());
    let (physical_resource_id, substituted_physical_id) = match requested_id {
        Some(id) => (id.to_string(), None),
        None => {
            let fallback = fallback_physical_id(&parts);
            (fallback.clone(), Some(fallback))
        }
    };

    let reason = match reason {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => default_reason(parts.log_stream_name),
    };

    BuiltResponse {
        payload: ResponsePayload {
            status,
            reason,
            physical_resource_id,
            stack_id: parts.envelope.stack_id.clone(),
            request_id: parts.envelope.request_id.clone(),
            logical_resource_id: parts.envelope.logical_resource_id.clone(),
            no_echo: parts.no_echo,
            data: parts.data.clone(),
        },
        substituted_physical_id,
    }
}

pub fn payload_bytes(payload: &ResponsePayload) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(payload)
}

fn fallback_physical_id(parts: &ResponseParts<'_>) -> String {
    if !parts.log_stream_name.trim().is_empty() {
        return parts.log_stream_name.to_string();
    }
    let envelope = parts.envelope;
    match (
        envelope.logical_resource_id.is_empty(),
        envelope.request_id.is_empty(),
    ) {
        (false, false) => format!(
            "{}-{}",
            envelope.logical_resource_id, envelope.request_id
        ),
        (false, true) => envelope.logical_resource_id.clone(),
        (true, false) => envelope.request_id.clone(),
        (true, true) => FALLBACK_PHYSICAL_ID.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn envelope() -> RequestEnvelope {
        RequestEnvelope {
            response_url: Some("https://example/signed".to_string()),
            stack_id: "stack-1".to_string(),
            request_id: "req-1".to_string(),
            logical_resource_id: "MySum".to_string(),
            request_type: None,
            physical_resource_id: None,
        }
    }

    #[test]
    fn payload_serializes_every_protocol_field() {
        let envelope = envelope();
        let data = ResourceOutputs::from([("sum".to_string(), json!(5.0))]);
        let built = build_response(
            ResponseParts {
                envelope: &envelope,
                physical_resource_id: Some("phys-1"),
                no_echo: false,
                data: &data,
                log_stream_name: "2026/10/15/[$LATEST]abc",
            },
            ResponseStatus::Success,
            None,
        );

        let value: Value =
            serde_json::from_slice(&payload_bytes(&built.payload).expect("serialize"))
                .expect("payload should be JSON");
        assert_eq!(
            value,
            json!({
                "Status": "SUCCESS",
                "Reason": "See the details in CloudWatch Log Stream: 2026/10/15/[$LATEST]abc",
                "PhysicalResourceId": "phys-1",
                "StackId": "stack-1",
                "RequestId": "req-1",
                "LogicalResourceId": "MySum",
                "NoEcho": false,
                "Data": {"sum": 5.0}
            })
        );
        assert!(built.substituted_physical_id.is_none());
    }

    #[test]
    fn building_twice_is_byte_identical() {
        let envelope = envelope();
        let data = ResourceOutputs::from([
            ("zeta".to_string(), json!(1)),
            ("alpha".to_string(), json!({"nested": [1, 2]})),
        ]);
        let parts = ResponseParts {
            envelope: &envelope,
            physical_resource_id: Some("phys-1"),
            no_echo: true,
            data: &data,
            log_stream_name: "stream",
        };

        let first = payload_bytes(&build_response(parts, ResponseStatus::Failed, Some("boom")).payload)
            .expect("serialize");
        let second =
            payload_bytes(&build_response(parts, ResponseStatus::Failed, Some("boom")).payload)
                .expect("serialize");
        assert_eq!(first, second);
    }

    #[test]
    fn empty_physical_id_falls_back_to_log_stream_then_request_metadata() {
        let envelope = envelope();
        let data = ResourceOutputs::new();
        let mut parts = ResponseParts {
            envelope: &envelope,
            physical_resource_id: Some(""),
            no_echo: false,
            data: &data,
            log_stream_name: "stream-7",
        };

        let built = build_response(parts, ResponseStatus::Failed, None);
        assert_eq!(built.payload.physical_resource_id, "stream-7");
        assert_eq!(built.substituted_physical_id.as_deref(), Some("stream-7"));

        parts.log_stream_name = "";
        parts.physical_resource_id = None;
        let built = build_response(parts, ResponseStatus::Failed, None);
        assert_eq!(built.payload.physical_resource_id, "MySum-req-1");
    }

    #[test]
    fn failure_reason_points_at_the_log_stream() {
        let reason = failure_reason("SumResource", "server creation failed", "stream-1");
        assert_eq!(
            reason,
            "Custom resource SumResource failed due to exception \"server creation failed\". \
             See the details in CloudWatch Log Stream: stream-1"
        );
    }
}
