use std::sync::Arc;

use cfn_resource_lambda::config::HandlerConfig;
use cfn_resource_lambda::handlers::context::RuntimeContext;
use cfn_resource_lambda::handlers::dispatcher::Dispatcher;
use cfn_resource_lambda::logging::MemorySink;
use serde_json::{json, Value};

use super::fakes::{MemoryLogStore, RecordingTransport};

pub const STACK_ID: &str =
    "arn:aws:cloudformation:us-east-1:123456789012:stack/demo-stack/6a1e5f30-5d1b-11ef-9a47-0a1b2c3d4e5f";
pub const RESPONSE_URL: &str =
    "https://cloudformation-custom-resource-response-useast1.s3.amazonaws.com/signed?X-Amz-Signature=abc";
pub const LOG_GROUP: &str = "/aws/lambda/demo-stack-SumFunction";
pub const LOG_STREAM: &str = "2026/10/15/[$LATEST]3f6c2a9b7d8e4f10";
pub const RESOURCE_TYPE: &str = "Custom::Sum";

pub fn lifecycle_event(request_type: &str, properties: Value) -> Value {
    let mut event = json!({
        "RequestType": request_type,
        "ResponseURL": RESPONSE_URL,
        "StackId": STACK_ID,
        "RequestId": "8a4f8c0e-1111-4e2b-9d55-7c1f0e2a3b4c",
        "ResourceType": RESOURCE_TYPE,
        "LogicalResourceId": "MySum",
        "ResourceProperties": properties,
    });
    if request_type != "Create" {
        event["PhysicalResourceId"] = json!("demostack-MySum-EXISTING0001");
    }
    if request_type == "Update" {
        event["OldResourceProperties"] = json!({"key1": "1"});
    }
    event
}

pub fn runtime(execution_id: &str) -> RuntimeContext {
    RuntimeContext {
        execution_id: execution_id.to_string(),
        function_name: "demo-stack-SumFunction".to_string(),
        invoked_function_arn: "arn:aws:lambda:us-east-1:123456789012:function:demo-stack-SumFunction"
            .to_string(),
        log_group_name: LOG_GROUP.to_string(),
        log_stream_name: LOG_STREAM.to_string(),
        deadline_ms: None,
        ..RuntimeContext::default()
    }
}

/// Dispatcher wired to in-memory collaborators.
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub transport: Arc<RecordingTransport>,
    pub log_store: Arc<MemoryLogStore>,
    pub sink: MemorySink,
}

impl Harness {
    pub fn new(config: HandlerConfig) -> Self {
        Self::with_parts(
            config,
            RecordingTransport::default(),
            MemoryLogStore::default(),
        )
    }

    pub fn with_parts(
        config: HandlerConfig,
        transport: RecordingTransport,
        log_store: MemoryLogStore,
    ) -> Self {
        let transport = Arc::new(transport);
        let log_store = Arc::new(log_store);
        let sink = MemorySink::new();
        let dispatcher = Dispatcher::new(
            config,
            transport.clone(),
            log_store.clone(),
            Arc::new(sink.clone()),
        );
        Self {
            dispatcher,
            transport,
            log_store,
            sink,
        }
    }
}
