use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cfn_resource_core::contract::{LifecycleRequest, Properties, RequestEnvelope, RequestType};
use cfn_resource_core::outputs::ResourceOutputs;
use cfn_resource_core::response::ResponseParts;
use serde::Serialize;
use serde_json::Value;

use crate::logging::InvocationLogger;

/// At most one callback leaves an invocation. Whoever claims the latch first
/// (the dispatcher or the runtime's deadline guard) sends it.
#[derive(Debug, Clone, Default)]
pub struct ResponseLatch(Arc<AtomicBool>);

impl ResponseLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Execution metadata supplied by the Lambda runtime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeContext {
    pub execution_id: String,
    pub function_name: String,
    pub invoked_function_arn: String,
    pub log_group_name: String,
    pub log_stream_name: String,
    pub deadline_ms: Option<u64>,
    #[serde(skip)]
    pub response_latch: ResponseLatch,
}

/// Mutable state for one lifecycle request, handed to every resource hook.
#[derive(Debug)]
pub struct InvocationContext {
    pub request: LifecycleRequest,
    pub execution_id: String,
    pub log_group_name: String,
    pub log_stream_name: String,
    pub logger: InvocationLogger,
    /// Mask `Data` values in the CloudFormation console and API output.
    pub no_echo: bool,
    pub physical_resource_id: Option<String>,
    pub resource_outputs: ResourceOutputs,
    reported_failure: Option<String>,
}

impl InvocationContext {
    pub fn new(request: LifecycleRequest, runtime: &RuntimeContext, logger: InvocationLogger) -> Self {
        Self {
            request,
            execution_id: runtime.execution_id.clone(),
            log_group_name: runtime.log_group_name.clone(),
            log_stream_name: runtime.log_stream_name.clone(),
            logger,
            no_echo: false,
            physical_resource_id: None,
            resource_outputs: ResourceOutputs::new(),
            reported_failure: None,
        }
    }

    pub fn request_type(&self) -> RequestType {
        self.request.request_type
    }

    pub fn properties(&self) -> &Properties {
        &self.request.resource_properties
    }

    pub fn old_properties(&self) -> Option<&Properties> {
        self.request.old_resource_properties.as_ref()
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.request.resource_properties.get(key)
    }

    /// Mark the invocation FAILED with this reason even though the hook
    /// returns `Ok`. The last report wins.
    pub fn report_failure(&mut self, reason: impl Into<String>) {
        self.reported_failure = Some(reason.into());
    }

    pub fn reported_failure(&self) -> Option<&str> {
        self.reported_failure.as_deref()
    }

    pub(crate) fn take_reported_failure(&mut self) -> Option<String> {
        self.reported_failure.take()
    }

    pub fn envelope(&self) -> RequestEnvelope {
        RequestEnvelope::from(&self.request)
    }

    pub fn response_parts<'a>(
        &'a self,
        envelope: &'a RequestEnvelope,
        data: &'a ResourceOutputs,
    ) -> ResponseParts<'a> {
        ResponseParts {
            envelope,
            physical_resource_id: self.physical_resource_id.as_deref(),
            no_echo: self.no_echo,
            data,
            log_stream_name: &self.log_stream_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_is_claimed_once_across_clones() {
        let latch = ResponseLatch::new();
        let guard = latch.clone();

        assert!(latch.try_claim());
        assert!(!guard.try_claim());
        assert!(guard.is_claimed());
    }
}
