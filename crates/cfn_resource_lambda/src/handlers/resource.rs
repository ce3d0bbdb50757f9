use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use cfn_resource_core::contract::{LifecycleRequest, RequestType};
use serde_json::Value;

use crate::handlers::context::InvocationContext;

/// What a lifecycle operation hands back: an output map, a scalar that ends
/// up under `result`, nothing, or an error that fails the invocation.
pub type OperationResult = anyhow::Result<Option<Value>>;

/// A custom resource implementation. A fresh value is built for every
/// invocation, so hooks may stash parsed properties on `self`.
pub trait CustomResource {
    /// Name used in failure reasons.
    fn resource_name(&self) -> String {
        let full = std::any::type_name::<Self>();
        let path = full.split('<').next().unwrap_or(full);
        path.rsplit("::").next().unwrap_or(path).to_string()
    }

    /// Prepended to generated physical ids, e.g. when they must look like ARNs.
    fn physical_resource_id_prefix(&self, _request: &LifecycleRequest) -> String {
        String::new()
    }

    fn validate(&mut self, _ctx: &InvocationContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn populate(&mut self, _ctx: &mut InvocationContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn create(&mut self, ctx: &mut InvocationContext) -> OperationResult;

    fn update(&mut self, ctx: &mut InvocationContext) -> OperationResult;

    fn delete(&mut self, ctx: &mut InvocationContext) -> OperationResult;
}

pub(crate) fn dispatch_operation<R: CustomResource + ?Sized>(
    resource: &mut R,
    ctx: &mut InvocationContext,
) -> OperationResult {
    match ctx.request_type() {
        RequestType::Create => resource.create(ctx),
        RequestType::Update => resource.update(ctx),
        RequestType::Delete => resource.delete(ctx),
    }
}

/// Run a hook so that neither an error nor a panic escapes; both come back
/// as a message.
pub(crate) fn guarded<T>(hook: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(format!("{error:#}")),
        Err(payload) => Err(format!("panic: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
