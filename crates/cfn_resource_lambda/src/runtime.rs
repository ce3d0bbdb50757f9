//! Bridge between `lambda_runtime` and the synchronous dispatcher.
//!
//! The dispatcher runs on a blocking thread so the AWS adapters can drive
//! their async clients through a runtime handle. The async side only waits,
//! bounded by the invocation deadline minus a safety margin, and answers on
//! the dispatcher's behalf when that budget runs out.

use std::sync::Arc;
use std::time::Duration;

use aws_config::BehaviorVersion;
use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use tokio::runtime::Handle;

use crate::adapters::callback::HttpCallbackTransport;
use crate::adapters::log_store::CloudWatchLogStore;
use crate::config::HandlerConfig;
use crate::handlers::context::RuntimeContext;
use crate::handlers::dispatcher::Dispatcher;
use crate::handlers::resource::CustomResource;
use crate::logging::{init_tracing, TracingSink};

pub const ENV_FUNCTION_NAME: &str = "AWS_LAMBDA_FUNCTION_NAME";
pub const ENV_LOG_GROUP_NAME: &str = "AWS_LAMBDA_LOG_GROUP_NAME";
pub const ENV_LOG_STREAM_NAME: &str = "AWS_LAMBDA_LOG_STREAM_NAME";

const DEADLINE_REASON: &str = "Custom resource operation did not finish before the function timeout";

/// Serve lifecycle requests with a fresh resource from `factory` per
/// invocation, configured from the environment.
pub async fn run<R, F>(factory: F) -> Result<(), Error>
where
    R: CustomResource + 'static,
    F: Fn() -> R + Send + Sync + 'static,
{
    init_tracing()?;
    let config = HandlerConfig::from_env()?;
    run_with_config(config, factory).await
}

pub async fn run_with_config<R, F>(config: HandlerConfig, factory: F) -> Result<(), Error>
where
    R: CustomResource + 'static,
    F: Fn() -> R + Send + Sync + 'static,
{
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let handle = Handle::current();
    let transport = HttpCallbackTransport::new(config.callback_timeout, handle.clone())?;
    let log_store = CloudWatchLogStore::new(
        aws_sdk_cloudwatchlogs::Client::new(&aws_config),
        handle,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        config,
        Arc::new(transport),
        Arc::new(log_store),
        Arc::new(TracingSink),
    ));
    let factory = Arc::new(factory);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let dispatcher = dispatcher.clone();
        let factory = factory.clone();
        async move { handle_event(dispatcher, factory, event).await }
    }))
    .await
}

async fn handle_event<R, F>(
    dispatcher: Arc<Dispatcher>,
    factory: Arc<F>,
    event: LambdaEvent<Value>,
) -> Result<Value, Error>
where
    R: CustomResource + 'static,
    F: Fn() -> R + Send + Sync + 'static,
{
    let LambdaEvent { payload, context } = event;
    let runtime = runtime_context(
        &context.request_id,
        &context.invoked_function_arn,
        context.deadline,
        |key| std::env::var(key).ok(),
    );
    let budget = guard_budget(
        runtime.deadline_ms,
        dispatcher.config().deadline_margin,
        now_ms(),
    );
    let payload = Arc::new(payload);

    let worker = {
        let dispatcher = dispatcher.clone();
        let payload = payload.clone();
        let runtime = runtime.clone();
        tokio::task::spawn_blocking(move || dispatcher.handle((*factory)(), &payload, &runtime))
    };

    let joined = match budget {
        Some(budget) => match tokio::time::timeout(budget, worker).await {
            Ok(joined) => joined,
            Err(_) => {
                return respond_late(dispatcher, payload, runtime, DEADLINE_REASON.to_string())
                    .await
            }
        },
        None => worker.await,
    };

    match joined {
        Ok(report) => Ok(json!({
            "status": report.payload.status,
            "outcome": report.outcome,
            "transmission": report.transmission,
        })),
        Err(error) => {
            let reason = format!("Custom resource handler stopped unexpectedly: {error}");
            respond_late(dispatcher, payload, runtime, reason).await
        }
    }
}

async fn respond_late(
    dispatcher: Arc<Dispatcher>,
    payload: Arc<Value>,
    runtime: RuntimeContext,
    reason: String,
) -> Result<Value, Error> {
    let transmission = tokio::task::spawn_blocking(move || {
        dispatcher.respond_before_deadline(&payload, &runtime, &reason)
    })
    .await
    .map_err(|error| Error::from(format!("deadline response task failed: {error}")))?;

    Ok(json!({ "status": "deadline", "transmission": transmission }))
}

pub fn runtime_context(
    request_id: &str,
    invoked_function_arn: &str,
    deadline_ms: u64,
    lookup: impl Fn(&str) -> Option<String>,
) -> RuntimeContext {
    RuntimeContext {
        execution_id: request_id.to_string(),
        function_name: lookup(ENV_FUNCTION_NAME).unwrap_or_default(),
        invoked_function_arn: invoked_function_arn.to_string(),
        log_group_name: lookup(ENV_LOG_GROUP_NAME).unwrap_or_default(),
        log_stream_name: lookup(ENV_LOG_STREAM_NAME).unwrap_or_default(),
        deadline_ms: (deadline_ms > 0).then_some(deadline_ms),
        ..RuntimeContext::default()
    }
}

/// Time the dispatcher may use before the guard answers for it. `None`
/// when the runtime gave no deadline.
pub fn guard_budget(deadline_ms: Option<u64>, margin: Duration, now_ms: u64) -> Option<Duration> {
    let remaining = deadline_ms?.saturating_sub(now_ms);
    Some(Duration::from_millis(remaining).saturating_sub(margin))
}

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
