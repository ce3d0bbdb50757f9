use std::sync::Arc;

use cfn_resource_core::contract::{
    check_resource_type, parse_request, LifecycleRequest, ProtocolError, RequestEnvelope,
    RequestType, ResponseStatus,
};
use cfn_resource_core::outputs::{merge_operation_result, stringify_values, ResourceOutputs};
use cfn_resource_core::physical_id::{resolve_physical_id, IdSeed};
use cfn_resource_core::response::{
    build_response, default_reason, failure_reason, BuiltResponse, ResponseParts, ResponsePayload,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::adapters::callback::CallbackTransport;
use crate::adapters::log_store::LogStore;
use crate::config::HandlerConfig;
use crate::handlers::context::{InvocationContext, RuntimeContext};
use crate::handlers::log_retention::{
    LogRetentionController, LogTarget, PurgeSummary, LIFECYCLE_MARKER_EVENT,
};
use crate::handlers::resource::{dispatch_operation, guarded, CustomResource};
use crate::handlers::transmitter::{CallbackTransmitter, TransmissionOutcome};
use crate::logging::{InvocationLogger, LogSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Received,
    Validated,
    Dispatched,
    Succeeded,
    Failed,
    FailedButHidden,
    LogsHandled,
    ResponseSent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationOutcome {
    Succeeded,
    Failed,
    /// The Delete operation failed but SUCCESS was reported so the stack
    /// does not get stuck in DELETE_FAILED.
    FailedButHidden,
}

impl InvocationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::FailedButHidden => "failed_but_hidden",
        }
    }

    fn state(self) -> InvocationState {
        match self {
            Self::Succeeded => InvocationState::Succeeded,
            Self::Failed => InvocationState::Failed,
            Self::FailedButHidden => InvocationState::FailedButHidden,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Protocol,
    Operation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PurgeDecision {
    NotApplicable,
    Disabled,
    SkippedAfterFailure,
    Purged { summary: PurgeSummary },
    PurgeFailed { error: String },
}

/// What one invocation did. Only logs and tests read it; the orchestrator
/// learns the result through the callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationReport {
    pub outcome: InvocationOutcome,
    pub fault: Option<FaultKind>,
    pub payload: ResponsePayload,
    pub purge: PurgeDecision,
    pub transmission: TransmissionOutcome,
    pub states: Vec<InvocationState>,
}

impl InvocationReport {
    pub fn status(&self) -> ResponseStatus {
        self.payload.status
    }
}

pub struct Dispatcher {
    config: Arc<HandlerConfig>,
    transmitter: CallbackTransmitter,
    retention: LogRetentionController,
    sink: Arc<dyn LogSink>,
}

impl Dispatcher {
    pub fn new(
        config: HandlerConfig,
        transport: Arc<dyn CallbackTransport>,
        log_store: Arc<dyn LogStore>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let transmitter = CallbackTransmitter::from_config(transport, &config);
        let retention = LogRetentionController::new(log_store, config.log_purge_scope);
        Self {
            config: Arc::new(config),
            transmitter,
            retention,
            sink,
        }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Run one lifecycle request to completion. Every path ends in exactly
    /// one callback attempt, unless the request carries no callback URL at
    /// all or the deadline guard already answered.
    pub fn handle<R: CustomResource>(
        &self,
        mut resource: R,
        event: &Value,
        runtime: &RuntimeContext,
    ) -> InvocationReport {
        let logger = InvocationLogger::new(self.sink.clone(), runtime.execution_id.clone());
        let mut states = vec![InvocationState::Received];
        logger.info(
            "request_received",
            "lifecycle request received",
            json!({"event": event, "runtime": runtime}),
        );

        let request = match parse_request(event).and_then(|request| {
            check_resource_type(&request, &self.config.resource_types)?;
            Ok(request)
        }) {
            Ok(request) => request,
            Err(error) => return self.reject(event, runtime, &logger, &error, states),
        };
        states.push(InvocationState::Validated);

        let mut ctx = InvocationContext::new(request, runtime, logger.clone());
        ctx.physical_resource_id = self.initial_physical_id(&resource, &ctx.request, runtime, &logger);

        let result = guarded(|| resource.validate(&ctx))
            .and_then(|()| guarded(|| resource.populate(&mut ctx)))
            .and_then(|()| guarded(|| dispatch_operation(&mut resource, &mut ctx)));
        states.push(InvocationState::Dispatched);

        let failure = match result {
            Ok(value) => {
                merge_operation_result(&mut ctx.resource_outputs, value);
                ctx.take_reported_failure().map(|reported| {
                    format!("{reported} {}", default_reason(&ctx.log_stream_name))
                })
            }
            Err(message) => Some(failure_reason(
                &resource.resource_name(),
                &message,
                &ctx.log_stream_name,
            )),
        };

        let envelope = ctx.envelope();
        let (outcome, status, reason) = match failure {
            None => (InvocationOutcome::Succeeded, ResponseStatus::Success, None),
            Some(reason) => self.classify_failure(&envelope, reason, &logger),
        };
        write_marker(&logger, &envelope, outcome);
        states.push(outcome.state());

        let purge = self.handle_logs(&ctx, outcome, &logger);
        states.push(InvocationState::LogsHandled);

        let data = if self.config.stringify_outputs {
            stringify_values(&ctx.resource_outputs)
        } else {
            ctx.resource_outputs.clone()
        };
        let built = build_response(
            ctx.response_parts(&envelope, &data),
            status,
            reason.as_deref(),
        );
        let transmission = self.transmit(&envelope, &built, runtime, &logger);

        finish(
            &logger,
            InvocationReport {
                outcome,
                fault: (outcome != InvocationOutcome::Succeeded).then_some(FaultKind::Operation),
                payload: built.payload,
                purge,
                transmission,
                states,
            },
        )
    }

    /// Best-effort answer for an invocation that is about to run out of time
    /// or whose worker died. Uses the same latch as [`Dispatcher::handle`],
    /// so a response that already left is not repeated.
    pub fn respond_before_deadline(
        &self,
        event: &Value,
        runtime: &RuntimeContext,
        reason: &str,
    ) -> TransmissionOutcome {
        let logger = InvocationLogger::new(self.sink.clone(), runtime.execution_id.clone());
        let envelope = RequestEnvelope::from_event(event);
        let reason = format!("{reason}. {}", default_reason(&runtime.log_stream_name));
        logger.error(
            "deadline_response",
            "invocation did not finish in time, answering from the request envelope",
            json!({"stack_id": envelope.stack_id, "request_id": envelope.request_id}),
        );

        let (outcome, status, reason) = self.classify_failure(&envelope, reason, &logger);
        write_marker(&logger, &envelope, outcome);

        let empty = ResourceOutputs::new();
        let built = build_response(
            ResponseParts {
                envelope: &envelope,
                physical_resource_id: envelope.physical_resource_id.as_deref(),
                no_echo: false,
                data: &empty,
                log_stream_name: &runtime.log_stream_name,
            },
            status,
            reason.as_deref(),
        );
        let transmission = self.transmit(&envelope, &built, runtime, &logger);
        logger.flush();
        transmission
    }

    fn reject(
        &self,
        event: &Value,
        runtime: &RuntimeContext,
        logger: &InvocationLogger,
        error: &ProtocolError,
        mut states: Vec<InvocationState>,
    ) -> InvocationReport {
        let envelope = RequestEnvelope::from_event(event);
        let reason = format!(
            "Invalid lifecycle request: {error}. {}",
            default_reason(&runtime.log_stream_name)
        );
        logger.error(
            "protocol_fault",
            reason.clone(),
            json!({
                "stack_id": envelope.stack_id,
                "request_id": envelope.request_id,
                "logical_resource_id": envelope.logical_resource_id,
            }),
        );

        let is_delete = envelope.request_type == Some(RequestType::Delete);
        let (outcome, status, reason) = if is_delete && error.is_hideable_on_delete() {
            self.classify_failure(&envelope, reason, logger)
        } else {
            (InvocationOutcome::Failed, ResponseStatus::Failed, Some(reason))
        };
        write_marker(logger, &envelope, outcome);
        states.push(outcome.state());
        states.push(InvocationState::LogsHandled);

        let purge = match (is_delete, self.config.delete_logs_on_stack_deletion) {
            (false, _) => PurgeDecision::NotApplicable,
            (true, false) => PurgeDecision::Disabled,
            (true, true) => PurgeDecision::SkippedAfterFailure,
        };

        let empty = ResourceOutputs::new();
        let built = build_response(
            ResponseParts {
                envelope: &envelope,
                physical_resource_id: envelope.physical_resource_id.as_deref(),
                no_echo: false,
                data: &empty,
                log_stream_name: &runtime.log_stream_name,
            },
            status,
            reason.as_deref(),
        );
        let transmission = self.transmit(&envelope, &built, runtime, logger);

        finish(
            logger,
            InvocationReport {
                outcome,
                fault: Some(FaultKind::Protocol),
                payload: built.payload,
                purge,
                transmission,
                states,
            },
        )
    }

    fn initial_physical_id<R: CustomResource>(
        &self,
        resource: &R,
        request: &LifecycleRequest,
        runtime: &RuntimeContext,
        logger: &InvocationLogger,
    ) -> Option<String> {
        let prefix = guarded(|| Ok(resource.physical_resource_id_prefix(request)))
            .unwrap_or_else(|message| {
                logger.warn(
                    "physical_id_prefix_failed",
                    format!("ignoring physical id prefix: {message}"),
                    json!({}),
                );
                String::new()
            });
        let seed = IdSeed {
            execution_id: &runtime.execution_id,
            stack_id: &request.stack_id,
            logical_resource_id: &request.logical_resource_id,
        };
        resolve_physical_id(
            request.request_type,
            request.physical_resource_id.as_deref(),
            &seed,
            &self.config.id_options(prefix),
        )
    }

    fn classify_failure(
        &self,
        envelope: &RequestEnvelope,
        reason: String,
        logger: &InvocationLogger,
    ) -> (InvocationOutcome, ResponseStatus, Option<String>) {
        let details = json!({
            "stack_id": envelope.stack_id,
            "request_id": envelope.request_id,
            "logical_resource_id": envelope.logical_resource_id,
            "physical_resource_id": envelope.physical_resource_id,
        });

        if envelope.request_type == Some(RequestType::Delete) && self.config.hide_stack_delete_failure
        {
            logger.error(
                "delete_failure_hidden",
                "There may be resources created by this function that have not been deleted. \
                 The delete is reported as successful because stack delete failures are hidden.",
                details.clone(),
            );
            logger.error(
                "delete_failure_reason",
                format!("Reason for failure: {reason}"),
                details,
            );
            return (InvocationOutcome::FailedButHidden, ResponseStatus::Success, None);
        }

        logger.error("operation_failed", reason.clone(), details);
        (InvocationOutcome::Failed, ResponseStatus::Failed, Some(reason))
    }

    fn handle_logs(
        &self,
        ctx: &InvocationContext,
        outcome: InvocationOutcome,
        logger: &InvocationLogger,
    ) -> PurgeDecision {
        if ctx.request_type() != RequestType::Delete {
            return PurgeDecision::NotApplicable;
        }
        if !self.config.delete_logs_on_stack_deletion {
            return PurgeDecision::Disabled;
        }
        if outcome != InvocationOutcome::Succeeded {
            logger.info(
                "logs_retained",
                "delete did not succeed, keeping logs for diagnosis",
                json!({"outcome": outcome.as_str()}),
            );
            return PurgeDecision::SkippedAfterFailure;
        }

        let target = LogTarget {
            log_group: ctx.log_group_name.clone(),
            current_stream: ctx.log_stream_name.clone(),
        };
        match self.retention.purge_stack_logs(&ctx.request.stack_id, &target) {
            Ok(summary) => {
                logger.info(
                    "logs_purged",
                    "purging stack logs",
                    json!({"summary": summary}),
                );
                logger.quiet();
                PurgeDecision::Purged { summary }
            }
            Err(error) => {
                logger.error(
                    "log_purge_failed",
                    format!("failed to purge stack logs: {error}"),
                    json!({"log_group": target.log_group}),
                );
                PurgeDecision::PurgeFailed {
                    error: error.to_string(),
                }
            }
        }
    }

    fn transmit(
        &self,
        envelope: &RequestEnvelope,
        built: &BuiltResponse,
        runtime: &RuntimeContext,
        logger: &InvocationLogger,
    ) -> TransmissionOutcome {
        if let Some(fallback) = &built.substituted_physical_id {
            logger.warn(
                "physical_id_substituted",
                "response had no physical resource id, sending a fallback",
                json!({"physical_resource_id": fallback}),
            );
        }
        logger.debug(
            "response_built",
            "response payload",
            json!({"payload": built.payload}),
        );

        match envelope.response_url.as_deref() {
            Some(url) => {
                self.transmitter
                    .send(url, &built.payload, &runtime.response_latch, logger)
            }
            None => {
                logger.error(
                    "callback_unaddressable",
                    "request carries no ResponseURL, no response can be sent",
                    json!({"stack_id": envelope.stack_id, "request_id": envelope.request_id}),
                );
                TransmissionOutcome::NoResponseUrl
            }
        }
    }
}

fn write_marker(logger: &InvocationLogger, envelope: &RequestEnvelope, outcome: InvocationOutcome) {
    logger.info(
        LIFECYCLE_MARKER_EVENT,
        "lifecycle marker",
        json!({
            "stack_id": envelope.stack_id,
            "request_type": envelope.request_type.map(RequestType::as_str).unwrap_or("Unknown"),
            "outcome": outcome.as_str(),
        }),
    );
}

fn finish(logger: &InvocationLogger, mut report: InvocationReport) -> InvocationReport {
    report.states.push(InvocationState::ResponseSent);
    logger.debug(
        "state_transitions",
        "invocation states",
        json!({"states": report.states}),
    );
    logger.info(
        "invocation_finished",
        format!("responded {}", report.payload.status),
        json!({
            "outcome": report.outcome,
            "fault": report.fault,
            "purge": report.purge,
            "transmission": report.transmission,
        }),
    );
    logger.flush();
    report
}
