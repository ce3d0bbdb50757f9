use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cfn_resource_core::response::{payload_bytes, ResponsePayload};
use serde::Serialize;
use serde_json::json;

use crate::adapters::callback::CallbackTransport;
use crate::config::HandlerConfig;
use crate::handlers::context::ResponseLatch;
use crate::logging::InvocationLogger;

pub const MAX_LOGGED_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransmissionError {
    #[error("failed to serialize response payload: {0}")]
    Serialize(String),
    #[error("callback rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("callback transport failed after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransmissionOutcome {
    Delivered { status: u16, attempts: u32 },
    AlreadyClaimed,
    NoResponseUrl,
    Failed { error: String },
}

/// Sends response payloads to the signed callback URL.
///
/// Non-2xx replies are never retried: a signed URL that rejected the body
/// will reject it again. Transient transport errors are retried until
/// `max_attempts` is spent.
pub struct CallbackTransmitter {
    transport: Arc<dyn CallbackTransport>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl CallbackTransmitter {
    pub fn new(transport: Arc<dyn CallbackTransport>, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            transport,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn from_config(transport: Arc<dyn CallbackTransport>, config: &HandlerConfig) -> Self {
        Self::new(
            transport,
            config.callback_max_attempts,
            config.callback_retry_delay,
        )
    }

    pub fn send(
        &self,
        url: &str,
        payload: &ResponsePayload,
        latch: &ResponseLatch,
        logger: &InvocationLogger,
    ) -> TransmissionOutcome {
        if !latch.try_claim() {
            logger.warn(
                "callback_skipped",
                "a response was already sent for this invocation",
                json!({"status": payload.status}),
            );
            return TransmissionOutcome::AlreadyClaimed;
        }

        match self.deliver(url, payload, logger) {
            Ok((status, attempts)) => {
                logger.info(
                    "callback_delivered",
                    format!("response {} delivered", payload.status),
                    json!({"http_status": status, "attempts": attempts}),
                );
                TransmissionOutcome::Delivered { status, attempts }
            }
            Err(error) => {
                logger.error(
                    "callback_failed",
                    format!("send response failed: {error}"),
                    json!({
                        "status": payload.status,
                        "request_id": payload.request_id,
                        "logical_resource_id": payload.logical_resource_id,
                    }),
                );
                TransmissionOutcome::Failed {
                    error: error.to_string(),
                }
            }
        }
    }

    fn deliver(
        &self,
        url: &str,
        payload: &ResponsePayload,
        logger: &InvocationLogger,
    ) -> Result<(u16, u32), TransmissionError> {
        let body =
            payload_bytes(payload).map_err(|error| TransmissionError::Serialize(error.to_string()))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.put(url, &body) {
                Ok(reply) if (200..300).contains(&reply.status) => return Ok((reply.status, attempt)),
                Ok(reply) => {
                    return Err(TransmissionError::Rejected {
                        status: reply.status,
                        body: truncate_body(&reply.body),
                    })
                }
                Err(error) if error.transient && attempt < self.max_attempts => {
                    logger.warn(
                        "callback_retry",
                        format!("transient callback failure, retrying: {error}"),
                        json!({"attempt": attempt, "max_attempts": self.max_attempts}),
                    );
                    thread::sleep(self.retry_delay);
                }
                Err(error) => {
                    return Err(TransmissionError::Transport {
                        attempts: attempt,
                        message: error.message,
                    })
                }
            }
        }
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_LOGGED_BODY_CHARS {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(MAX_LOGGED_BODY_CHARS).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use cfn_resource_core::contract::ResponseStatus;
    use cfn_resource_core::outputs::ResourceOutputs;

    use super::*;
    use crate::adapters::callback::{CallbackReply, TransportError};
    use crate::logging::{LogLevel, MemorySink};

    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<CallbackReply, TransportError>>>,
        bodies: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<CallbackReply, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                bodies: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.bodies.lock().expect("poisoned mutex").len()
        }
    }

    impl CallbackTransport for ScriptedTransport {
        fn put(&self, _url: &str, body: &[u8]) -> Result<CallbackReply, TransportError> {
            self.bodies.lock().expect("poisoned mutex").push(body.to_vec());
            self.replies
                .lock()
                .expect("poisoned mutex")
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::permanent("script exhausted")))
        }
    }

    fn payload() -> ResponsePayload {
        ResponsePayload {
            status: ResponseStatus::Success,
            reason: "See the details in CloudWatch Log Stream: s".to_string(),
            physical_resource_id: "phys-1".to_string(),
            stack_id: "stack".to_string(),
            request_id: "req".to_string(),
            logical_resource_id: "Res".to_string(),
            no_echo: false,
            data: ResourceOutputs::new(),
        }
    }

    fn ok(status: u16) -> Result<CallbackReply, TransportError> {
        Ok(CallbackReply {
            status,
            body: String::new(),
        })
    }

    fn fixture(
        replies: Vec<Result<CallbackReply, TransportError>>,
    ) -> (Arc<ScriptedTransport>, CallbackTransmitter, MemorySink, InvocationLogger) {
        let transport = Arc::new(ScriptedTransport::new(replies));
        let transmitter = CallbackTransmitter::new(transport.clone(), 2, Duration::ZERO);
        let sink = MemorySink::new();
        let logger = InvocationLogger::new(Arc::new(sink.clone()), "exec-1");
        (transport, transmitter, sink, logger)
    }

    #[test]
    fn delivers_on_first_success() {
        let (transport, transmitter, _sink, logger) = fixture(vec![ok(200)]);
        let outcome = transmitter.send("https://signed", &payload(), &ResponseLatch::new(), &logger);

        assert_eq!(
            outcome,
            TransmissionOutcome::Delivered {
                status: 200,
                attempts: 1
            }
        );
        let body = transport.bodies.lock().expect("poisoned mutex")[0].clone();
        assert_eq!(body, payload_bytes(&payload()).expect("serialize"));
    }

    #[test]
    fn retries_transient_errors_within_the_bound() {
        let (transport, transmitter, _sink, logger) = fixture(vec![
            Err(TransportError::transient("connection reset")),
            ok(200),
        ]);
        let outcome = transmitter.send("https://signed", &payload(), &ResponseLatch::new(), &logger);

        assert_eq!(
            outcome,
            TransmissionOutcome::Delivered {
                status: 200,
                attempts: 2
            }
        );
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let (transport, transmitter, sink, logger) = fixture(vec![
            Err(TransportError::transient("timeout")),
            Err(TransportError::transient("timeout")),
            ok(200),
        ]);
        let outcome = transmitter.send("https://signed", &payload(), &ResponseLatch::new(), &logger);

        assert!(matches!(outcome, TransmissionOutcome::Failed { .. }));
        assert_eq!(transport.calls(), 2);
        assert!(sink
            .entries_at(LogLevel::Error)
            .iter()
            .any(|entry| entry.event == "callback_failed"));
    }

    #[test]
    fn non_success_status_is_not_retried_and_body_is_truncated() {
        let long_body = "x".repeat(2_000);
        let (transport, transmitter, sink, logger) = fixture(vec![Ok(CallbackReply {
            status: 403,
            body: long_body,
        })]);
        let outcome = transmitter.send("https://signed", &payload(), &ResponseLatch::new(), &logger);

        assert_eq!(transport.calls(), 1);
        let TransmissionOutcome::Failed { error } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(error.contains("HTTP 403"));
        assert!(error.len() < 700);
        assert!(sink.has_event("callback_failed"));
    }

    #[test]
    fn claimed_latch_skips_the_send() {
        let (transport, transmitter, _sink, logger) = fixture(vec![ok(200)]);
        let latch = ResponseLatch::new();
        assert!(latch.try_claim());

        let outcome = transmitter.send("https://signed", &payload(), &latch, &logger);
        assert_eq!(outcome, TransmissionOutcome::AlreadyClaimed);
        assert_eq!(transport.calls(), 0);
    }
}
