use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use cfn_resource_lambda::adapters::callback::{CallbackReply, CallbackTransport, TransportError};
use cfn_resource_lambda::adapters::log_store::{LogStore, LogStoreError, MarkerEvent};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub url: String,
    pub body: Vec<u8>,
}

impl RecordedPut {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("callback body should be JSON")
    }
}

/// Records every PUT and answers from a script, falling back to HTTP 200.
#[derive(Default)]
pub struct RecordingTransport {
    replies: Mutex<VecDeque<Result<CallbackReply, TransportError>>>,
    puts: Mutex<Vec<RecordedPut>>,
}

impl RecordingTransport {
    pub fn scripted(replies: Vec<Result<CallbackReply, TransportError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            puts: Mutex::new(Vec::new()),
        }
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().expect("poisoned mutex").clone()
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.puts().iter().map(RecordedPut::json).collect()
    }

    pub fn only_payload(&self) -> Value {
        let payloads = self.payloads();
        assert_eq!(payloads.len(), 1, "expected exactly one callback");
        payloads.into_iter().next().expect("one payload")
    }
}

impl CallbackTransport for RecordingTransport {
    fn put(&self, url: &str, body: &[u8]) -> Result<CallbackReply, TransportError> {
        self.puts.lock().expect("poisoned mutex").push(RecordedPut {
            url: url.to_string(),
            body: body.to_vec(),
        });
        self.replies
            .lock()
            .expect("poisoned mutex")
            .pop_front()
            .unwrap_or(Ok(CallbackReply {
                status: 200,
                body: String::new(),
            }))
    }
}

/// In-memory log group: stream name to raw messages.
#[derive(Default)]
pub struct MemoryLogStore {
    streams: Mutex<BTreeMap<String, Vec<String>>>,
    group_deleted: Mutex<bool>,
    failing_streams: Vec<String>,
    marker_queries: Mutex<usize>,
    group_deletes: Mutex<usize>,
}

impl MemoryLogStore {
    pub fn with_streams(streams: &[(&str, Vec<String>)]) -> Self {
        Self {
            streams: Mutex::new(
                streams
                    .iter()
                    .map(|(name, messages)| (name.to_string(), messages.clone()))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn failing_deletes_for(mut self, stream: &str) -> Self {
        self.failing_streams.push(stream.to_string());
        self
    }

    pub fn stream_names(&self) -> Vec<String> {
        self.streams
            .lock()
            .expect("poisoned mutex")
            .keys()
            .cloned()
            .collect()
    }

    pub fn marker_queries(&self) -> usize {
        *self.marker_queries.lock().expect("poisoned mutex")
    }

    pub fn group_deletes(&self) -> usize {
        *self.group_deletes.lock().expect("poisoned mutex")
    }

    pub fn group_deleted(&self) -> bool {
        *self.group_deleted.lock().expect("poisoned mutex")
    }
}

impl LogStore for MemoryLogStore {
    fn marker_events(
        &self,
        log_group: &str,
        _filter_pattern: &str,
    ) -> Result<Vec<MarkerEvent>, LogStoreError> {
        *self.marker_queries.lock().expect("poisoned mutex") += 1;
        if self.group_deleted() {
            return Err(LogStoreError::NotFound(log_group.to_string()));
        }
        let streams = self.streams.lock().expect("poisoned mutex");
        Ok(streams
            .iter()
            .flat_map(|(stream, messages)| {
                messages
                    .iter()
                    .filter(|message| message.contains("lifecycle_marker"))
                    .map(move |message| MarkerEvent {
                        log_stream_name: stream.clone(),
                        message: message.clone(),
                    })
            })
            .collect())
    }

    fn delete_log_stream(&self, log_group: &str, log_stream: &str) -> Result<(), LogStoreError> {
        if self.failing_streams.iter().any(|stream| stream == log_stream) {
            return Err(LogStoreError::Service(format!(
                "access denied deleting {log_stream}"
            )));
        }
        match self
            .streams
            .lock()
            .expect("poisoned mutex")
            .remove(log_stream)
        {
            Some(_) => Ok(()),
            None => Err(LogStoreError::NotFound(format!("{log_group}/{log_stream}"))),
        }
    }

    fn delete_log_group(&self, log_group: &str) -> Result<(), LogStoreError> {
        *self.group_deletes.lock().expect("poisoned mutex") += 1;
        let mut deleted = self.group_deleted.lock().expect("poisoned mutex");
        if *deleted {
            return Err(LogStoreError::NotFound(log_group.to_string()));
        }
        *deleted = true;
        self.streams.lock().expect("poisoned mutex").clear();
        Ok(())
    }
}

/// A marker line as the JSON subscriber writes it to CloudWatch.
pub fn marker_message(stack_id: &str, request_type: &str, outcome: &str) -> String {
    let details = json!({
        "stack_id": stack_id,
        "request_type": request_type,
        "outcome": outcome,
    });
    json!({
        "timestamp": "2026-10-15T09:30:00.000000Z",
        "level": "INFO",
        "message": "lifecycle marker",
        "component": "cfn_custom_resource",
        "event": "lifecycle_marker",
        "execution_id": "earlier-execution",
        "details": details.to_string(),
    })
    .to_string()
}
