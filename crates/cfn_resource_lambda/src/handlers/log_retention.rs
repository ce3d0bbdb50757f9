//! Log purge on stack deletion.
//!
//! Streams are tied to a stack through the `lifecycle_marker` line the
//! dispatcher writes at the end of every invocation. A stream is purged only
//! when every marker in it names the deleted stack and none records a failed
//! outcome; anything ambiguous stays.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapters::log_store::{LogStore, LogStoreError, MarkerEvent};
use crate::config::LogPurgeScope;

pub const LIFECYCLE_MARKER_EVENT: &str = "lifecycle_marker";
pub const SUCCEEDED_OUTCOME: &str = "succeeded";
const MARKER_FILTER_PATTERN: &str = "\"lifecycle_marker\"";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleMarker {
    pub stack_id: String,
    pub request_type: String,
    pub outcome: String,
}

impl LifecycleMarker {
    pub fn is_clean_for(&self, stack_id: &str) -> bool {
        self.stack_id == stack_id && self.outcome == SUCCEEDED_OUTCOME
    }
}

/// Recover a marker from a raw CloudWatch message. Accepts the flattened
/// JSON line written by the tracing subscriber, where `details` is a JSON
/// string, as well as nested `fields` objects.
pub fn parse_marker(message: &str) -> Option<LifecycleMarker> {
    let start = message.find('{')?;
    let line: Value = serde_json::from_str(message[start..].trim_end()).ok()?;
    let fields = match line.get("fields") {
        Some(nested @ Value::Object(_)) => nested,
        _ => &line,
    };
    if fields.get("event").and_then(Value::as_str) != Some(LIFECYCLE_MARKER_EVENT) {
        return None;
    }
    match fields.get("details")? {
        Value::String(raw) => serde_json::from_str(raw).ok(),
        details @ Value::Object(_) => serde_json::from_value(details.clone()).ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogTarget {
    pub log_group: String,
    pub current_stream: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub deleted: Vec<String>,
    pub already_absent: Vec<String>,
    pub retained: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetentionError {
    #[error("no log group is known for this function")]
    MissingLogGroup,
    #[error("failed to enumerate lifecycle markers: {0}")]
    Enumerate(LogStoreError),
    #[error("{failed} of {attempted} log deletions failed, first error: {first_error}")]
    Delete {
        attempted: usize,
        failed: usize,
        first_error: LogStoreError,
    },
}

pub struct LogRetentionController {
    store: Arc<dyn LogStore>,
    scope: LogPurgeScope,
}

impl LogRetentionController {
    pub fn new(store: Arc<dyn LogStore>, scope: LogPurgeScope) -> Self {
        Self { store, scope }
    }

    pub fn purge_stack_logs(
        &self,
        stack_id: &str,
        target: &LogTarget,
    ) -> Result<PurgeSummary, RetentionError> {
        if target.log_group.trim().is_empty() {
            return Err(RetentionError::MissingLogGroup);
        }

        match self.scope {
            LogPurgeScope::LogGroup => self.purge_group(&target.log_group),
            LogPurgeScope::StackStreams => self.purge_streams(stack_id, target),
        }
    }

    fn purge_group(&self, log_group: &str) -> Result<PurgeSummary, RetentionError> {
        let mut summary = PurgeSummary::default();
        match self.store.delete_log_group(log_group) {
            Ok(()) => summary.deleted.push(log_group.to_string()),
            Err(LogStoreError::NotFound(_)) => summary.already_absent.push(log_group.to_string()),
            Err(error) => {
                return Err(RetentionError::Delete {
                    attempted: 1,
                    failed: 1,
                    first_error: error,
                })
            }
        }
        Ok(summary)
    }

    fn purge_streams(
        &self,
        stack_id: &str,
        target: &LogTarget,
    ) -> Result<PurgeSummary, RetentionError> {
        let events = match self
            .store
            .marker_events(&target.log_group, MARKER_FILTER_PATTERN)
        {
            Ok(events) => events,
            Err(LogStoreError::NotFound(_)) => {
                return Ok(PurgeSummary {
                    already_absent: vec![target.log_group.clone()],
                    ..PurgeSummary::default()
                })
            }
            Err(error) => return Err(RetentionError::Enumerate(error)),
        };

        let (candidates, retained) = select_streams(stack_id, &target.current_stream, events);
        let mut summary = PurgeSummary {
            retained,
            ..PurgeSummary::default()
        };
        let mut failures: Vec<LogStoreError> = Vec::new();

        for stream in &candidates {
            match self.store.delete_log_stream(&target.log_group, stream) {
                Ok(()) => summary.deleted.push(stream.clone()),
                Err(LogStoreError::NotFound(_)) => summary.already_absent.push(stream.clone()),
                Err(error) => failures.push(error),
            }
        }

        match failures.into_iter().next() {
            None => Ok(summary),
            Some(first_error) => Err(RetentionError::Delete {
                attempted: candidates.len(),
                failed: candidates.len() - summary.deleted.len() - summary.already_absent.len(),
                first_error,
            }),
        }
    }
}

/// Split marker-bearing streams into those to delete and those to keep.
/// The current stream always goes last so the invocation keeps logging
/// for as long as possible.
fn select_streams(
    stack_id: &str,
    current_stream: &str,
    events: Vec<MarkerEvent>,
) -> (Vec<String>, Vec<String>) {
    let mut streams: BTreeMap<String, bool> = BTreeMap::new();
    for event in events {
        let clean = parse_marker(&event.message).is_some_and(|marker| marker.is_clean_for(stack_id));
        let entry = streams.entry(event.log_stream_name).or_insert(true);
        *entry = *entry && clean;
    }

    let mut candidates = Vec::new();
    let mut retained = Vec::new();
    for (stream, clean) in streams {
        if !clean {
            retained.push(stream);
        } else if stream != current_stream {
            candidates.push(stream);
        }
    }

    let current_retained = retained.iter().any(|stream| stream == current_stream);
    if !current_stream.is_empty() && !current_retained {
        candidates.push(current_stream.to_string());
    }
    (candidates, retained)
}
