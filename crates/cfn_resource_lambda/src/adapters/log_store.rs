use aws_sdk_cloudwatchlogs::Client;
use tokio::runtime::Handle;

const DEFAULT_MAX_MARKER_PAGES: usize = 20;

/// A log event that matched the marker filter, with the stream it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerEvent {
    pub log_stream_name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogStoreError {
    #[error("log resource not found: {0}")]
    NotFound(String),
    #[error("log service call failed: {0}")]
    Service(String),
}

pub trait LogStore: Send + Sync {
    fn marker_events(
        &self,
        log_group: &str,
        filter_pattern: &str,
    ) -> Result<Vec<MarkerEvent>, LogStoreError>;

    fn delete_log_stream(&self, log_group: &str, log_stream: &str) -> Result<(), LogStoreError>;

    fn delete_log_group(&self, log_group: &str) -> Result<(), LogStoreError>;
}

/// CloudWatch Logs backed store. Same blocking contract as
/// [`crate::adapters::callback::HttpCallbackTransport`].
#[derive(Debug, Clone)]
pub struct CloudWatchLogStore {
    client: Client,
    runtime: Handle,
    max_pages: usize,
}

impl CloudWatchLogStore {
    pub fn new(client: Client, runtime: Handle) -> Self {
        Self {
            client,
            runtime,
            max_pages: DEFAULT_MAX_MARKER_PAGES,
        }
    }
}

impl LogStore for CloudWatchLogStore {
    fn marker_events(
        &self,
        log_group: &str,
        filter_pattern: &str,
    ) -> Result<Vec<MarkerEvent>, LogStoreError> {
        let client = self.client.clone();
        let group = log_group.to_string();
        let pattern = filter_pattern.to_string();
        let max_pages = self.max_pages;

        self.runtime.block_on(async move {
            let mut events = Vec::new();
            let mut next_token: Option<String> = None;

            for _ in 0..max_pages {
                let output = client
                    .filter_log_events()
                    .log_group_name(&group)
                    .filter_pattern(&pattern)
                    .set_next_token(next_token.take())
                    .send()
                    .await
                    .map_err(|error| {
                        let service_error = error.into_service_error();
                        if service_error.is_resource_not_found_exception() {
                            LogStoreError::NotFound(group.clone())
                        } else {
                            LogStoreError::Service(format!(
                                "failed to filter log events: {service_error}"
                            ))
                        }
                    })?;

                for event in output.events() {
                    if let (Some(stream), Some(message)) = (event.log_stream_name(), event.message())
                    {
                        events.push(MarkerEvent {
                            log_stream_name: stream.to_string(),
                            message: message.to_string(),
                        });
                    }
                }

                match output.next_token() {
                    Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                    _ => break,
                }
            }

            Ok(events)
        })
    }

    fn delete_log_stream(&self, log_group: &str, log_stream: &str) -> Result<(), LogStoreError> {
        let request = self
            .client
            .delete_log_stream()
            .log_group_name(log_group)
            .log_stream_name(log_stream);
        let target = format!("{log_group}/{log_stream}");

        self.runtime.block_on(async move {
            request.send().await.map(|_| ()).map_err(|error| {
                let service_error = error.into_service_error();
                if service_error.is_resource_not_found_exception() {
                    LogStoreError::NotFound(target)
                } else {
                    LogStoreError::Service(format!(
                        "failed to delete log stream {target}: {service_error}"
                    ))
                }
            })
        })
    }

    fn delete_log_group(&self, log_group: &str) -> Result<(), LogStoreError> {
        let request = self.client.delete_log_group().log_group_name(log_group);
        let target = log_group.to_string();

        self.runtime.block_on(async move {
            request.send().await.map(|_| ()).map_err(|error| {
                let service_error = error.into_service_error();
                if service_error.is_resource_not_found_exception() {
                    LogStoreError::NotFound(target)
                } else {
                    LogStoreError::Service(format!(
                        "failed to delete log group {target}: {service_error}"
                    ))
                }
            })
        })
    }
}
