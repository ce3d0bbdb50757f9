use std::time::Duration;

use cfn_resource_core::contract::normalize_resource_type;
use cfn_resource_core::physical_id::{IdOptions, DEFAULT_PHYSICAL_ID_MAX_LEN, DEFAULT_SEPARATOR};

pub const ENV_RESOURCE_TYPES: &str = "CFN_RESOURCE_TYPES";
pub const ENV_DISABLE_ID_GENERATION: &str = "CFN_DISABLE_PHYSICAL_RESOURCE_ID_GENERATION";
pub const ENV_PHYSICAL_ID_MAX_LEN: &str = "CFN_PHYSICAL_RESOURCE_ID_MAX_LEN";
pub const ENV_DELETE_LOGS: &str = "CFN_DELETE_LOGS_ON_STACK_DELETION";
pub const ENV_HIDE_DELETE_FAILURE: &str = "CFN_HIDE_STACK_DELETE_FAILURE";
pub const ENV_LOG_PURGE_SCOPE: &str = "CFN_LOG_PURGE_SCOPE";
pub const ENV_STRINGIFY_OUTPUTS: &str = "CFN_STRINGIFY_OUTPUTS";
pub const ENV_CALLBACK_MAX_ATTEMPTS: &str = "CFN_CALLBACK_MAX_ATTEMPTS";
pub const ENV_CALLBACK_RETRY_DELAY_MS: &str = "CFN_CALLBACK_RETRY_DELAY_MS";
pub const ENV_CALLBACK_TIMEOUT_MS: &str = "CFN_CALLBACK_TIMEOUT_MS";
pub const ENV_DEADLINE_MARGIN_MS: &str = "CFN_DEADLINE_MARGIN_MS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogPurgeScope {
    /// Only streams whose lifecycle markers all belong to the deleted stack.
    #[default]
    StackStreams,
    /// The whole function log group. Only safe for single-stack functions.
    LogGroup,
}

impl LogPurgeScope {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stack_streams" | "streams" => Some(Self::StackStreams),
            "log_group" | "group" => Some(Self::LogGroup),
            _ => None,
        }
    }
}

/// Process-wide handler settings, fixed before the first request arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerConfig {
    pub resource_types: Vec<String>,
    pub disable_physical_resource_id_generation: bool,
    pub physical_resource_id_max_len: usize,
    pub delete_logs_on_stack_deletion: bool,
    pub log_purge_scope: LogPurgeScope,
    pub hide_stack_delete_failure: bool,
    pub stringify_outputs: bool,
    pub callback_max_attempts: u32,
    pub callback_retry_delay: Duration,
    pub callback_timeout: Duration,
    pub deadline_margin: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            resource_types: Vec::new(),
            disable_physical_resource_id_generation: false,
            physical_resource_id_max_len: DEFAULT_PHYSICAL_ID_MAX_LEN,
            delete_logs_on_stack_deletion: false,
            log_purge_scope: LogPurgeScope::StackStreams,
            hide_stack_delete_failure: true,
            stringify_outputs: false,
            callback_max_attempts: 2,
            callback_retry_delay: Duration::from_millis(500),
            callback_timeout: Duration::from_secs(10),
            deadline_margin: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a boolean (true/false/1/0), got '{value}'")]
    InvalidBool { key: &'static str, value: String },
    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
    #[error("CFN_LOG_PURGE_SCOPE must be stack_streams or log_group, got '{0}'")]
    InvalidPurgeScope(String),
    #[error("CFN_CALLBACK_MAX_ATTEMPTS must be at least 1")]
    ZeroCallbackAttempts,
}

impl HandlerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| lookup(key).filter(|raw| !raw.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = value(ENV_RESOURCE_TYPES) {
            config = config.with_resource_types(raw.split(','));
        }
        if let Some(raw) = value(ENV_DISABLE_ID_GENERATION) {
            config.disable_physical_resource_id_generation =
                parse_bool(ENV_DISABLE_ID_GENERATION, &raw)?;
        }
        if let Some(raw) = value(ENV_PHYSICAL_ID_MAX_LEN) {
            config.physical_resource_id_max_len =
                usize::try_from(parse_number(ENV_PHYSICAL_ID_MAX_LEN, &raw)?).unwrap_or(usize::MAX);
        }
        if let Some(raw) = value(ENV_DELETE_LOGS) {
            config.delete_logs_on_stack_deletion = parse_bool(ENV_DELETE_LOGS, &raw)?;
        }
        if let Some(raw) = value(ENV_HIDE_DELETE_FAILURE) {
            config.hide_stack_delete_failure = parse_bool(ENV_HIDE_DELETE_FAILURE, &raw)?;
        }
        if let Some(raw) = value(ENV_LOG_PURGE_SCOPE) {
            config.log_purge_scope =
                LogPurgeScope::parse(&raw).ok_or(ConfigError::InvalidPurgeScope(raw))?;
        }
        if let Some(raw) = value(ENV_STRINGIFY_OUTPUTS) {
            config.stringify_outputs = parse_bool(ENV_STRINGIFY_OUTPUTS, &raw)?;
        }
        if let Some(raw) = value(ENV_CALLBACK_MAX_ATTEMPTS) {
            let attempts = parse_number(ENV_CALLBACK_MAX_ATTEMPTS, &raw)?;
            if attempts == 0 {
                return Err(ConfigError::ZeroCallbackAttempts);
            }
            config.callback_max_attempts = u32::try_from(attempts).unwrap_or(u32::MAX);
        }
        if let Some(raw) = value(ENV_CALLBACK_RETRY_DELAY_MS) {
            config.callback_retry_delay =
                Duration::from_millis(parse_number(ENV_CALLBACK_RETRY_DELAY_MS, &raw)?);
        }
        if let Some(raw) = value(ENV_CALLBACK_TIMEOUT_MS) {
            config.callback_timeout =
                Duration::from_millis(parse_number(ENV_CALLBACK_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = value(ENV_DEADLINE_MARGIN_MS) {
            config.deadline_margin =
                Duration::from_millis(parse_number(ENV_DEADLINE_MARGIN_MS, &raw)?);
        }

        Ok(config)
    }

    /// Replace the accepted resource types, normalizing each to `Custom::...`.
    pub fn with_resource_types<I, S>(mut self, resource_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.resource_types = resource_types
            .into_iter()
            .map(|value| value.as_ref().trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| normalize_resource_type(&value))
            .collect();
        self
    }

    pub fn id_options(&self, prefix: String) -> IdOptions {
        IdOptions {
            generation_enabled: !self.disable_physical_resource_id_generation,
            prefix,
            separator: DEFAULT_SEPARATOR.to_string(),
            max_len: self.physical_resource_id_max_len,
        }
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}

fn parse_number(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidNumber {
            key,
            value: raw.to_string(),
        })
}
