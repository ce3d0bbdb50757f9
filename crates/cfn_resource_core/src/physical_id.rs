//! Physical resource id resolution.
//!
//! Create requests get an id shaped like the ones CloudFormation mints for its
//! own resources: `{prefix}{stack-name}{sep}{logical-id}{sep}{suffix}`. The
//! suffix is derived from a stable seed instead of randomness, so a retried
//! Lambda invocation of the same Create resolves to the same id.

use sha2::{Digest, Sha256};

use crate::contract::RequestType;

pub const DEFAULT_PHYSICAL_ID_MAX_LEN: usize = 128;
pub const DEFAULT_SEPARATOR: &str = "-";
const SUFFIX_LEN: usize = 12;
const SUFFIX_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Invocation identity that stays fixed across retries of one Create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSeed<'a> {
    pub execution_id: &'a str,
    pub stack_id: &'a str,
    pub logical_resource_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdOptions {
    pub generation_enabled: bool,
    pub prefix: String,
    pub separator: String,
    pub max_len: usize,
}

impl Default for IdOptions {
    fn default() -> Self {
        Self {
            generation_enabled: true,
            prefix: String::new(),
            separator: DEFAULT_SEPARATOR.to_string(),
            max_len: DEFAULT_PHYSICAL_ID_MAX_LEN,
        }
    }
}

/// Update and Delete always keep the orchestrator's id. Create mints one
/// unless generation is disabled, in which case the operation must set it.
pub fn resolve_physical_id(
    request_type: RequestType,
    request_physical_id: Option<&str>,
    seed: &IdSeed<'_>,
    options: &IdOptions,
) -> Option<String> {
    match request_type {
        RequestType::Update | RequestType::Delete => request_physical_id.map(str::to_string),
        RequestType::Create if options.generation_enabled => Some(generate_physical_id(
            seed,
            &options.prefix,
            &options.separator,
            options.max_len,
        )),
        RequestType::Create => None,
    }
}

pub fn generate_physical_id(
    seed: &IdSeed<'_>,
    prefix: &str,
    separator: &str,
    max_len: usize,
) -> String {
    let mut stack_name = short_stack_name(seed.stack_id);
    let mut logical_id = seed.logical_resource_id.to_string();
    let suffix = seed_suffix(seed);

    let budget = max_len.saturating_sub(prefix.chars().count());
    let parts_budget = budget.saturating_sub(SUFFIX_LEN + 2 * separator.chars().count());
    let stack_len = stack_name.chars().count();
    let logical_len = logical_id.chars().count();
    let overflow = (stack_len + logical_len).saturating_sub(parts_budget);

    if overflow > 0 {
        // Each part keeps at least half the budget, or all of itself if shorter.
        let half = parts_budget / 2;
        let kept_stack = stack_len.min(parts_budget.saturating_sub(logical_len.min(half)));
        let kept_logical = logical_len.min(parts_budget.saturating_sub(kept_stack));
        stack_name = truncate_chars(&stack_name, kept_stack);
        logical_id = truncate_chars(&logical_id, kept_logical);
    }

    format!("{prefix}{stack_name}{separator}{logical_id}{separator}{suffix}")
}

/// `arn:aws:cloudformation:region:acct:stack/my-stack/guid` becomes `mystack`.
pub fn short_stack_name(stack_id: &str) -> String {
    let tail = stack_id.rsplit(':').next().unwrap_or(stack_id);
    let name = tail.split('/').nth(1).unwrap_or(tail);
    name.replace('-', "")
}

fn seed_suffix(seed: &IdSeed<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.stack_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(seed.logical_resource_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(seed.execution_id.as_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .take(SUFFIX_LEN)
        .map(|byte| char::from(SUFFIX_ALPHABET[usize::from(*byte) % SUFFIX_ALPHABET.len()]))
        .collect()
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
