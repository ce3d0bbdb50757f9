//! Shared CloudFormation custom resource protocol primitives.
//!
//! This crate owns the deterministic parts of the callback protocol: request
//! parsing, physical resource id generation, output normalization and response
//! payload construction. It intentionally excludes AWS SDK and Lambda runtime
//! concerns, which live in `cfn_resource_lambda`.

pub mod contract;
pub mod outputs;
pub mod physical_id;
pub mod response;
