//! Lambda-side machinery for CloudFormation custom resources.
//!
//! This crate owns runtime integration (the Lambda bridge, the callback and
//! log adapters) and the lifecycle dispatcher. Wire contracts, physical id
//! rules and payload building live in `cfn_resource_core`.
//!
//! A custom resource implements [`handlers::resource::CustomResource`] and
//! hands a factory to [`runtime::run`].

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod runtime;
