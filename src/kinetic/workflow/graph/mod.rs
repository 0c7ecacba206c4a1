// SPDX-License-Identifier: MIT

//! Dependency-graph workflow execution
//!
//! Definitions are validated up front, then the [`WorkflowEngine`] runs
//! them batch by batch in dependency order.

pub mod executor;
pub mod validate;

pub use executor::WorkflowEngine;
pub use validate::{topological_batches, validate_definition};
