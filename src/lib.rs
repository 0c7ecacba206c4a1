// SPDX-License-Identifier: MIT

//! kinetic-flow: workflow orchestration for multi-step media pipelines
//!
//! - [`kinetic::workflow`] - static DAG workflows dispatched to named services
//! - [`adk::agent`] - goal-driven ReAct loop that plans one action at a time
//! - [`kinetic::jobs`] - single-stage job lifecycle tracking

pub mod adk;
pub mod kinetic;

pub use adk::error::{KineticError, Result};
