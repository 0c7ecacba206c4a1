// SPDX-License-Identifier: MIT

//! Agent module - the goal-driven ReAct loop
//!
//! - `intent` - typed goal intent and its capability checklist
//! - `planner` - reasoning/planning/observing behind the [`Planner`] trait
//! - `react` - the [`ReActEngine`] that sequences, persists and invokes
//! - `types` - state, trace and typed action results

pub mod intent;
pub mod planner;
pub mod react;
pub mod types;

pub use intent::GoalIntent;
pub use planner::{CapabilityPlanner, Planner};
pub use react::ReActEngine;
pub use types::{ActionResult, ActionType, ReActState, ReActStatus, ReActTrace};
