// SPDX-License-Identifier: MIT

//! Engine primitives shared by the workflow scheduler and the ReAct loop

pub mod agent;
pub mod error;
pub mod event;
pub mod invoker;
pub mod retry;
pub mod runs;
pub mod store;
