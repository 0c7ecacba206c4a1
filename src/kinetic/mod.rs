// SPDX-License-Identifier: MIT

//! The orchestration service built on the `adk` primitives

pub mod config;
pub mod jobs;
pub mod server;
pub mod services;
pub mod workflow;
