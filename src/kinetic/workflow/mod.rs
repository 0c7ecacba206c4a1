// SPDX-License-Identifier: MIT

pub mod graph;
pub mod loader;
pub mod mapping;
pub mod types;
