// SPDX-License-Identifier: Apache-2.0
//! Client for the external team-memory / ingest service.

mod http;
mod mock;
mod trait_def;

pub use http::HttpMemoryService;
pub use mock::MockMemoryService;
pub use trait_def::MemoryService;
