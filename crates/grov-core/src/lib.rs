// SPDX-License-Identifier: Apache-2.0
//! Per-agent request pipeline: session lifecycle, memory injection, task
//! orchestration, drift correction, and the extended prompt-cache warmer.

pub mod drift;
pub mod error;
pub mod extended_cache;
pub mod injection_engine;
pub mod orchestrator;
pub mod pipeline;
pub mod session_manager;

pub use drift::{DriftCheckOutcome, DriftMachine};
pub use error::ProxyError;
pub use extended_cache::ExtendedCache;
pub use injection_engine::{InjectionEngine, PreviewBuild, EXPAND_TOOL_DESCRIPTION};
pub use orchestrator::{OrchestratorOutcome, TaskOrchestrator};
pub use pipeline::CoreState;
pub use session_manager::{SessionLookup, SessionManager};
