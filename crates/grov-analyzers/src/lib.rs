// SPDX-License-Identifier: Apache-2.0
//! Clients for the out-of-band analyzers the core consumes as pure typed
//! functions: task-context analysis, drift detection, recovery-alignment
//! checking, and session summarization.

mod alignment;
mod http;
mod mock;
mod traits;
mod types;

pub use alignment::check_recovery_alignment;
pub use http::HttpAnalyzers;
pub use mock::MockAnalyzers;
pub use traits::Analyzers;
pub use types::{AlignmentInput, AlignmentVerdict, DriftInput, HistoryItem, RawDriftResult, RawTaskVerdict, TaskContextInput};
