// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use grov_types::{DriftResult, Session, Step, TaskVerdict};

use crate::types::{DriftInput, TaskContextInput};

/// The three out-of-band LLM analyzers invoked over HTTP. Recovery-alignment
/// checking is deliberately not part of this trait: it is a pure,
/// synchronous function (see [`crate::check_recovery_alignment`]), not a
/// network call.
#[async_trait]
pub trait Analyzers: Send + Sync {
    async fn analyze_task_context(&self, input: TaskContextInput<'_>) -> anyhow::Result<TaskVerdict>;

    async fn check_drift(&self, input: DriftInput<'_>) -> anyhow::Result<DriftResult>;

    async fn generate_session_summary(&self, session: &Session, steps: &[Step], max_chars: usize) -> anyhow::Result<String>;
}

