// SPDX-License-Identifier: Apache-2.0
//! Shared state handed to every request handler.
use std::sync::Arc;

use grov_adapters::AdapterRegistry;
use grov_config::Config;
use grov_core::CoreState;
use grov_store::{DriftLogRepository, SessionRepository, StepRepository};

#[derive(Clone)]
pub struct AppState<R> {
    pub config: Arc<Config>,
    pub adapters: Arc<AdapterRegistry>,
    pub core: Arc<CoreState<R>>,
    /// Client used to forward requests to the upstream LLM API; distinct
    /// from `ExtendedCache`'s own client so keep-alive traffic never
    /// contends with a live client request for a connection-pool slot.
    pub upstream: reqwest::Client,
}

impl<R> AppState<R>
where
    R: SessionRepository + StepRepository + DriftLogRepository + Send + Sync + 'static,
{
    pub fn new(config: Arc<Config>, adapters: Arc<AdapterRegistry>, core: Arc<CoreState<R>>, upstream: reqwest::Client) -> Self {
        Self { config, adapters, core, upstream }
    }
}
