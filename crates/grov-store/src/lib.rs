// SPDX-License-Identifier: Apache-2.0
//! Session/step/drift-log persistence.

mod error;
mod sqlite;
mod traits;

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;
pub use traits::{DriftLogRepository, SessionRepository, StepRepository};
