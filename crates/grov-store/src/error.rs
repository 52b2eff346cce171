// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("background task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("cannot delete session {0}: it has a non-completed child session")]
    HasActiveChild(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
