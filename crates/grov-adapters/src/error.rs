// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Diagnostic kinds an adapter operation can fail with. On malformed
/// inputs an adapter returns one of these and leaves its argument
/// untouched.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("malformed client body: {0}")]
    MalformedBody(String),
    #[error("no adapter claims path {0}")]
    NoAdapter(String),
    #[error("raw-body injection point not found: {0}")]
    InjectionAnchorMissing(String),
}
