// SPDX-License-Identifier: Apache-2.0
//! Byte-level JSON surgery used to inject memory context without
//! re-serializing the request body. Re-serialization would reorder or
//! re-escape bytes the upstream has already cached as a prompt prefix,
//! defeating the whole point of the injection.

pub mod bracket;
pub mod escape;
pub mod ops;

pub use escape::escape_json_string;
pub use ops::{add_tool_definition, append_system_text, append_user_delta, insert_keepalive_message, InjectResult};
