// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in the extended-cache keep-alive LRU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedCacheEntry {
    pub session_id: String,
    pub project_path: String,
    /// The last byte-exact body seen for this session, replayed verbatim
    /// (minus the keep-alive message insertion) to keep the upstream's
    /// prompt-prefix cache warm.
    pub last_body: Vec<u8>,
    /// The safe (allow-listed) request headers last sent, stored so a
    /// keep-alive ping can replay them.
    pub last_headers: Vec<(String, String)>,
    pub base_url: String,
    pub last_activity_at: DateTime<Utc>,
    pub last_keepalive_at: Option<DateTime<Utc>>,
    pub keepalive_attempts: u8,
}

impl ExtendedCacheEntry {
    pub fn new(session_id: impl Into<String>, project_path: impl Into<String>, base_url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            session_id: session_id.into(),
            project_path: project_path.into(),
            last_body: body,
            last_headers: Vec::new(),
            base_url: base_url.into(),
            last_activity_at: Utc::now(),
            last_keepalive_at: None,
            keepalive_attempts: 0,
        }
    }

    pub fn touch(&mut self, body: Vec<u8>, headers: Vec<(String, String)>) {
        self.last_body = body;
        self.last_headers = headers;
        self.last_activity_at = Utc::now();
        self.keepalive_attempts = 0;
    }

    /// Shutdown wipe: every header value becomes empty and the raw body
    /// becomes an empty buffer, in place, before the entry is dropped from
    /// the map.
    pub fn wipe(&mut self) {
        self.last_body.clear();
        for (_, v) in self.last_headers.iter_mut() {
            v.clear();
        }
    }

    /// True once idle long enough to need a keep-alive ping: sent after
    /// `keepalive_after_secs` of silence, but stops entirely once
    /// `idle_evict_secs` is reached.
    pub fn needs_keepalive(&self, now: DateTime<Utc>, keepalive_after_secs: i64) -> bool {
        let since_activity = (now - self.last_activity_at).num_seconds();
        let since_last_ping = self
            .last_keepalive_at
            .map(|t| (now - t).num_seconds())
            .unwrap_or(since_activity);
        since_activity >= keepalive_after_secs && since_last_ping >= keepalive_after_secs
    }

    pub fn is_idle_expired(&self, now: DateTime<Utc>, idle_evict_secs: i64) -> bool {
        (now - self.last_activity_at).num_seconds() >= idle_evict_secs
    }

    pub fn record_keepalive_sent(&mut self) {
        self.last_keepalive_at = Some(Utc::now());
        self.keepalive_attempts += 1;
    }

    pub fn exhausted(&self, max_attempts: u8) -> bool {
        self.keepalive_attempts >= max_attempts
    }
}
