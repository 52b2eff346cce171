// SPDX-License-Identifier: Apache-2.0
//! Extended cache: keeps the upstream prompt-prefix cache warm during idle
//! periods with byte-preserving keep-alive requests.
use std::collections::HashMap;

use chrono::Utc;
use grov_types::ExtendedCacheEntry;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::warn;

pub const MAX_ENTRIES: usize = 100;
const KEEPALIVE_AFTER_SECS: i64 = 240;
const IDLE_EVICT_SECS: i64 = 600;
const MAX_KEEPALIVE_ATTEMPTS: u8 = 2;

/// Bounded, project-keyed LRU of recent request bytes used to keep the
/// upstream's prompt cache warm between turns.
pub struct ExtendedCache {
    client: Client,
    entries: Mutex<HashMap<String, ExtendedCacheEntry>>,
    order: Mutex<Vec<String>>,
}

impl ExtendedCache {
    pub fn new(client: Client) -> Self {
        Self { client, entries: Mutex::new(HashMap::new()), order: Mutex::new(Vec::new()) }
    }

    /// Record the most recent successful turn's bytes for a project,
    /// evicting the oldest entry first if the cache is already at
    /// capacity (size never exceeds `MAX_ENTRIES`).
    pub async fn record(&self, session_id: &str, project_path: &str, base_url: &str, body: Vec<u8>, headers: Vec<(String, String)>) {
        let mut entries = self.entries.lock().await;
        let mut order = self.order.lock().await;

        if let Some(existing) = entries.get_mut(project_path) {
            existing.touch(body, headers);
            return;
        }

        if entries.len() >= MAX_ENTRIES {
            if let Some(oldest) = order.first().cloned() {
                entries.remove(&oldest);
                order.remove(0);
            }
        }

        let mut entry = ExtendedCacheEntry::new(session_id, project_path, base_url, body);
        entry.last_headers = headers;
        entries.insert(project_path.to_string(), entry);
        order.push(project_path.to_string());
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// One tick of the 60s timer: evict idle-expired entries, then fan out
    /// keep-alive pings to everything else that needs one.
    pub async fn tick(&self) {
        let now = Utc::now();
        let targets: Vec<(String, ExtendedCacheEntry)> = {
            let mut entries = self.entries.lock().await;
            let mut order = self.order.lock().await;

            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.is_idle_expired(now, IDLE_EVICT_SECS))
                .map(|(k, _)| k.clone())
                .collect();
            for key in &expired {
                entries.remove(key);
                order.retain(|k| k != key);
            }

            entries
                .iter()
                .filter(|(_, e)| e.needs_keepalive(now, KEEPALIVE_AFTER_SECS) && !e.exhausted(MAX_KEEPALIVE_ATTEMPTS))
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect()
        };

        let pings = targets.into_iter().map(|(project_path, entry)| {
            let client = self.client.clone();
            async move { (project_path, send_keepalive(&client, &entry).await) }
        });
        let results = futures::future::join_all(pings).await;

        let mut entries = self.entries.lock().await;
        let mut order = self.order.lock().await;
        for (project_path, ok) in results {
            match ok {
                Ok(()) => {
                    if let Some(e) = entries.get_mut(&project_path) {
                        e.record_keepalive_sent();
                    }
                }
                Err(e) => {
                    warn!(project_path, error = %e, "keep-alive failed, evicting entry");
                    entries.remove(&project_path);
                    order.retain(|k| k != &project_path);
                }
            }
        }
    }

    /// Wipe every stored body/header value in place, then clear the map.
    pub async fn shutdown_wipe(&self) {
        let mut entries = self.entries.lock().await;
        for entry in entries.values_mut() {
            entry.wipe();
        }
        entries.clear();
        self.order.lock().await.clear();
    }
}

async fn send_keepalive(client: &Client, entry: &ExtendedCacheEntry) -> anyhow::Result<()> {
    let injected = grov_injector::insert_keepalive_message(&entry.last_body);
    let body = if injected.applied { injected.bytes } else { entry.last_body.clone() };

    let mut req = client.post(&entry.base_url).body(body);
    for (k, v) in &entry.last_headers {
        req = req.header(k, v);
    }
    let resp = req.send().await?;
    if resp.status().as_u16() != 200 {
        anyhow::bail!("upstream keep-alive returned {}", resp.status());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> ExtendedCache {
        ExtendedCache::new(Client::new())
    }

    #[tokio::test]
    async fn record_inserts_new_entry() {
        let c = cache();
        c.record("s1", "/proj", "https://api.example.com", vec![b'{', b'}'], vec![]).await;
        assert_eq!(c.len().await, 1);
    }

    #[tokio::test]
    async fn record_touches_existing_entry_for_same_project() {
        let c = cache();
        c.record("s1", "/proj", "https://api.example.com", vec![b'{', b'}'], vec![]).await;
        c.record("s1", "/proj", "https://api.example.com", vec![b'{', b'"', b'a', b'"', b'}'], vec![]).await;
        assert_eq!(c.len().await, 1);
    }

    #[tokio::test]
    async fn capacity_is_bounded_at_max_entries() {
        let c = cache();
        for i in 0..MAX_ENTRIES + 5 {
            c.record(&format!("s{i}"), &format!("/proj{i}"), "https://api.example.com", vec![b'{', b'}'], vec![]).await;
        }
        assert_eq!(c.len().await, MAX_ENTRIES);
    }

    #[tokio::test]
    async fn shutdown_wipe_clears_everything() {
        let c = cache();
        c.record("s1", "/proj", "https://api.example.com", vec![b'{', b'"', b'a', b'"', b'}'], vec![("content-type".into(), "application/json".into())]).await;
        c.shutdown_wipe().await;
        assert_eq!(c.len().await, 0);
    }
}
