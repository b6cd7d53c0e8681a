//! Process-wide registry of [`Monitor`]s.
//!
//! One monitor exists per code host, credential and (optionally) resource for the
//! lifetime of the process, so every client talking to the same quota observes the
//! same state.

use crate::monitor::Monitor;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::warn;
use url::Url;

/// Exported view of one registered monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSnapshot {
    /// Registry key: normalized URL, auth hash and optional resource.
    pub key: String,
    pub known: bool,
    /// `None` until the monitor saw a complete header set.
    pub limit: Option<i64>,
    pub remaining: i64,
}

#[derive(Debug, Default)]
pub struct MonitorRegistry {
    monitors: Mutex<HashMap<String, Arc<Monitor>>>,
}

static GLOBAL_MONITORS: OnceLock<MonitorRegistry> = OnceLock::new();

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static MonitorRegistry {
        GLOBAL_MONITORS.get_or_init(MonitorRegistry::new)
    }

    /// Register `monitor` unless one already exists for the key; returns the registered one.
    ///
    /// The first registration wins for the life of the registry.
    pub fn get_or_set(
        &self,
        base_url: &str,
        auth_hash: &str,
        resource: Option<&str>,
        monitor: Arc<Monitor>,
    ) -> Arc<Monitor> {
        let key = registry_key(base_url, auth_hash, resource);
        let mut map = self.monitors.lock().expect("monitor registry poisoned");
        match map.get(&key) {
            Some(existing) => {
                if !Arc::ptr_eq(existing, &monitor) {
                    warn!(target: "ratewarden::monitor_registry", key = %key, "monitor already registered; keeping first registration");
                }
                existing.clone()
            }
            None => {
                map.insert(key, monitor.clone());
                monitor
            }
        }
    }

    pub fn get(&self, base_url: &str, auth_hash: &str, resource: Option<&str>) -> Option<Arc<Monitor>> {
        let key = registry_key(base_url, auth_hash, resource);
        self.monitors.lock().expect("monitor registry poisoned").get(&key).cloned()
    }

    pub fn count(&self) -> usize {
        self.monitors.lock().expect("monitor registry poisoned").len()
    }

    /// Snapshot of every monitor, sorted by key.
    pub fn snapshot(&self) -> Vec<MonitorSnapshot> {
        let monitors: Vec<(String, Arc<Monitor>)> = {
            let map = self.monitors.lock().expect("monitor registry poisoned");
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let mut entries: Vec<MonitorSnapshot> = monitors
            .into_iter()
            .map(|(key, monitor)| {
                let status = monitor.get();
                MonitorSnapshot {
                    key,
                    known: status.known,
                    limit: monitor.total_limit(),
                    remaining: status.remaining,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }
}

/// `<normalized url>:<auth hash>[:<resource>]`
fn registry_key(base_url: &str, auth_hash: &str, resource: Option<&str>) -> String {
    let mut key = format!("{}:{auth_hash}", normalize_url(base_url));
    if let Some(resource) = resource.filter(|r| !r.is_empty()) {
        key.push(':');
        key.push_str(resource);
    }
    key
}

/// Lower-case the host and end the path with a slash; unparseable input is kept as is.
fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if let Some(host) = url.host_str().map(str::to_ascii_lowercase) {
        if url.set_host(Some(&host)).is_err() {
            return raw.to_string();
        }
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.to_string()
}
