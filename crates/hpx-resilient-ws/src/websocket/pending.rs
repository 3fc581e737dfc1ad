//! Pending request bookkeeping for correlated sends.
//!
//! The table is owned by the connection controller, so it needs no locking.
//! Each entry is resolved at most once: resolving removes it.

use std::{collections::HashMap, time::Duration};

use serde_json::Value;
use tokio::time::Instant;

use super::types::RequestId;
use crate::error::{ClientError, ClientResult};

/// Completion callback for a correlated send.
pub type ResponseCallback = Box<dyn FnOnce(ClientResult<Value>) + Send + 'static>;

struct PendingRequest {
    callback: ResponseCallback,
    created_at: Instant,
}

/// Correlation key to completion callback.
#[derive(Default)]
pub struct PendingRequestTable {
    requests: HashMap<RequestId, PendingRequest>,
}

impl PendingRequestTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a callback under `key`. An existing entry with the same key is
    /// replaced and its callback dropped uncalled.
    pub fn register(&mut self, key: RequestId, callback: ResponseCallback) {
        let pending = PendingRequest {
            callback,
            created_at: Instant::now(),
        };
        self.requests.insert(key, pending);
    }

    /// Remove the entry for `key` and invoke its callback with `result`.
    ///
    /// Returns `false` when no entry exists; nothing is invoked then.
    pub fn resolve(&mut self, key: &RequestId, result: ClientResult<Value>) -> bool {
        match self.requests.remove(key) {
            Some(pending) => {
                (pending.callback)(result);
                true
            }
            None => false,
        }
    }

    /// Fail every entry older than `timeout` with a request-timeout error.
    ///
    /// Returns how many entries expired.
    pub fn expire(&mut self, timeout: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|(_, pending)| now.duration_since(pending.created_at) >= timeout)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(pending) = self.requests.remove(key) {
                (pending.callback)(Err(ClientError::request_timeout(
                    timeout,
                    key.to_string(),
                )));
            }
        }
        expired.len()
    }

    /// Fail every entry. `error` builds one error per entry.
    pub fn fail_all(&mut self, error: impl Fn() -> ClientError) {
        for (_, pending) in self.requests.drain() {
            (pending.callback)(Err(error()));
        }
    }

    /// Whether an entry exists for `key`.
    pub fn contains(&self, key: &RequestId) -> bool {
        self.requests.contains_key(key)
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl std::fmt::Debug for PendingRequestTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequestTable")
            .field("len", &self.requests.len())
            .finish()
    }
}
