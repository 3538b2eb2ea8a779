//! Outstanding-call bookkeeping.
//!
//! [`PendingCalls`] maps a JSON-RPC request id to the [`oneshot`] sender of
//! the task awaiting its response. Each id resolves at most once: the
//! entry is removed before the response is delivered, so a duplicate
//! response finds nothing and is dropped. Closing the map drops every
//! remaining sender, which the awaiting callers observe as a rejection.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::{AppError, Result};

#[derive(Debug, Default)]
struct Inner {
    waiting: HashMap<u64, oneshot::Sender<Value>>,
    closed: Option<String>,
}

/// Shared registry of calls awaiting a response.
#[derive(Debug, Clone, Default)]
pub struct PendingCalls {
    inner: Arc<Mutex<Inner>>,
}

impl PendingCalls {
    /// Create an empty, open registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` and return the receiver that will carry its response.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotConnected`] if the registry was closed.
    /// - [`AppError::Acp`] if `id` is already outstanding.
    pub async fn register(&self, id: u64) -> Result<oneshot::Receiver<Value>> {
        let mut inner = self.inner.lock().await;
        if let Some(reason) = &inner.closed {
            return Err(AppError::NotConnected(reason.clone()));
        }
        if inner.waiting.contains_key(&id) {
            return Err(AppError::Acp(format!("call id {id} already outstanding")));
        }
        let (tx, rx) = oneshot::channel();
        inner.waiting.insert(id, tx);
        Ok(rx)
    }

    /// Deliver `response` to the caller waiting on `id`.
    ///
    /// Returns `false` when no call with that id is outstanding (already
    /// resolved, cancelled, or never issued).
    pub async fn resolve(&self, id: u64, response: Value) -> bool {
        let sender = self.inner.lock().await.waiting.remove(&id);
        match sender {
            Some(tx) => {
                if tx.send(response).is_err() {
                    debug!(call_id = id, "caller went away before its response arrived");
                }
                true
            }
            None => false,
        }
    }

    /// Forget `id` without resolving it. Returns whether it was outstanding.
    pub async fn cancel(&self, id: u64) -> bool {
        self.inner.lock().await.waiting.remove(&id).is_some()
    }

    /// Reject every outstanding call and refuse new registrations.
    ///
    /// Idempotent; the first reason wins. Returns the number of calls that
    /// were rejected by this invocation.
    pub async fn close(&self, reason: &str) -> usize {
        let mut inner = self.inner.lock().await;
        if inner.closed.is_none() {
            inner.closed = Some(reason.to_owned());
        }
        let rejected = inner.waiting.len();
        inner.waiting.clear();
        rejected
    }

    /// Why the registry was closed, if it was.
    pub async fn close_reason(&self) -> Option<String> {
        self.inner.lock().await.closed.clone()
    }

    /// Number of calls currently awaiting a response.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.waiting.len()
    }

    /// Whether no calls are outstanding.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
