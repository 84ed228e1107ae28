//! Explicit conversation-scope propagation.
//!
//! A [`ConversationScope`] carries the ambient conversation identifier
//! across the worker pool. Unlike thread-local context, the scope is an
//! explicit argument to the batch API: each worker reads the id from its own
//! immutable task record at submission time, so every worker observes the
//! same scoped context as the submitter.

use std::sync::Mutex;

use crate::request::Request;

/// Shared conversation state for a batch of requests.
#[derive(Debug, Default)]
pub struct ConversationScope {
    inner: Mutex<Option<String>>,
}

impl ConversationScope {
    /// Creates an empty scope; the first captured id wins.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope pinned to a known conversation.
    pub fn with_id(conversation_id: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Some(conversation_id.into())),
        }
    }

    /// The current conversation id, if one has been captured.
    pub fn conversation_id(&self) -> Option<String> {
        self.inner.lock().unwrap().clone()
    }

    /// Captures `conversation_id` unless one is already set. Returns the
    /// winning id. Concurrent workers race safely: first writer wins.
    pub fn capture_if_absent(&self, conversation_id: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        match &*inner {
            Some(existing) => existing.clone(),
            None => {
                *inner = Some(conversation_id.to_string());
                conversation_id.to_string()
            }
        }
    }

    /// Returns the request enriched with the scope's conversation id.
    ///
    /// An explicit `conversation_id` on the request takes precedence; the
    /// request is returned unchanged.
    pub fn enrich(&self, request: Request) -> Request {
        if request.conversation_id.is_some() {
            return request;
        }
        match self.conversation_id() {
            Some(conversation_id) => request.with_conversation_id(conversation_id),
            None => request,
        }
    }
}
