use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// A logical request submitted to the orchestrator.
///
/// Immutable once built; the pool clones one per worker task so every worker
/// reads its own record.
#[derive(Debug, Clone)]
pub struct Request {
    /// Unique id, auto-generated from a per-process counter when not
    /// supplied.
    pub id: String,
    /// JSON payload sent as the request's `input_data`.
    pub payload: serde_json::Value,
    /// Caller-supplied tracking metadata; carried through untouched.
    pub metadata: HashMap<String, String>,
    /// Conversation this request belongs to, if any.
    pub conversation_id: Option<String>,
}

impl Request {
    /// Creates a request with an auto-generated id.
    ///
    /// # Panics
    ///
    /// Panics if `payload` is JSON null.
    pub fn new(payload: serde_json::Value) -> Self {
        assert!(!payload.is_null(), "request payload can not be empty");
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("r-{}-{}", std::process::id(), sequence),
            payload,
            metadata: HashMap::new(),
            conversation_id: None,
        }
    }

    /// Overrides the auto-generated id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is empty.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        assert!(!self.id.is_empty(), "request id can not be empty");
        self
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Pins the conversation id.
    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// The wire form of this request.
    pub fn to_input_data(&self) -> serde_json::Value {
        let mut data = serde_json::json!({ "input_data": self.payload });
        if let Some(conversation_id) = &self.conversation_id {
            data["conversation_id"] = serde_json::Value::String(conversation_id.clone());
        }
        data
    }
}
