use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input to a single endpoint call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Variables {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Value>,
    /// Passed through to the endpoint untouched, never merged.
    #[serde(default)]
    pub meta: Value,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(mut self, request: Value) -> Self {
        self.request = Some(request);
        self
    }

    pub fn pagination(mut self, pagination: Value) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }
}

impl From<Value> for Variables {
    fn from(request: Value) -> Self {
        Self::new().request(request)
    }
}
