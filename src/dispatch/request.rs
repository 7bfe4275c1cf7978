//! Inbound request and response types.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::LookupSource;

/// The operations the gateway fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Explain,
    Analyze,
    Summarize,
    Dashboard,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Explain,
        OperationKind::Analyze,
        OperationKind::Summarize,
        OperationKind::Dashboard,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Explain => "explain",
            OperationKind::Analyze => "analyze",
            OperationKind::Summarize => "summarize",
            OperationKind::Dashboard => "dashboard",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation '{0}'")]
pub struct UnknownOperation(pub String);

impl FromStr for OperationKind {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

/// One operation request as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub user_id: String,
    pub operation: OperationKind,
    pub payload: Value,
    #[serde(default)]
    pub options: Value,
}

impl GatewayRequest {
    pub fn new(user_id: impl Into<String>, operation: OperationKind, payload: Value) -> Self {
        Self {
            user_id: user_id.into(),
            operation,
            payload,
            options: Value::Null,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }
}

/// Successful outcome of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub result: Arc<Value>,
    /// Set when `result` is an expired value served because the upstream failed.
    pub stale: bool,
    pub cache: LookupSource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_kind_names() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>(), Ok(kind));
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
        assert_eq!(
            "translate".parse::<OperationKind>(),
            Err(UnknownOperation("translate".into()))
        );
    }

    #[test]
    fn test_options_default_to_null() {
        let request: GatewayRequest = serde_json::from_value(json!({
            "user_id": "alice",
            "operation": "summarize",
            "payload": {"text": "hello"}
        }))
        .unwrap();
        assert_eq!(request.operation, OperationKind::Summarize);
        assert_eq!(request.options, Value::Null);
    }
}
