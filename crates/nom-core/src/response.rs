//! JSON result object of a command execution

use serde::{Deserialize, Serialize};

use crate::Value;

/// Overall outcome of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// `{status, results?, errors?}`
///
/// `errors` is present exactly when `status` is `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Response {
    /// Build a response; status follows from the error list
    pub fn new(results: Option<Value>, errors: Vec<String>) -> Self {
        let status = if errors.is_empty() {
            Status::Success
        } else {
            Status::Error
        };
        Self {
            status,
            results,
            errors,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(None, vec![message.into()])
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({"status": "error", "errors": ["unserializable response"]})
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialization_shape() {
        let ok = Response::new(Some(json!({"power_sum": 30})), vec![]);
        assert_eq!(
            ok.to_json(),
            json!({"status": "success", "results": {"power_sum": 30}})
        );

        let failed = Response::error("Nothing to do");
        assert_eq!(
            failed.to_json(),
            json!({"status": "error", "errors": ["Nothing to do"]})
        );
    }
}
