use std::collections::BTreeMap;

use async_trait::async_trait;
use projbot_core::errors::{ApiError, FailureKind};
use projbot_zoho::client::ProjectsClient;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
}

impl ParamKind {
    fn schema_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(kind: ParamKind, description: &'static str) -> Self {
        Self { kind, required: true, description }
    }

    pub fn optional(kind: ParamKind, description: &'static str) -> Self {
        Self { kind, required: false, description }
    }
}

/// Declared surface of one operation. Doubles as the function-calling schema
/// handed to the reasoning function and as the validation contract enforced
/// before any backend call.
#[derive(Clone, Debug)]
pub struct OperationSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<(&'static str, ParamSpec)>,
}

impl OperationSpec {
    /// Function-calling tool schema in the chat-completions shape.
    pub fn schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, param) in &self.params {
            properties.insert(
                (*name).to_string(),
                json!({ "type": param.kind.schema_type(), "description": param.description }),
            );
            if param.required {
                required.push(json!(name));
            }
        }
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                },
            },
        })
    }

    /// Checks presence and type of every declared parameter. The message
    /// names the offending field so the model can correct itself.
    pub fn validate_args(&self, args: &Value) -> Result<(), String> {
        let empty = Map::new();
        let object = match args {
            Value::Object(object) => object,
            Value::Null => &empty,
            other => {
                return Err(format!(
                    "arguments must be an object, got {}",
                    value_kind(other)
                ))
            }
        };

        for (name, param) in &self.params {
            match object.get(*name) {
                None | Some(Value::Null) => {
                    if param.required {
                        return Err(format!("missing required parameter '{name}'"));
                    }
                }
                Some(value) => {
                    if !param.kind.accepts(value) {
                        return Err(format!(
                            "parameter '{name}' must be a {}, got {}",
                            param.kind.schema_type(),
                            value_kind(value)
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Outcome of one operation invocation. Failures here are data for the
/// reasoning loop, not turn-ending errors.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationResult {
    Success { data: Value },
    Failure { kind: FailureKind, message: String, retry_after_secs: Option<u64> },
}

impl OperationResult {
    pub fn success(data: Value) -> Self {
        OperationResult::Success { data }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        OperationResult::Failure {
            kind: FailureKind::Validation,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn from_error(error: ApiError) -> Self {
        let retry_after_secs = match &error {
            ApiError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        };
        OperationResult::Failure { kind: error.kind(), message: error.to_string(), retry_after_secs }
    }

    /// Serialized form fed back to the model as the tool message body.
    pub fn to_message(&self) -> String {
        let value = match self {
            OperationResult::Success { data } => json!({ "ok": true, "data": data }),
            OperationResult::Failure { kind, message, retry_after_secs } => json!({
                "ok": false,
                "error": {
                    "kind": kind,
                    "message": message,
                    "retry_after_secs": retry_after_secs,
                },
            }),
        };
        value.to_string()
    }
}

#[async_trait]
pub trait Operation: Send + Sync {
    fn spec(&self) -> OperationSpec;

    /// Runs the operation. `args` have already passed `validate_args`.
    async fn invoke(&self, args: &Value, client: &ProjectsClient) -> OperationResult;
}

/// Name-keyed catalog of operations. Iteration order is the catalog order
/// presented to the model, so it stays deterministic.
#[derive(Default)]
pub struct OperationRegistry {
    operations: BTreeMap<&'static str, Box<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation: impl Operation + 'static) {
        let name = operation.spec().name;
        self.operations.insert(name, Box::new(operation));
    }

    pub fn resolve(&self, name: &str) -> Option<&dyn Operation> {
        self.operations.get(name).map(Box::as_ref)
    }

    pub fn catalog(&self) -> Vec<OperationSpec> {
        self.operations.values().map(|operation| operation.spec()).collect()
    }

    pub fn schemas(&self) -> Vec<Value> {
        self.operations.values().map(|operation| operation.spec().schema()).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

// Argument extraction helpers for operations. Validation has already run,
// so required fields are present with the right type.

pub(crate) fn required_str(args: &Value, name: &str) -> String {
    args.get(name).and_then(Value::as_str).unwrap_or_default().to_string()
}

pub(crate) fn optional_str(args: &Value, name: &str) -> Option<String> {
    args.get(name).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn optional_i64(args: &Value, name: &str) -> Option<i64> {
    args.get(name).and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use projbot_core::errors::{ApiError, FailureKind};
    use serde_json::json;

    use super::{OperationResult, OperationSpec, ParamKind, ParamSpec};

    fn sample_spec() -> OperationSpec {
        OperationSpec {
            name: "create_task",
            description: "Create a task in a project",
            params: vec![
                ("project_id", ParamSpec::required(ParamKind::String, "Project id")),
                ("name", ParamSpec::required(ParamKind::String, "Task name")),
                ("percent_complete", ParamSpec::optional(ParamKind::Integer, "0-100")),
            ],
        }
    }

    #[test]
    fn validation_names_the_missing_parameter() {
        let error = sample_spec()
            .validate_args(&json!({ "project_id": "123" }))
            .expect_err("name is required");
        assert!(error.contains("'name'"), "message was: {error}");
    }

    #[test]
    fn validation_rejects_wrong_types_by_field() {
        let error = sample_spec()
            .validate_args(&json!({
                "project_id": "123",
                "name": "Ship",
                "percent_complete": "fifty"
            }))
            .expect_err("percent_complete must be an integer");
        assert!(error.contains("'percent_complete'"), "message was: {error}");
        assert!(error.contains("integer"), "message was: {error}");
    }

    #[test]
    fn validation_accepts_omitted_optionals() {
        sample_spec()
            .validate_args(&json!({ "project_id": "123", "name": "Ship" }))
            .expect("optionals may be absent");
    }

    #[test]
    fn schema_declares_only_required_fields_as_required() {
        let schema = sample_spec().schema();
        assert_eq!(schema["function"]["name"], "create_task");
        assert_eq!(
            schema["function"]["parameters"]["required"],
            json!(["project_id", "name"])
        );
        assert_eq!(
            schema["function"]["parameters"]["properties"]["percent_complete"]["type"],
            "integer"
        );
    }

    #[test]
    fn rate_limit_failures_keep_the_retry_hint() {
        let result =
            OperationResult::from_error(ApiError::RateLimited { retry_after_secs: Some(30) });

        match &result {
            OperationResult::Failure { kind, retry_after_secs, .. } => {
                assert_eq!(*kind, FailureKind::RateLimited);
                assert_eq!(*retry_after_secs, Some(30));
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let message: serde_json::Value =
            serde_json::from_str(&result.to_message()).expect("message is json");
        assert_eq!(message["ok"], false);
        assert_eq!(message["error"]["kind"], "rate_limited");
        assert_eq!(message["error"]["retry_after_secs"], 30);
    }
}
