use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single diagram edit exchanged between clients
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Operation {
    /// add, update, remove, or any client defined ephemeral type
    #[serde(rename = "type")]
    pub op_type: String,
    /// The affected diagram element, or its identifier
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub component: Option<serde_json::Value>,
}

impl Operation {
    pub fn new(op_type: &str, component: Option<serde_json::Value>) -> Self {
        Self {
            op_type: op_type.to_string(),
            component,
        }
    }

    /// Identifier of the affected element, read from `component.id` or a bare string component
    pub fn component_id(&self) -> Option<&str> {
        match self.component.as_ref()? {
            serde_json::Value::String(id) => Some(id.as_str()),
            value => value.get("id").and_then(|id| id.as_str()),
        }
    }
}

/// Message sent by a client over its connection
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ClientMessage {
    pub operation: Operation,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Join,
    Leave,
    Update,
}

/// Message relayed to the participants of a session
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct CollabMessage {
    pub event: EventKind,
    pub user_id: String,
    pub operation: Operation,
}

impl CollabMessage {
    pub fn join(user_id: &str) -> Self {
        Self {
            event: EventKind::Join,
            user_id: user_id.to_string(),
            operation: Operation::new("join", None),
        }
    }

    pub fn leave(user_id: &str) -> Self {
        Self {
            event: EventKind::Leave,
            user_id: user_id.to_string(),
            operation: Operation::new("leave", None),
        }
    }

    pub fn update(user_id: &str, operation: Operation) -> Self {
        Self {
            event: EventKind::Update,
            user_id: user_id.to_string(),
            operation,
        }
    }
}

/// Largest operation a client may send, in serialized bytes
pub const MAX_OPERATION_BYTES: usize = 50 * 1024;

/// Reasons an inbound frame is rejected
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("operation type must not be empty")]
    MissingType,
    #[error("operation of {0} bytes exceeds the limit of {limit} bytes", limit = MAX_OPERATION_BYTES)]
    TooLarge(usize),
    #[error("invalid '{op_type}' operation: {reason}")]
    InvalidOperation { op_type: String, reason: &'static str },
}

/// Decode a client frame into the operation it carries.
/// Structural edits are validated here; other types pass through untouched.
pub fn decode_client_message(text: &str) -> Result<Operation, ProtocolError> {
    let msg: ClientMessage = serde_json::from_str(text)?;
    let operation = msg.operation;
    if operation.op_type.trim().is_empty() {
        return Err(ProtocolError::MissingType);
    }

    let size = serde_json::to_vec(&operation)?.len();
    if size > MAX_OPERATION_BYTES {
        return Err(ProtocolError::TooLarge(size));
    }

    validate_operation(&operation)?;
    Ok(operation)
}

/// Check the component shape of `add`, `update` and `remove`
pub fn validate_operation(operation: &Operation) -> Result<(), ProtocolError> {
    let invalid = |reason: &'static str| ProtocolError::InvalidOperation {
        op_type: operation.op_type.clone(),
        reason,
    };

    match operation.op_type.as_str() {
        "add" | "update" => {
            let Some(component) = operation.component.as_ref().filter(|c| c.is_object()) else {
                return Err(invalid("component object is required"));
            };
            match component.get("id").and_then(|id| id.as_str()) {
                Some(id) if !id.trim().is_empty() => Ok(()),
                _ => Err(invalid("component id is required")),
            }
        }
        "remove" => match operation.component_id() {
            Some(id) if !id.trim().is_empty() => Ok(()),
            _ => Err(invalid("component id is required")),
        },
        _ => Ok(()),
    }
}
