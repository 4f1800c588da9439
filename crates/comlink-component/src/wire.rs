use bytes::Bytes;
use comlink_frame::{Message, Metadata};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::correlation::CorrelationId;
use crate::error::ProtocolError;

/// Request expecting exactly one reply.
pub const ACTION_CALL: &str = "call";
/// Reply to a call.
pub const ACTION_CALL_RETURN: &str = "call-return";
/// Fire-and-forget request.
pub const ACTION_CAST: &str = "cast";
/// Join a named group for discovery.
pub const ACTION_REGISTER: &str = "register";
/// Reply to a register.
pub const ACTION_REGISTER_RETURN: &str = "register-return";
/// Request a dynamically provisioned resource.
pub const ACTION_ACQUIRE: &str = "acquire";
/// Reply to an acquire.
pub const ACTION_ACQUIRE_RETURN: &str = "acquire-return";

pub const KEY_ACTION: &str = "action";
pub const KEY_COMPONENT: &str = "component";
pub const KEY_GROUP: &str = "group";
pub const KEY_OPERATION: &str = "operation";
pub const KEY_CORRELATION: &str = "correlation";
pub const KEY_INPUTS: &str = "inputs";
pub const KEY_OUTPUTS: &str = "outputs";
pub const KEY_ERROR: &str = "error";
pub const KEY_OK: &str = "ok";
pub const KEY_SPECIFICATIONS: &str = "specifications";
pub const KEY_DESCRIPTORS: &str = "descriptors";

/// The one currently supported resource kind.
pub const RESOURCE_SOCKET_IPV4_TCP: &str = "socket:ipv4:tcp";

/// Descriptor of a provisioned TCP/IPv4 socket endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketDescriptor {
    pub ip: String,
    pub port: u16,
    pub fqdn: String,
}

/// Resource specifications for an acquire: resource-kind → parameters.
#[derive(Debug, Clone, Default)]
pub struct AcquireSpec {
    specifications: Metadata,
}

impl AcquireSpec {
    /// Request one TCP/IPv4 socket endpoint with default parameters.
    pub fn socket_ipv4_tcp() -> Self {
        let mut spec = Self::default();
        spec.specifications
            .insert(RESOURCE_SOCKET_IPV4_TCP.to_string(), json!({}));
        spec
    }

    /// Add or replace the parameters for one resource kind.
    pub fn with(mut self, kind: &str, parameters: Value) -> Self {
        self.specifications.insert(kind.to_string(), parameters);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.specifications.is_empty()
    }

    fn into_value(self) -> Value {
        Value::Object(self.specifications)
    }
}

/// Application outcome of an inbound call, fed back through `call_return`.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Ok { outputs: Value, payload: Bytes },
    Err { error: Value },
}

// --- outbound message builders ---

pub(crate) fn call_message(
    component: &str,
    operation: &str,
    inputs: Value,
    correlation: &CorrelationId,
    payload: Bytes,
) -> Message {
    let mut metadata = Metadata::new();
    metadata.insert(KEY_ACTION.into(), json!(ACTION_CALL));
    metadata.insert(KEY_COMPONENT.into(), json!(component));
    metadata.insert(KEY_OPERATION.into(), json!(operation));
    metadata.insert(KEY_CORRELATION.into(), json!(correlation.as_str()));
    metadata.insert(KEY_INPUTS.into(), inputs);
    Message::exchange(metadata, payload)
}

pub(crate) fn cast_message(
    component: &str,
    operation: &str,
    inputs: Value,
    payload: Bytes,
) -> Message {
    let mut metadata = Metadata::new();
    metadata.insert(KEY_ACTION.into(), json!(ACTION_CAST));
    metadata.insert(KEY_COMPONENT.into(), json!(component));
    metadata.insert(KEY_OPERATION.into(), json!(operation));
    metadata.insert(KEY_INPUTS.into(), inputs);
    Message::exchange(metadata, payload)
}

pub(crate) fn register_message(group: &str, correlation: &CorrelationId) -> Message {
    let mut metadata = Metadata::new();
    metadata.insert(KEY_ACTION.into(), json!(ACTION_REGISTER));
    metadata.insert(KEY_GROUP.into(), json!(group));
    metadata.insert(KEY_CORRELATION.into(), json!(correlation.as_str()));
    Message::exchange(metadata, Bytes::new())
}

pub(crate) fn acquire_message(spec: AcquireSpec, correlation: &CorrelationId) -> Message {
    let mut metadata = Metadata::new();
    metadata.insert(KEY_ACTION.into(), json!(ACTION_ACQUIRE));
    metadata.insert(KEY_CORRELATION.into(), json!(correlation.as_str()));
    metadata.insert(KEY_SPECIFICATIONS.into(), spec.into_value());
    Message::resources(metadata, Bytes::new())
}

pub(crate) fn call_return_message(correlation: &CorrelationId, outcome: CallOutcome) -> Message {
    let mut metadata = Metadata::new();
    metadata.insert(KEY_ACTION.into(), json!(ACTION_CALL_RETURN));
    metadata.insert(KEY_CORRELATION.into(), json!(correlation.as_str()));
    match outcome {
        CallOutcome::Ok { outputs, payload } => {
            metadata.insert(KEY_OK.into(), json!(true));
            metadata.insert(KEY_OUTPUTS.into(), outputs);
            Message::exchange(metadata, payload)
        }
        CallOutcome::Err { error } => {
            metadata.insert(KEY_OK.into(), json!(false));
            metadata.insert(KEY_ERROR.into(), error);
            Message::exchange(metadata, Bytes::new())
        }
    }
}

/// Well-formed failure return for a correlation-bearing request whose
/// action this component does not support, so the peer is never left
/// waiting indefinitely.
pub(crate) fn unsupported_action_return(correlation: &CorrelationId, action: &str) -> Message {
    let mut metadata = Metadata::new();
    metadata.insert(KEY_ACTION.into(), json!(ACTION_CALL_RETURN));
    metadata.insert(KEY_CORRELATION.into(), json!(correlation.as_str()));
    metadata.insert(KEY_OK.into(), json!(false));
    metadata.insert(
        KEY_ERROR.into(),
        json!({ "code": "unsupported-action", "action": action }),
    );
    Message::exchange(metadata, Bytes::new())
}

// --- inbound message accessors ---

pub(crate) fn action(message: &Message) -> Result<&str, ProtocolError> {
    required_str(message, KEY_ACTION)
}

pub(crate) fn correlation(message: &Message) -> Result<CorrelationId, ProtocolError> {
    required_str(message, KEY_CORRELATION).map(CorrelationId::from_wire)
}

pub(crate) fn required_str<'m>(
    message: &'m Message,
    key: &'static str,
) -> Result<&'m str, ProtocolError> {
    match message.metadata.get(key) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(ProtocolError::InvalidKey { key }),
        None => Err(ProtocolError::MissingKey { key }),
    }
}

pub(crate) fn ok_flag(message: &Message) -> Result<bool, ProtocolError> {
    match message.metadata.get(KEY_OK) {
        Some(Value::Bool(value)) => Ok(*value),
        Some(_) => Err(ProtocolError::InvalidKey { key: KEY_OK }),
        None => Err(ProtocolError::MissingKey { key: KEY_OK }),
    }
}

pub(crate) fn optional_value(message: &Message, key: &str) -> Option<Value> {
    message.metadata.get(key).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_message_carries_the_full_vocabulary() {
        let correlation = CorrelationId::from_wire("c-1");
        let message = call_message(
            "storage",
            "put",
            json!({"key": "k"}),
            &correlation,
            Bytes::from_static(b"blob"),
        );

        assert_eq!(action(&message).unwrap(), ACTION_CALL);
        assert_eq!(required_str(&message, KEY_COMPONENT).unwrap(), "storage");
        assert_eq!(required_str(&message, KEY_OPERATION).unwrap(), "put");
        assert_eq!(super::correlation(&message).unwrap().as_str(), "c-1");
        assert_eq!(
            optional_value(&message, KEY_INPUTS),
            Some(json!({"key": "k"}))
        );
        assert_eq!(message.payload.as_ref(), b"blob");
    }

    #[test]
    fn cast_message_has_no_correlation() {
        let message = cast_message("metrics", "emit", json!({}), Bytes::new());
        assert_eq!(action(&message).unwrap(), ACTION_CAST);
        assert!(matches!(
            super::correlation(&message),
            Err(ProtocolError::MissingKey {
                key: KEY_CORRELATION
            })
        ));
    }

    #[test]
    fn register_message_names_the_group() {
        let correlation = CorrelationId::from_wire("c-2");
        let message = register_message("group-A", &correlation);
        assert_eq!(action(&message).unwrap(), ACTION_REGISTER);
        assert_eq!(required_str(&message, KEY_GROUP).unwrap(), "group-A");
    }

    #[test]
    fn acquire_message_is_resources_kind() {
        let correlation = CorrelationId::from_wire("c-3");
        let message = acquire_message(AcquireSpec::socket_ipv4_tcp(), &correlation);

        assert_eq!(message.kind, comlink_frame::MessageKind::Resources);
        let specs = optional_value(&message, KEY_SPECIFICATIONS).unwrap();
        assert!(specs.get(RESOURCE_SOCKET_IPV4_TCP).is_some());
    }

    #[test]
    fn call_return_success_and_failure_shapes() {
        let correlation = CorrelationId::from_wire("c-4");

        let success = call_return_message(
            &correlation,
            CallOutcome::Ok {
                outputs: json!({"n": 1}),
                payload: Bytes::from_static(b"out"),
            },
        );
        assert_eq!(ok_flag(&success).unwrap(), true);
        assert_eq!(optional_value(&success, KEY_OUTPUTS), Some(json!({"n": 1})));
        assert_eq!(success.payload.as_ref(), b"out");

        let failure = call_return_message(
            &correlation,
            CallOutcome::Err {
                error: json!({"code": "nope"}),
            },
        );
        assert_eq!(ok_flag(&failure).unwrap(), false);
        assert_eq!(
            optional_value(&failure, KEY_ERROR),
            Some(json!({"code": "nope"}))
        );
    }

    #[test]
    fn unsupported_action_return_is_a_failed_call_return() {
        let correlation = CorrelationId::from_wire("c-5");
        let message = unsupported_action_return(&correlation, "defragment");

        assert_eq!(action(&message).unwrap(), ACTION_CALL_RETURN);
        assert_eq!(ok_flag(&message).unwrap(), false);
        let error = optional_value(&message, KEY_ERROR).unwrap();
        assert_eq!(error.get("action"), Some(&json!("defragment")));
    }

    #[test]
    fn socket_descriptor_serde_round_trip() {
        let descriptor = SocketDescriptor {
            ip: "10.0.0.7".into(),
            port: 9400,
            fqdn: "node-7.cluster.local".into(),
        };
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(
            value,
            json!({"ip": "10.0.0.7", "port": 9400, "fqdn": "node-7.cluster.local"})
        );
        let back: SocketDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn mistyped_keys_are_invalid() {
        let mut metadata = Metadata::new();
        metadata.insert(KEY_ACTION.into(), json!(42));
        metadata.insert(KEY_OK.into(), json!("yes"));
        let message = Message::exchange(metadata, Bytes::new());

        assert!(matches!(
            action(&message),
            Err(ProtocolError::InvalidKey { key: KEY_ACTION })
        ));
        assert!(matches!(
            ok_flag(&message),
            Err(ProtocolError::InvalidKey { key: KEY_OK })
        ));
    }
}
