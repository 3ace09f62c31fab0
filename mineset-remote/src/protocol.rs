use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RemoteError, Result};

/// JSON-lines request sent to a mining endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

/// Response correlated to a request by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RemoteRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRpcError {
    pub code: i32,
    pub message: String,
}

/// Server-initiated message (no id field)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNotification {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Mining specification as declared by the endpoint, before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub chain_id: String,
    pub hashing_for_deadlines: String,
    pub signature_for_blocks: String,
    pub signature_for_deadlines: String,
    pub public_key_for_signing_blocks_base58: String,
}

/// Protocol methods
pub mod methods {
    pub const HELLO: &str = "mining.hello";
    pub const GET_BALANCE: &str = "mining.get_balance";
    pub const GET_SPECIFICATION: &str = "mining.get_specification";
    pub const CHALLENGE: &str = "mining.challenge";
    pub const SHOW_MESSAGE: &str = "client.show_message";
}

impl RemoteRequest {
    /// Announce the local miner identity
    pub fn hello(id: u64, user_agent: &str, public_key_base58: &str, signature: &str) -> Self {
        Self {
            id,
            method: methods::HELLO.to_string(),
            params: vec![
                Value::String(user_agent.to_string()),
                Value::String(public_key_base58.to_string()),
                Value::String(signature.to_string()),
            ],
        }
    }

    pub fn get_balance(id: u64, signature: &str, public_key_base58: &str) -> Self {
        Self {
            id,
            method: methods::GET_BALANCE.to_string(),
            params: vec![
                Value::String(signature.to_string()),
                Value::String(public_key_base58.to_string()),
            ],
        }
    }

    pub fn get_specification(id: u64) -> Self {
        Self {
            id,
            method: methods::GET_SPECIFICATION.to_string(),
            params: vec![],
        }
    }
}

impl RemoteResponse {
    /// Turn an error payload into `RemoteError::Rpc`, otherwise yield the result
    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(RemoteError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// A line coming from the endpoint is either a response or a notification
#[derive(Debug, Clone)]
pub enum Incoming {
    Response(RemoteResponse),
    Notification(RemoteNotification),
}

impl Incoming {
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)?;
        if value.get("id").map_or(false, |id| !id.is_null()) {
            Ok(Incoming::Response(serde_json::from_value(value)?))
        } else if value.get("method").is_some() {
            Ok(Incoming::Notification(serde_json::from_value(value)?))
        } else {
            Err(RemoteError::Protocol(format!("unrecognized message: {}", line)))
        }
    }
}

/// Balance is `null` when the endpoint does not know the key, decimal text otherwise
pub fn parse_balance(result: &Value) -> Result<Option<BigUint>> {
    match result {
        Value::Null => Ok(None),
        Value::String(text) => text
            .parse::<BigUint>()
            .map(Some)
            .map_err(|_| RemoteError::Protocol(format!("invalid balance: {}", text))),
        Value::Number(n) => n
            .as_u64()
            .map(|n| Some(BigUint::from(n)))
            .ok_or_else(|| RemoteError::Protocol(format!("invalid balance: {}", n))),
        other => Err(RemoteError::Protocol(format!("invalid balance: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_response_and_notification() {
        let response = Incoming::parse(r#"{"id":7,"result":"12"}"#).unwrap();
        assert!(matches!(response, Incoming::Response(ref r) if r.id == 7));

        let notification = Incoming::parse(r#"{"method":"mining.challenge","params":[1]}"#).unwrap();
        assert!(matches!(notification, Incoming::Notification(ref n) if n.method == methods::CHALLENGE));

        assert!(Incoming::parse(r#"{"foo":1}"#).is_err());
        assert!(Incoming::parse("not json").is_err());
    }

    #[test]
    fn test_parse_balance() {
        assert_eq!(parse_balance(&Value::Null).unwrap(), None);
        assert_eq!(
            parse_balance(&Value::String("123456789012345678901234567890".into())).unwrap(),
            Some("123456789012345678901234567890".parse::<BigUint>().unwrap())
        );
        assert_eq!(parse_balance(&serde_json::json!(42)).unwrap(), Some(BigUint::from(42u32)));
        assert!(parse_balance(&Value::String("-1".into())).is_err());
        assert!(parse_balance(&Value::Bool(true)).is_err());
    }

    #[test]
    fn test_rpc_error_surfaces() {
        let response = RemoteResponse {
            id: 1,
            result: None,
            error: Some(RemoteRpcError { code: -3, message: "unknown key".into() }),
        };
        assert!(matches!(response.into_result(), Err(RemoteError::Rpc { code: -3, .. })));
    }

    #[test]
    fn test_specification_field_names() {
        let json = r#"{
            "name": "octopus",
            "description": "test chain",
            "chainId": "octopus",
            "hashingForDeadlines": "shabal256",
            "signatureForBlocks": "ed25519",
            "signatureForDeadlines": "ed25519",
            "publicKeyForSigningBlocksBase58": "4ZmQ"
        }"#;
        let spec: SpecificationPayload = serde_json::from_str(json).unwrap();
        assert_eq!(spec.chain_id, "octopus");
        assert_eq!(spec.hashing_for_deadlines, "shabal256");
    }
}
