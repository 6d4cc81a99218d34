use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Serialize)]
struct RpcRequest<'a> {
    id: u32,
    jsonrpc: &'a str,
    method: &'a str,
    params: Value,
}

pub fn encode_request(method: &str, params: Value) -> Vec<u8> {
    let request = RpcRequest {
        id: 0,
        jsonrpc: "2.0",
        method,
        params,
    };
    serde_json::to_vec(&request).expect("BUG: request envelope always serializes")
}

#[derive(Deserialize, Debug)]
struct RawRpcError {
    #[allow(dead_code)]
    code: Option<i64>,
    message: String,
}

#[derive(Deserialize, Debug)]
struct RawRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RawRpcError>,
}

/// A decoded JSON-RPC response, distinguishing a present-but-null result
/// (`Null`) from an absent/malformed result shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcEnvelope {
    Result(Value),
    Null,
    Error(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("response body is not a valid JSON-RPC envelope: {0}")]
pub struct CodecError(pub String);

pub fn decode_response(body: &[u8]) -> Result<RpcEnvelope, CodecError> {
    let raw: RawRpcResponse =
        serde_json::from_slice(body).map_err(|e| CodecError(e.to_string()))?;
    if let Some(error) = raw.error {
        return Ok(RpcEnvelope::Error(error.message));
    }
    match raw.result {
        None => Err(CodecError("response has neither result nor error".to_string())),
        Some(Value::Null) => Ok(RpcEnvelope::Null),
        Some(value) => Ok(RpcEnvelope::Result(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_result() {
        let body = br#"{"id":0,"jsonrpc":"2.0","result":"0x1b4"}"#;
        assert_eq!(
            decode_response(body).unwrap(),
            RpcEnvelope::Result(Value::String("0x1b4".to_string()))
        );
    }

    #[test]
    fn decodes_null_result() {
        let body = br#"{"id":0,"jsonrpc":"2.0","result":null}"#;
        assert_eq!(decode_response(body).unwrap(), RpcEnvelope::Null);
    }

    #[test]
    fn decodes_error() {
        let body = br#"{"id":0,"jsonrpc":"2.0","error":{"code":-32000,"message":"boom"}}"#;
        assert_eq!(
            decode_response(body).unwrap(),
            RpcEnvelope::Error("boom".to_string())
        );
    }

    #[test]
    fn rejects_malformed_shape() {
        let body = br#"{"id":0,"jsonrpc":"2.0"}"#;
        assert!(decode_response(body).is_err());
    }

    #[test]
    fn rejects_non_json() {
        assert!(decode_response(b"not json").is_err());
    }
}
