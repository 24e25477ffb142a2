//! The `RpcTransport` trait: how an aggregate call reaches a node.

use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Submits JSON-RPC requests to an endpoint.
///
/// The endpoint is passed per request rather than bound at construction,
/// so a single transport keeps working when a watcher is recreated
/// against a different network.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request to `endpoint` and return the response.
    async fn send(
        &self,
        endpoint: &str,
        req: JsonRpcRequest,
    ) -> Result<JsonRpcResponse, TransportError>;

    /// Short identifier for logs.
    fn name(&self) -> &str {
        "rpc"
    }

    /// `eth_call` `data` against contract `to` at the latest block and
    /// return the raw return bytes.
    async fn eth_call(
        &self,
        endpoint: &str,
        id: u64,
        to: Address,
        data: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let req = JsonRpcRequest::eth_call(id, &format!("{to:#x}"), data);
        let resp = self.send(endpoint, req).await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        match result {
            Value::String(s) => {
                let raw = s.strip_prefix("0x").unwrap_or(&s);
                hex::decode(raw).map_err(|e| {
                    TransportError::InvalidResponse(format!("eth_call result is not hex: {e}"))
                })
            }
            other => Err(TransportError::InvalidResponse(format!(
                "eth_call result is not a string: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{JsonRpcError, RpcId};

    struct Fixed(Result<Value, JsonRpcError>);

    #[async_trait]
    impl RpcTransport for Fixed {
        async fn send(
            &self,
            _endpoint: &str,
            req: JsonRpcRequest,
        ) -> Result<JsonRpcResponse, TransportError> {
            Ok(match &self.0 {
                Ok(v) => JsonRpcResponse::success(req.id, v.clone()),
                Err(e) => JsonRpcResponse::failure(RpcId::Null, e.clone()),
            })
        }
    }

    #[tokio::test]
    async fn eth_call_decodes_hex_result() {
        let t = Fixed(Ok(Value::String("0x0102ff".into())));
        let out = t.eth_call("http://node", 1, Address::ZERO, &[]).await.unwrap();
        assert_eq!(out, vec![0x01, 0x02, 0xff]);
    }

    #[tokio::test]
    async fn eth_call_surfaces_rpc_error() {
        let t = Fixed(Err(JsonRpcError {
            code: 3,
            message: "execution reverted".into(),
            data: None,
        }));
        let err = t.eth_call("http://node", 1, Address::ZERO, &[]).await.unwrap_err();
        assert!(err.is_revert());
    }

    #[tokio::test]
    async fn eth_call_rejects_non_string_result() {
        let t = Fixed(Ok(Value::Bool(true)));
        let err = t.eth_call("http://node", 1, Address::ZERO, &[]).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidResponse(_)));
    }
}
