//! HTTP implementation of [`ChainRpc`].
//!
//! Reads go to a JSON-RPC node (`getAccountInfo`, `getSignatureStatuses`).
//! Writes go to a signing relay: `POST {relay_url}/v1/instructions` with a
//! bearer token; the relay builds, signs and sends the transaction and answers
//! its signature. The relay token is passed in by the caller; do not log it.

use std::time::Duration;

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use w3b_schemas::Address;

use crate::instruction::Instruction;
use crate::rpc::{ChainError, ChainRpc, SignatureStatus, TxSignature};

#[derive(Debug, Clone)]
pub struct HttpChainClient {
    rpc: reqwest::Client,
    relay: reqwest::Client,
    rpc_url: String,
    relay_url: String,
}

impl HttpChainClient {
    pub fn new(
        rpc_url: &str,
        relay_url: &str,
        relay_token: &str,
        timeout: Duration,
    ) -> Result<Self, ChainError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let rpc = reqwest::Client::builder()
            .default_headers(headers.clone())
            .timeout(timeout)
            .build()?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {relay_token}"))
            .map_err(|e| ChainError::Transport(format!("invalid relay token header: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let relay = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            rpc,
            relay,
            rpc_url: rpc_url.trim_end_matches('/').to_string(),
            relay_url: relay_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self.rpc.post(&self.rpc_url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ChainError::Rpc {
                code: i64::from(status.as_u16()),
                message: text,
            });
        }

        let envelope: RpcEnvelope = resp
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{method}: {e}")))?;

        if let Some(err) = envelope.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| ChainError::Decode(format!("{method}: neither result nor error")))
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AccountValue {
    /// `[payload, encoding]`
    data: (String, String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusValue {
    confirmation_status: Option<String>,
    err: Option<Value>,
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    instruction: &'a str,
    /// base64 of the encoded instruction data
    data: String,
    args: &'a Instruction,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    signature: String,
}

#[async_trait::async_trait]
impl ChainRpc for HttpChainClient {
    async fn get_account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, ChainError> {
        let result = self
            .call(
                "getAccountInfo",
                json!([address.to_string(), {"encoding": "base64", "commitment": "confirmed"}]),
            )
            .await?;

        let value = result.get("value").cloned().unwrap_or(Value::Null);
        if value.is_null() {
            return Ok(None);
        }
        let account: AccountValue = serde_json::from_value(value)
            .map_err(|e| ChainError::Decode(format!("getAccountInfo value: {e}")))?;
        if account.data.1 != "base64" {
            return Err(ChainError::Decode(format!(
                "getAccountInfo: unexpected encoding '{}'",
                account.data.1
            )));
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(account.data.0.as_bytes())
            .map_err(|e| ChainError::Decode(format!("account data base64: {e}")))?;
        debug!(address = %address, len = bytes.len(), "account fetched");
        Ok(Some(bytes))
    }

    async fn submit(&self, instruction: &Instruction) -> Result<TxSignature, ChainError> {
        let url = format!("{}/v1/instructions", self.relay_url);
        let req = RelayRequest {
            instruction: instruction.program_name(),
            data: base64::engine::general_purpose::STANDARD.encode(instruction.encode()),
            args: instruction,
        };

        let resp = self.relay.post(&url).json(&req).send().await?;
        let status = resp.status();
        if status.is_success() {
            let body: RelayResponse = resp
                .json()
                .await
                .map_err(|e| ChainError::Decode(format!("relay response: {e}")))?;
            return Ok(TxSignature(body.signature));
        }

        let text = resp.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(ChainError::Unauthorized(text)),
            // Simulation failed: the program refused the instruction.
            422 => Err(ChainError::Rejected {
                instruction: instruction.program_name().to_string(),
                reason: text,
            }),
            code => Err(ChainError::Relay {
                status: code,
                message: text,
            }),
        }
    }

    async fn signature_status(&self, signature: &TxSignature) -> Result<SignatureStatus, ChainError> {
        let result = self
            .call(
                "getSignatureStatuses",
                json!([[signature.0], {"searchTransactionHistory": true}]),
            )
            .await?;

        let first = result
            .get("value")
            .and_then(|v| v.get(0))
            .cloned()
            .unwrap_or(Value::Null);
        if first.is_null() {
            return Ok(SignatureStatus::Pending);
        }

        let status: StatusValue = serde_json::from_value(first)
            .map_err(|e| ChainError::Decode(format!("getSignatureStatuses value: {e}")))?;
        if let Some(err) = status.err.filter(|e| !e.is_null()) {
            return Ok(SignatureStatus::Failed(err.to_string()));
        }
        Ok(match status.confirmation_status.as_deref() {
            Some("confirmed") | Some("finalized") => SignatureStatus::Confirmed,
            _ => SignatureStatus::Pending,
        })
    }
}
