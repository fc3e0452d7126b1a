use serde::{Deserialize, Serialize};
use serde_json::Value;

// Generic wallet RPC surface.
pub const METHOD_CLIENT_VERSION: &str = "web3_clientVersion";
pub const METHOD_GET_SNAPS: &str = "wallet_getSnaps";
pub const METHOD_REQUEST_SNAPS: &str = "wallet_requestSnaps";
pub const METHOD_INVOKE_SNAP: &str = "wallet_invokeSnap";
pub const METHOD_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
pub const METHOD_SEND_TRANSACTION: &str = "eth_sendTransaction";
pub const METHOD_SIGN: &str = "eth_sign";

// Wire error codes the wallet transport reports.
pub const CODE_USER_REJECTED: i64 = 4001;
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
pub const CODE_INVALID_PARAMS: i64 = -32602;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderWireError {
    pub code: i64,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderWireMessage {
    Request {
        id: u64,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Response {
        id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<ProviderWireError>,
    },
}

impl ProviderWireMessage {
    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn success(id: u64, result: Value) -> Self {
        Self::Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self::Response {
            id,
            result: None,
            error: Some(ProviderWireError {
                code,
                message: message.into(),
            }),
        }
    }
}
