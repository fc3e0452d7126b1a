use crate::provider_protocol::{
    ProviderWireError, ProviderWireMessage, CODE_INVALID_PARAMS, CODE_METHOD_NOT_FOUND,
    CODE_USER_REJECTED, METHOD_REQUEST_ACCOUNTS, METHOD_SEND_TRANSACTION, METHOD_SIGN,
};
use crate::provider_transport::{ProviderTransport, StdioProcessTransport};
use crate::settings::BridgeSettings;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::process::{Command, Stdio};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayErrorCode {
    TransportUnavailable,
    PermissionRejected,
    NotConnected,
    MethodNotFound,
    InvalidParams,
    TransportFailure,
}

impl GatewayErrorCode {
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::TransportUnavailable => "transport_unavailable",
            Self::PermissionRejected => "permission_rejected",
            Self::NotConnected => "not_connected",
            Self::MethodNotFound => "method_not_found",
            Self::InvalidParams => "invalid_params",
            Self::TransportFailure => "transport_failure",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub detail: String,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_tag(), self.detail)
    }
}

impl std::error::Error for GatewayError {}

fn map_wire_error(error: ProviderWireError) -> GatewayError {
    let code = match error.code {
        CODE_USER_REJECTED => GatewayErrorCode::PermissionRejected,
        CODE_METHOD_NOT_FOUND => GatewayErrorCode::MethodNotFound,
        CODE_INVALID_PARAMS => GatewayErrorCode::InvalidParams,
        _ => GatewayErrorCode::TransportFailure,
    };
    GatewayError::new(code, format!("wallet error {}: {}", error.code, error.message))
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl TransactionRequest {
    pub fn transfer(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            value: None,
            data: None,
        }
    }
}

// One wallet round trip per call. A call blocks until the wallet answers:
// the wallet may be waiting on a user prompt, and cancellation is the
// wallet UI's responsibility, so no deadline is enforced here. `&mut self`
// sequences dependent calls within one logical action; independent actions
// on separate gateways are not serialized or queued.
pub struct ProviderGateway {
    transport: Box<dyn ProviderTransport>,
    request_sequence: u64,
    poll_interval: Duration,
}

impl ProviderGateway {
    pub fn new(transport: Box<dyn ProviderTransport>) -> Self {
        Self {
            transport,
            request_sequence: 0,
            poll_interval: Duration::from_millis(10),
        }
    }

    pub fn spawn_bridge(settings: &BridgeSettings) -> Result<Self, GatewayError> {
        if settings.command.trim().is_empty() {
            return Err(GatewayError::new(
                GatewayErrorCode::TransportUnavailable,
                "wallet bridge command is empty",
            ));
        }

        let mut command = Command::new(&settings.command);
        command
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        for (key, value) in &settings.extra_env {
            command.env(key, value);
        }

        let child = command.spawn().map_err(|err| {
            GatewayError::new(
                GatewayErrorCode::TransportUnavailable,
                format!("spawn wallet bridge failed: {err}"),
            )
        })?;

        let transport = StdioProcessTransport::from_child(child)
            .map_err(|err| GatewayError::new(GatewayErrorCode::TransportUnavailable, err))?;

        let mut gateway = Self::new(Box::new(transport));
        gateway.poll_interval = Duration::from_millis(settings.poll_interval_ms.max(1));
        Ok(gateway)
    }

    fn next_request_id(&mut self) -> u64 {
        self.request_sequence = self.request_sequence.saturating_add(1);
        self.request_sequence
    }

    pub fn request(&mut self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let request_id = self.next_request_id();
        self.transport
            .send(&ProviderWireMessage::request(request_id, method, params))
            .map_err(|err| GatewayError::new(GatewayErrorCode::TransportFailure, err))?;

        loop {
            match self.transport.receive(self.poll_interval) {
                Ok(Some(ProviderWireMessage::Response { id, result, error }))
                    if id == request_id =>
                {
                    if let Some(error) = error {
                        return Err(map_wire_error(error));
                    }
                    return Ok(result.unwrap_or(Value::Null));
                }
                // Stale responses belong to the wallet's own prompt queue;
                // skip anything that does not answer this request.
                Ok(Some(_)) => continue,
                Ok(None) => continue,
                Err(err) => {
                    return Err(GatewayError::new(GatewayErrorCode::TransportFailure, err));
                }
            }
        }
    }

    pub fn request_accounts(&mut self) -> Result<Vec<String>, GatewayError> {
        let result = self.request(METHOD_REQUEST_ACCOUNTS, Value::Null)?;
        serde_json::from_value(result).map_err(|err| {
            GatewayError::new(
                GatewayErrorCode::TransportFailure,
                format!("unexpected eth_requestAccounts result: {err}"),
            )
        })
    }

    pub fn send_transaction(
        &mut self,
        transaction: &TransactionRequest,
    ) -> Result<String, GatewayError> {
        let result = self.request(METHOD_SEND_TRANSACTION, json!([transaction]))?;
        as_result_string(result, METHOD_SEND_TRANSACTION)
    }

    pub fn sign_message(
        &mut self,
        address: &str,
        message_hex: &str,
    ) -> Result<String, GatewayError> {
        let result = self.request(METHOD_SIGN, json!([address, message_hex]))?;
        as_result_string(result, METHOD_SIGN)
    }
}

impl Drop for ProviderGateway {
    fn drop(&mut self) {
        self.transport.terminate();
    }
}

fn as_result_string(result: Value, method: &str) -> Result<String, GatewayError> {
    match result {
        Value::String(text) => Ok(text),
        other => Err(GatewayError::new(
            GatewayErrorCode::TransportFailure,
            format!("unexpected {method} result: {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider_transport::test_support::MemoryTransport;

    fn gateway_with(messages: Vec<ProviderWireMessage>) -> ProviderGateway {
        ProviderGateway::new(Box::new(MemoryTransport::new(messages)))
    }

    #[test]
    fn request_matches_response_by_id() {
        let mut gateway = gateway_with(vec![ProviderWireMessage::success(1, json!("ok"))]);
        let result = gateway.request("web3_clientVersion", Value::Null);
        assert_eq!(result, Ok(json!("ok")));
    }

    #[test]
    fn stale_responses_are_skipped() {
        let mut gateway = gateway_with(vec![
            ProviderWireMessage::success(99, json!("stale")),
            ProviderWireMessage::success(1, json!("fresh")),
        ]);
        let result = gateway.request("wallet_getSnaps", Value::Null);
        assert_eq!(result, Ok(json!("fresh")));
    }

    #[test]
    fn user_rejection_maps_to_permission_rejected() {
        let mut gateway = gateway_with(vec![ProviderWireMessage::failure(
            1,
            CODE_USER_REJECTED,
            "user rejected request",
        )]);
        let err = gateway
            .request("wallet_requestSnaps", json!({}))
            .expect_err("rejection must fail");
        assert_eq!(err.code, GatewayErrorCode::PermissionRejected);
    }

    #[test]
    fn wire_codes_map_to_taxonomy() {
        for (wire, expected) in [
            (CODE_METHOD_NOT_FOUND, GatewayErrorCode::MethodNotFound),
            (CODE_INVALID_PARAMS, GatewayErrorCode::InvalidParams),
            (-32000, GatewayErrorCode::TransportFailure),
        ] {
            let mut gateway = gateway_with(vec![ProviderWireMessage::failure(1, wire, "nope")]);
            let err = gateway
                .request("wallet_invokeSnap", json!({}))
                .expect_err("wire error must fail");
            assert_eq!(err.code, expected);
        }
    }

    #[test]
    fn send_failure_maps_to_transport_failure() {
        struct BrokenTransport;

        impl ProviderTransport for BrokenTransport {
            fn send(&mut self, _message: &ProviderWireMessage) -> Result<(), String> {
                Err("pipe closed".to_string())
            }

            fn receive(
                &mut self,
                _timeout: Duration,
            ) -> Result<Option<ProviderWireMessage>, String> {
                Err("pipe closed".to_string())
            }

            fn terminate(&mut self) {}
        }

        let mut gateway = ProviderGateway::new(Box::new(BrokenTransport));
        let err = gateway
            .request("eth_requestAccounts", Value::Null)
            .expect_err("broken transport must fail");
        assert_eq!(err.code, GatewayErrorCode::TransportFailure);
    }

    #[test]
    fn request_accounts_parses_address_list() {
        let mut gateway = gateway_with(vec![ProviderWireMessage::success(
            1,
            json!(["0x1368d87519a1e491a370e47de0db4e78282be35e"]),
        )]);
        let accounts = gateway.request_accounts().expect("accounts");
        assert_eq!(
            accounts,
            vec!["0x1368d87519a1e491a370e47de0db4e78282be35e".to_string()]
        );
    }

    #[test]
    fn transaction_request_omits_empty_optional_fields() {
        let transaction = TransactionRequest::transfer(
            "0x1111111111111111111111111111111111111111",
            "0x2222222222222222222222222222222222222222",
        );
        let json = serde_json::to_value(&transaction).expect("serialize transaction");
        assert_eq!(
            json,
            json!({
                "from": "0x1111111111111111111111111111111111111111",
                "to": "0x2222222222222222222222222222222222222222",
            })
        );
    }

    #[test]
    fn sign_message_returns_signature_string() {
        let mut gateway = gateway_with(vec![ProviderWireMessage::success(1, json!("0xsigned"))]);
        let signature = gateway
            .sign_message("0x1111111111111111111111111111111111111111", "0xdeadbeef")
            .expect("signature");
        assert_eq!(signature, "0xsigned");
    }
}
