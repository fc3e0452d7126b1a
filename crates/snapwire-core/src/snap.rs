use crate::condition::ExpectedBalanceItem;
use crate::provider::{GatewayError, GatewayErrorCode, ProviderGateway};
use crate::provider_protocol::METHOD_INVOKE_SNAP;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapDescriptor {
    pub id: String,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ManageStateOperation {
    Get,
    Set { new_state: Value },
    Clear,
}

// The closed set of custom methods the snap exposes. Unknown method names
// never reach the transport: they are rejected at this boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum SnapMethod {
    Hello,
    SetExpected {
        expected_balances: Vec<ExpectedBalanceItem>,
    },
    ManageState(ManageStateOperation),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct SetExpectedParams {
    expected_balances: Vec<ExpectedBalanceItem>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ManageStateParams {
    operation: String,
    #[serde(default)]
    new_state: Option<Value>,
}

impl SnapMethod {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::SetExpected { .. } => "set_expected",
            Self::ManageState(_) => "manage_state",
        }
    }

    pub fn params(&self) -> Value {
        match self {
            Self::Hello => Value::Null,
            Self::SetExpected { expected_balances } => {
                json!({ "expectedBalances": expected_balances })
            }
            Self::ManageState(operation) => match operation {
                ManageStateOperation::Get => json!({ "operation": "get" }),
                ManageStateOperation::Set { new_state } => {
                    json!({ "operation": "set", "newState": new_state })
                }
                ManageStateOperation::Clear => json!({ "operation": "clear" }),
            },
        }
    }

    pub fn from_parts(name: &str, params: Value) -> Result<Self, GatewayError> {
        match name {
            "hello" => match params {
                Value::Null => Ok(Self::Hello),
                Value::Object(map) if map.is_empty() => Ok(Self::Hello),
                other => Err(GatewayError::new(
                    GatewayErrorCode::InvalidParams,
                    format!("hello takes no params, got {other}"),
                )),
            },
            "set_expected" => {
                let parsed: SetExpectedParams = serde_json::from_value(params).map_err(|err| {
                    GatewayError::new(
                        GatewayErrorCode::InvalidParams,
                        format!("invalid set_expected params: {err}"),
                    )
                })?;
                Ok(Self::SetExpected {
                    expected_balances: parsed.expected_balances,
                })
            }
            "manage_state" => {
                let parsed: ManageStateParams = serde_json::from_value(params).map_err(|err| {
                    GatewayError::new(
                        GatewayErrorCode::InvalidParams,
                        format!("invalid manage_state params: {err}"),
                    )
                })?;
                let operation = match parsed.operation.as_str() {
                    "get" => ManageStateOperation::Get,
                    "set" => ManageStateOperation::Set {
                        new_state: parsed.new_state.unwrap_or(Value::Null),
                    },
                    "clear" => ManageStateOperation::Clear,
                    other => {
                        return Err(GatewayError::new(
                            GatewayErrorCode::InvalidParams,
                            format!("unknown manage_state operation: {other}"),
                        ))
                    }
                };
                Ok(Self::ManageState(operation))
            }
            other => Err(GatewayError::new(
                GatewayErrorCode::MethodNotFound,
                format!("snap does not expose method {other}"),
            )),
        }
    }
}

// Addresses the installed snap through the generic wallet transport. The
// snap must already be connected; condition trees are the caller's to
// validate before invocation.
pub fn invoke(
    provider: &mut ProviderGateway,
    installed: Option<&SnapDescriptor>,
    method: &SnapMethod,
) -> Result<Value, GatewayError> {
    let Some(descriptor) = installed else {
        return Err(GatewayError::new(
            GatewayErrorCode::NotConnected,
            "no snap is connected",
        ));
    };

    let envelope = json!({
        "snapId": descriptor.id,
        "request": {
            "method": method.name(),
            "params": method.params(),
        },
    });
    provider.request(METHOD_INVOKE_SNAP, envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{AssetCondition, AssetConditionGroup, UintRange};
    use crate::provider_protocol::ProviderWireMessage;
    use crate::provider_transport::ProviderTransport;
    use std::time::Duration;

    fn sample_items() -> Vec<ExpectedBalanceItem> {
        vec![ExpectedBalanceItem {
            label: "BitBadges Beta".to_string(),
            asset_ownership_requirements: AssetConditionGroup::And(vec![
                AssetConditionGroup::Assets(vec![AssetCondition {
                    collection_id: "2".to_string(),
                    asset_ids: vec![UintRange::new(1, 1)],
                    chain: "BitBadges".to_string(),
                    must_own_amounts: UintRange::new(1, 1),
                    ownership_times: Vec::new(),
                }]),
            ]),
        }]
    }

    fn descriptor() -> SnapDescriptor {
        SnapDescriptor {
            id: "local:http://localhost:8080".to_string(),
            version: "0.1.0".to_string(),
        }
    }

    #[test]
    fn unknown_method_rejected_at_boundary() {
        let err = SnapMethod::from_parts("not_a_method", Value::Null)
            .expect_err("unknown method must fail");
        assert_eq!(err.code, GatewayErrorCode::MethodNotFound);
    }

    #[test]
    fn malformed_set_expected_params_rejected() {
        let err = SnapMethod::from_parts("set_expected", json!({"expectedBalances": "nope"}))
            .expect_err("malformed params must fail");
        assert_eq!(err.code, GatewayErrorCode::InvalidParams);
    }

    #[test]
    fn hello_rejects_unexpected_params() {
        assert!(SnapMethod::from_parts("hello", Value::Null).is_ok());
        assert!(SnapMethod::from_parts("hello", json!({})).is_ok());
        let err = SnapMethod::from_parts("hello", json!({"unexpected": 1}))
            .expect_err("hello with params must fail");
        assert_eq!(err.code, GatewayErrorCode::InvalidParams);
    }

    #[test]
    fn set_expected_params_roundtrip_through_boundary_parser() {
        let method = SnapMethod::SetExpected {
            expected_balances: sample_items(),
        };
        let reparsed =
            SnapMethod::from_parts(method.name(), method.params()).expect("reparse params");
        assert_eq!(reparsed, method);
    }

    #[test]
    fn manage_state_params_carry_operation_discriminator() {
        assert_eq!(
            SnapMethod::ManageState(ManageStateOperation::Get).params(),
            json!({"operation": "get"})
        );
        assert_eq!(
            SnapMethod::ManageState(ManageStateOperation::Clear).params(),
            json!({"operation": "clear"})
        );
        assert_eq!(
            SnapMethod::ManageState(ManageStateOperation::Set {
                new_state: json!({"hello": "world"})
            })
            .params(),
            json!({"operation": "set", "newState": {"hello": "world"}})
        );

        let err = SnapMethod::from_parts("manage_state", json!({"operation": "merge"}))
            .expect_err("unknown operation must fail");
        assert_eq!(err.code, GatewayErrorCode::InvalidParams);
    }

    #[test]
    fn invoke_without_snap_never_contacts_transport() {
        struct UnreachableTransport;

        impl ProviderTransport for UnreachableTransport {
            fn send(&mut self, _message: &ProviderWireMessage) -> Result<(), String> {
                panic!("transport must not be contacted");
            }

            fn receive(
                &mut self,
                _timeout: Duration,
            ) -> Result<Option<ProviderWireMessage>, String> {
                panic!("transport must not be contacted");
            }

            fn terminate(&mut self) {}
        }

        let mut provider = ProviderGateway::new(Box::new(UnreachableTransport));
        let err = invoke(&mut provider, None, &SnapMethod::Hello)
            .expect_err("invoke without snap must fail");
        assert_eq!(err.code, GatewayErrorCode::NotConnected);
    }

    #[test]
    fn invoke_wraps_method_in_wallet_envelope() {
        use std::cell::RefCell;
        use std::collections::VecDeque;
        use std::rc::Rc;

        struct RecordingTransport {
            sent: Rc<RefCell<Vec<ProviderWireMessage>>>,
            recv: VecDeque<ProviderWireMessage>,
        }

        impl ProviderTransport for RecordingTransport {
            fn send(&mut self, message: &ProviderWireMessage) -> Result<(), String> {
                self.sent.borrow_mut().push(message.clone());
                Ok(())
            }

            fn receive(
                &mut self,
                _timeout: Duration,
            ) -> Result<Option<ProviderWireMessage>, String> {
                Ok(self.recv.pop_front())
            }

            fn terminate(&mut self) {}
        }

        let sent = Rc::new(RefCell::new(Vec::new()));
        let transport = RecordingTransport {
            sent: Rc::clone(&sent),
            recv: VecDeque::from(vec![ProviderWireMessage::success(1, json!("ack"))]),
        };
        let mut provider = ProviderGateway::new(Box::new(transport));

        let result = invoke(&mut provider, Some(&descriptor()), &SnapMethod::Hello)
            .expect("hello invocation");
        assert_eq!(result, json!("ack"));

        let sent = sent.borrow();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            ProviderWireMessage::Request { method, params, .. } => {
                assert_eq!(method, METHOD_INVOKE_SNAP);
                assert_eq!(
                    params,
                    &json!({
                        "snapId": "local:http://localhost:8080",
                        "request": {"method": "hello", "params": null},
                    })
                );
            }
            _ => panic!("unexpected message kind"),
        }
    }
}
