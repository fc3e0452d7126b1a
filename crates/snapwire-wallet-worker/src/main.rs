use snapwire_core::condition::ExpectedBalanceItem;
use snapwire_core::provider_protocol::{
    ProviderWireMessage, CODE_INVALID_PARAMS, CODE_METHOD_NOT_FOUND, CODE_USER_REJECTED,
    METHOD_CLIENT_VERSION, METHOD_GET_SNAPS, METHOD_INVOKE_SNAP, METHOD_REQUEST_ACCOUNTS,
    METHOD_REQUEST_SNAPS, METHOD_SEND_TRANSACTION, METHOD_SIGN,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

struct WalletState {
    client_version: String,
    accept_connect: bool,
    snap_version: String,
    accounts: Vec<String>,
    connected_snaps: BTreeMap<String, Value>,
    persisted_snap_state: Option<Value>,
    transaction_sequence: u64,
}

impl WalletState {
    fn from_env() -> Self {
        let client_version = std::env::var("SNAPWIRE_WALLET_CLIENT_VERSION")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "MetaMask/v11.0.0-flask.0".to_string());
        let accept_connect = std::env::var("SNAPWIRE_WALLET_ACCEPT_CONNECT")
            .ok()
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(true);
        let snap_version = std::env::var("SNAPWIRE_WALLET_SNAP_VERSION")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "0.1.0".to_string());
        let accounts = std::env::var("SNAPWIRE_WALLET_ACCOUNTS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|| {
                vec!["0x1111111111111111111111111111111111111111".to_string()]
            });

        Self {
            client_version,
            accept_connect,
            snap_version,
            accounts,
            connected_snaps: BTreeMap::new(),
            persisted_snap_state: None,
            transaction_sequence: 0,
        }
    }

    fn handle_request(&mut self, id: u64, method: &str, params: Value) -> ProviderWireMessage {
        match method {
            METHOD_CLIENT_VERSION => {
                ProviderWireMessage::success(id, json!(self.client_version))
            }
            METHOD_GET_SNAPS => {
                let snaps: Map<String, Value> = self
                    .connected_snaps
                    .iter()
                    .map(|(origin, entry)| (origin.clone(), entry.clone()))
                    .collect();
                ProviderWireMessage::success(id, Value::Object(snaps))
            }
            METHOD_REQUEST_SNAPS => self.handle_request_snaps(id, params),
            METHOD_INVOKE_SNAP => self.handle_invoke_snap(id, params),
            METHOD_REQUEST_ACCOUNTS => {
                ProviderWireMessage::success(id, json!(self.accounts))
            }
            METHOD_SEND_TRANSACTION => {
                self.transaction_sequence += 1;
                ProviderWireMessage::success(
                    id,
                    json!(format!("0x{:064x}", self.transaction_sequence)),
                )
            }
            METHOD_SIGN => match params.as_array() {
                Some(pair) if pair.len() == 2 => {
                    let message = pair[1].as_str().unwrap_or_default();
                    ProviderWireMessage::success(
                        id,
                        json!(format!("0xsig:{}", message.trim_start_matches("0x"))),
                    )
                }
                _ => ProviderWireMessage::failure(
                    id,
                    CODE_INVALID_PARAMS,
                    "eth_sign expects [address, messageHex]",
                ),
            },
            other => ProviderWireMessage::failure(
                id,
                CODE_METHOD_NOT_FOUND,
                format!("unknown wallet method {other}"),
            ),
        }
    }

    fn handle_request_snaps(&mut self, id: u64, params: Value) -> ProviderWireMessage {
        if !self.accept_connect {
            return ProviderWireMessage::failure(id, CODE_USER_REJECTED, "user rejected request");
        }

        let Some(requested) = params.as_object() else {
            return ProviderWireMessage::failure(
                id,
                CODE_INVALID_PARAMS,
                "wallet_requestSnaps expects an origin map",
            );
        };

        let mut result = Map::new();
        for origin in requested.keys() {
            let entry = json!({
                "id": origin,
                "version": self.snap_version,
                "enabled": true,
                "blocked": false,
            });
            self.connected_snaps.insert(origin.clone(), entry.clone());
            result.insert(origin.clone(), entry);
        }
        ProviderWireMessage::success(id, Value::Object(result))
    }

    fn handle_invoke_snap(&mut self, id: u64, params: Value) -> ProviderWireMessage {
        let snap_id = params
            .get("snapId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !self.connected_snaps.contains_key(&snap_id) {
            return ProviderWireMessage::failure(
                id,
                CODE_USER_REJECTED,
                format!("snap {snap_id} is not connected"),
            );
        }

        let request = params.get("request").cloned().unwrap_or(Value::Null);
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let request_params = request.get("params").cloned().unwrap_or(Value::Null);

        match method.as_str() {
            "hello" => ProviderWireMessage::success(id, json!(format!("hello from {snap_id}"))),
            "set_expected" => {
                let items = request_params.get("expectedBalances").cloned();
                let Some(items) = items else {
                    return ProviderWireMessage::failure(
                        id,
                        CODE_INVALID_PARAMS,
                        "set_expected requires expectedBalances",
                    );
                };
                if serde_json::from_value::<Vec<ExpectedBalanceItem>>(items.clone()).is_err() {
                    return ProviderWireMessage::failure(
                        id,
                        CODE_INVALID_PARAMS,
                        "expectedBalances is not a valid condition list",
                    );
                }
                // Wholesale overwrite, never a merge.
                self.persisted_snap_state = Some(items);
                ProviderWireMessage::success(id, json!(true))
            }
            "manage_state" => {
                match request_params
                    .get("operation")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                {
                    "get" => ProviderWireMessage::success(
                        id,
                        self.persisted_snap_state.clone().unwrap_or(Value::Null),
                    ),
                    "set" => {
                        self.persisted_snap_state =
                            Some(request_params.get("newState").cloned().unwrap_or(Value::Null));
                        ProviderWireMessage::success(id, json!(true))
                    }
                    "clear" => {
                        self.persisted_snap_state = None;
                        ProviderWireMessage::success(id, json!(true))
                    }
                    other => ProviderWireMessage::failure(
                        id,
                        CODE_INVALID_PARAMS,
                        format!("unknown manage_state operation {other}"),
                    ),
                }
            }
            other => ProviderWireMessage::failure(
                id,
                CODE_METHOD_NOT_FOUND,
                format!("snap does not expose method {other}"),
            ),
        }
    }
}

fn main() {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut wallet = WalletState::from_env();

    let response_delay_ms = std::env::var("SNAPWIRE_WALLET_RESPONSE_DELAY_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<ProviderWireMessage>(trimmed) {
            Ok(message) => message,
            Err(_) => break,
        };

        match message {
            ProviderWireMessage::Request { id, method, params } => {
                if response_delay_ms > 0 {
                    thread::sleep(Duration::from_millis(response_delay_ms));
                }

                let response = wallet.handle_request(id, method.as_str(), params);
                if write_message(&mut stdout, &response).is_err() {
                    break;
                }
            }
            ProviderWireMessage::Response { .. } => {}
        }
    }
}

fn write_message(stdout: &mut impl Write, message: &ProviderWireMessage) -> io::Result<()> {
    let payload = serde_json::to_string(message)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
    stdout.write_all(payload.as_bytes())?;
    stdout.write_all(b"\n")?;
    stdout.flush()
}
