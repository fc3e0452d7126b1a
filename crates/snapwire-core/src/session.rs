use crate::provider::{GatewayError, GatewayErrorCode, ProviderGateway, TransactionRequest};
use crate::provider_protocol::{METHOD_CLIENT_VERSION, METHOD_GET_SNAPS, METHOD_REQUEST_SNAPS};
use crate::snap::{self, SnapDescriptor, SnapMethod};
use crate::settings::SessionSettings;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub extension_capable: bool,
    pub plugins_detected: bool,
    pub installed_snap: Option<SnapDescriptor>,
    pub last_error: Option<GatewayError>,
}

pub fn is_local_origin(origin: &str) -> bool {
    origin.starts_with("local:")
}

// A locally served snap bundle changes on every edit, so the cached
// descriptor is never trusted and reconnect is always offered. Store
// distributions are versioned and need no reconnect affordance.
pub fn should_offer_reconnect(target_origin: &str, _installed: Option<&SnapDescriptor>) -> bool {
    is_local_origin(target_origin)
}

fn client_version_supports_snaps(version: &str) -> bool {
    version.to_ascii_lowercase().contains("flask")
}

#[derive(Clone, Debug, Deserialize)]
struct RequestedSnapEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

// Owns the session for one page lifetime. Mutation contract: `detect`
// writes the two detection flags, `connect` writes `installed_snap`,
// and every failed wallet round trip is recorded in `last_error`.
pub struct SessionController {
    settings: SessionSettings,
    provider: ProviderGateway,
    state: SessionState,
}

impl SessionController {
    pub fn new(settings: SessionSettings, provider: ProviderGateway) -> Self {
        Self {
            settings,
            provider,
            state: SessionState::default(),
        }
    }

    pub fn spawn(settings: SessionSettings) -> Result<Self, GatewayError> {
        let provider = ProviderGateway::spawn_bridge(&settings.bridge)?;
        Ok(Self::new(settings, provider))
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    // Idempotent; safe to call on poll or visibility change.
    pub fn detect(&mut self) {
        self.state.extension_capable =
            match self.provider.request(METHOD_CLIENT_VERSION, Value::Null) {
                Ok(Value::String(version)) => client_version_supports_snaps(&version),
                Ok(_) | Err(_) => false,
            };
        self.state.plugins_detected = self
            .provider
            .request(METHOD_GET_SNAPS, Value::Null)
            .is_ok();
    }

    // Also the reconnect action: calling while already connected re-requests
    // permission for the same origin.
    pub fn connect(&mut self) -> Result<SnapDescriptor, GatewayError> {
        if !(self.state.extension_capable || self.state.plugins_detected) {
            return Err(self.record(GatewayError::new(
                GatewayErrorCode::TransportUnavailable,
                "no snap-capable wallet detected",
            )));
        }

        let origin = self.settings.snap_origin.clone();
        let mut entry = Map::new();
        if let Some(version) = &self.settings.snap_version_hint {
            entry.insert("version".to_string(), Value::String(version.clone()));
        }
        let mut params = Map::new();
        params.insert(origin.clone(), Value::Object(entry));

        let result = self
            .provider
            .request(METHOD_REQUEST_SNAPS, Value::Object(params))
            .map_err(|err| self.record(err))?;

        let descriptor = parse_requested_snap(&origin, result)
            .map_err(|err| self.record(err))?;

        self.state.installed_snap = Some(descriptor.clone());
        self.state.last_error = None;
        Ok(descriptor)
    }

    pub fn invoke(&mut self, method: &SnapMethod) -> Result<Value, GatewayError> {
        snap::invoke(&mut self.provider, self.state.installed_snap.as_ref(), method)
            .map_err(|err| self.record(err))
    }

    // One logical user action: request accounts, then send from the first
    // granted account, strictly in that order.
    pub fn send_transaction(&mut self, to: &str) -> Result<Option<String>, GatewayError> {
        let accounts = self
            .provider
            .request_accounts()
            .map_err(|err| self.record(err))?;
        let Some(from) = accounts.first() else {
            return Ok(None);
        };

        let transaction = TransactionRequest::transfer(from.clone(), to);
        let tx_id = self
            .provider
            .send_transaction(&transaction)
            .map_err(|err| self.record(err))?;
        Ok(Some(tx_id))
    }

    pub fn sign_message(&mut self, message_hex: &str) -> Result<Option<String>, GatewayError> {
        let accounts = self
            .provider
            .request_accounts()
            .map_err(|err| self.record(err))?;
        let Some(address) = accounts.first() else {
            return Ok(None);
        };

        let address = address.clone();
        let signature = self
            .provider
            .sign_message(&address, message_hex)
            .map_err(|err| self.record(err))?;
        Ok(Some(signature))
    }

    fn record(&mut self, err: GatewayError) -> GatewayError {
        self.state.last_error = Some(err.clone());
        err
    }
}

fn parse_requested_snap(origin: &str, result: Value) -> Result<SnapDescriptor, GatewayError> {
    let Some(entry) = result.get(origin).cloned() else {
        return Err(GatewayError::new(
            GatewayErrorCode::TransportFailure,
            format!("wallet did not return the requested snap {origin}"),
        ));
    };

    let entry: RequestedSnapEntry = serde_json::from_value(entry).map_err(|err| {
        GatewayError::new(
            GatewayErrorCode::TransportFailure,
            format!("unexpected wallet_requestSnaps entry: {err}"),
        )
    })?;

    Ok(SnapDescriptor {
        id: entry.id.unwrap_or_else(|| origin.to_string()),
        version: entry.version.unwrap_or_default(),
    })
}
