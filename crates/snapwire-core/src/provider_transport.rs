use crate::provider_protocol::ProviderWireMessage;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::process::Child;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

pub const DEFAULT_BRIDGE_ENDPOINT: &str = "http://127.0.0.1:8546/rpc";

pub trait ProviderTransport {
    fn send(&mut self, message: &ProviderWireMessage) -> Result<(), String>;
    /// `Ok(None)` means nothing arrived within `timeout` but more may come;
    /// callers poll again. `Err` means no further message can ever arrive on
    /// this transport, so callers must stop polling and surface the failure.
    fn receive(&mut self, timeout: Duration) -> Result<Option<ProviderWireMessage>, String>;
    fn terminate(&mut self);
}

pub struct StdioProcessTransport {
    child: Child,
    rx: Receiver<Result<ProviderWireMessage, String>>,
}

impl StdioProcessTransport {
    pub fn from_child(mut child: Child) -> Result<Self, String> {
        if child.stdin.is_none() {
            kill_and_wait(&mut child);
            return Err("wallet bridge stdin is not piped".to_string());
        }

        let Some(stdout) = child.stdout.take() else {
            kill_and_wait(&mut child);
            return Err("wallet bridge stdout is not piped".to_string());
        };

        let rx = spawn_reader_thread(stdout);
        Ok(Self { child, rx })
    }
}

impl ProviderTransport for StdioProcessTransport {
    fn send(&mut self, message: &ProviderWireMessage) -> Result<(), String> {
        let payload = serde_json::to_string(message)
            .map_err(|err| format!("serialize wallet message failed: {err}"))?;

        let Some(stdin) = self.child.stdin.as_mut() else {
            return Err("wallet bridge stdin is unavailable".to_string());
        };

        stdin
            .write_all(payload.as_bytes())
            .map_err(|err| format!("write wallet bridge stdin failed: {err}"))?;
        stdin
            .write_all(b"\n")
            .map_err(|err| format!("write wallet bridge newline failed: {err}"))?;
        stdin
            .flush()
            .map_err(|err| format!("flush wallet bridge stdin failed: {err}"))
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<ProviderWireMessage>, String> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(message)) => Ok(Some(message)),
            Ok(Err(err)) => Err(err),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err("wallet bridge stdout channel disconnected".to_string())
            }
        }
    }

    fn terminate(&mut self) {
        kill_and_wait(&mut self.child);
    }
}

fn spawn_reader_thread(
    stdout: impl std::io::Read + Send + 'static,
) -> Receiver<Result<ProviderWireMessage, String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    let _ = tx.send(Err(format!("read wallet bridge stdout failed: {err}")));
                    return;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let parsed = serde_json::from_str::<ProviderWireMessage>(trimmed)
                .map_err(|err| format!("invalid wallet bridge message: {err}"));
            let _ = tx.send(parsed);
        }
    });
    rx
}

fn kill_and_wait(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

pub fn normalize_bridge_endpoint(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_BRIDGE_ENDPOINT.to_string();
    }

    let mut normalized = trimmed.to_string();
    if !(normalized.starts_with("http://") || normalized.starts_with("https://")) {
        normalized = format!("http://{normalized}");
    }

    if normalized.contains("/rpc") {
        return normalized;
    }

    let base = normalized.trim_end_matches('/');
    format!("{base}/rpc")
}

// HTTP variant of the wallet bridge: every request is one POST, the bridge
// answers with a single response envelope in the body.
pub struct HttpBridgeTransport {
    endpoint: String,
    agent: ureq::Agent,
    pending: VecDeque<ProviderWireMessage>,
}

impl HttpBridgeTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            endpoint: normalize_bridge_endpoint(endpoint),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            pending: VecDeque::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

impl ProviderTransport for HttpBridgeTransport {
    fn send(&mut self, message: &ProviderWireMessage) -> Result<(), String> {
        let payload = serde_json::to_value(message)
            .map_err(|err| format!("serialize wallet message failed: {err}"))?;

        let response = self
            .agent
            .post(self.endpoint.as_str())
            .set("Content-Type", "application/json")
            .send_json(payload);

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(format!("wallet bridge returned HTTP {status}: {body}"));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(format!("wallet bridge transport error: {err}"));
            }
        };

        let parsed: ProviderWireMessage = response
            .into_json()
            .map_err(|err| format!("invalid wallet bridge response: {err}"))?;
        self.pending.push_back(parsed);
        Ok(())
    }

    // One POST yields exactly one response, so an empty queue means the
    // reply was already consumed and nothing further will ever arrive.
    // Failing here lets the caller's poll loop stop instead of spinning.
    fn receive(&mut self, _timeout: Duration) -> Result<Option<ProviderWireMessage>, String> {
        match self.pending.pop_front() {
            Some(message) => Ok(Some(message)),
            None => Err("wallet bridge has no pending response".to_string()),
        }
    }

    fn terminate(&mut self) {
        self.pending.clear();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemoryTransport;
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_transport_send_receive_and_terminate() {
        let mut transport = MemoryTransport::new(vec![ProviderWireMessage::success(
            1,
            json!(["0x1368d87519a1e491a370e47de0db4e78282be35e"]),
        )]);

        transport
            .send(&ProviderWireMessage::request(
                1,
                "eth_requestAccounts",
                serde_json::Value::Null,
            ))
            .expect("send message");

        let received = transport
            .receive(Duration::from_millis(1))
            .expect("receive message");
        assert!(matches!(
            received,
            Some(ProviderWireMessage::Response { id: 1, .. })
        ));

        transport.terminate();
        assert!(transport.terminated);
        assert_eq!(transport.sent.len(), 1);
    }

    #[test]
    fn http_bridge_drained_receive_fails_fast() {
        let mut transport = HttpBridgeTransport::new("localhost:8546", Duration::from_millis(500));

        let started = std::time::Instant::now();
        let err = transport
            .receive(Duration::from_secs(1))
            .expect_err("drained bridge must fail the round trip");
        assert!(err.contains("no pending response"), "unexpected error: {err}");
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn http_bridge_normalizes_its_endpoint() {
        let transport = HttpBridgeTransport::new("localhost:8546", Duration::from_millis(500));
        assert_eq!(transport.endpoint(), "http://localhost:8546/rpc");
    }

    #[test]
    fn bridge_endpoint_normalization() {
        assert_eq!(normalize_bridge_endpoint(""), DEFAULT_BRIDGE_ENDPOINT);
        assert_eq!(
            normalize_bridge_endpoint("127.0.0.1:8546"),
            "http://127.0.0.1:8546/rpc"
        );
        assert_eq!(
            normalize_bridge_endpoint("http://localhost:9000/"),
            "http://localhost:9000/rpc"
        );
        assert_eq!(
            normalize_bridge_endpoint("https://wallet.example/rpc"),
            "https://wallet.example/rpc"
        );
    }
}
